//! # Transcode Demo
//!
//! Probes an audio file, converts it to 16-bit big-endian PCM, seeks to the
//! middle and reports how many bytes come out.
//!
//! Run with:
//! ```bash
//! # Synthesized WAVE tone
//! cargo run --example transcode_demo --package core-pipeline
//!
//! # Any file the desktop backends understand
//! cargo run --example transcode_demo --package core-pipeline -- ~/Music/track.flac
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bridge_traits::LogLevel;
use core_pipeline::{AudioFileReader, FormatConversionProvider, TargetFormat};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_runtime::CoreConfig;
use tracing::info;

fn main() -> Result<()> {
    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_level(LogLevel::Debug)
            .with_filter("core_pipeline=debug,bridge_desktop=info"),
    )?;

    let scratch = tempfile::tempdir()?;
    let path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => write_tone(scratch.path())?,
    };
    let locator = path.to_str().context("path is not valid UTF-8")?;

    // Desktop defaults: symphonia files, WAVE streams, PCM/symphonia converters
    let config = Arc::new(CoreConfig::builder().buffer_size(64 * 1024).build()?);
    let reader = AudioFileReader::new(config.clone());
    let provider = FormatConversionProvider::new(config);

    let summary = reader.audio_file_format(locator)?;
    info!(
        format = %summary.format_tag,
        sample_rate = summary.sample_rate,
        channels = summary.channels,
        frames = summary.frame_length,
        vbr = summary.is_vbr,
        "Probed file"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let Some(duration) = summary.duration() else {
        bail!("file reports no duration");
    };

    let stream = reader.open_stream(locator)?;
    let target = TargetFormat::pcm_signed(summary.sample_rate as f64, summary.channels, 16, true);
    let mut pcm = provider.convert(stream, &target)?;

    pcm.seek(duration / 2)?;
    let mut bytes = Vec::new();
    pcm.read_to_end(&mut bytes)?;
    pcm.close()?;

    let frame_size = target.bytes_per_frame.max(1) as usize;
    info!(
        bytes = bytes.len(),
        frames = bytes.len() / frame_size,
        from_frame = ?pcm.frame_position(),
        "Converted second half"
    );
    Ok(())
}

/// Two seconds of a 440 Hz tone as 16-bit stereo WAVE.
fn write_tone(dir: &Path) -> Result<PathBuf> {
    const SAMPLE_RATE: u32 = 44_100;
    let frames = SAMPLE_RATE as usize * 2;

    let mut data = Vec::with_capacity(frames * 4);
    for i in 0..frames {
        let t = i as f64 / SAMPLE_RATE as f64;
        let sample = ((2.0 * std::f64::consts::PI * 440.0 * t).sin() * 0.3 * i16::MAX as f64) as i16;
        data.extend_from_slice(&sample.to_le_bytes());
        data.extend_from_slice(&sample.to_le_bytes());
    }

    let mut wav = Vec::with_capacity(44 + data.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    wav.extend_from_slice(b"WAVEfmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    wav.extend_from_slice(&(SAMPLE_RATE * 4).to_le_bytes());
    wav.extend_from_slice(&4u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data.len() as u32).to_le_bytes());
    wav.extend_from_slice(&data);

    let path = dir.join("tone.wav");
    std::fs::write(&path, wav).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
