//! Startup checks for the revoice daemon.
//!
//! Verifies that the external multimedia tools are runnable before the
//! server starts accepting work. Worker commands are deliberately not
//! checked here: models can be installed or swapped while the daemon is
//! down, and a missing worker surfaces as a per-job failure instead.

use revoice_daemon_config::Config;
use std::process::Command;
use thiserror::Error;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("ffmpeg not available: {0}")]
    FfmpegUnavailable(String),

    #[error("ffprobe not available: {0}")]
    FfprobeUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Check that ffmpeg runs by invoking `ffmpeg -version`.
pub fn check_ffmpeg_available(ffmpeg_path: &str) -> Result<(), StartupError> {
    let output = Command::new(ffmpeg_path)
        .arg("-version")
        .output()
        .map_err(|e| {
            StartupError::FfmpegUnavailable(format!(
                "{} -version failed; is FFmpeg installed and in PATH? Error: {}",
                ffmpeg_path, e
            ))
        })?;

    if !output.status.success() {
        return Err(StartupError::FfmpegUnavailable(format!(
            "{} -version exited with {}",
            ffmpeg_path, output.status
        )));
    }
    Ok(())
}

/// Check that ffprobe runs by invoking `ffprobe -version`.
pub fn check_ffprobe_available(ffprobe_path: &str) -> Result<(), StartupError> {
    let output = Command::new(ffprobe_path)
        .arg("-version")
        .output()
        .map_err(|e| {
            StartupError::FfprobeUnavailable(format!(
                "{} -version failed; is FFprobe installed and in PATH? Error: {}",
                ffprobe_path, e
            ))
        })?;

    if !output.status.success() {
        return Err(StartupError::FfprobeUnavailable(format!(
            "{} -version exited with {}",
            ffprobe_path, output.status
        )));
    }
    Ok(())
}

/// Run all startup checks in order.
pub fn run_startup_checks(config: &Config) -> Result<(), StartupError> {
    check_ffmpeg_available(&config.tools.ffmpeg_path)?;
    check_ffprobe_available(&config.tools.ffprobe_path)?;
    Ok(())
}
