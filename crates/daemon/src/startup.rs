//! Startup checks for the camera pipeline daemon
//!
//! Preflight verification before the daemon takes traffic: ffmpeg must be
//! runnable and the storage tree must exist. Helpers for RTSP URL
//! validation live here too.

use camera_pipeline_config::StorageLayout;
use std::process::Command;
use thiserror::Error;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("FFmpeg not available: {0}")]
    FfmpegUnavailable(String),

    #[error("Failed to create storage directories: {0}")]
    Storage(std::io::Error),
}

/// Check that ffmpeg is runnable by executing `ffmpeg -version`.
pub fn check_ffmpeg_available() -> Result<(), StartupError> {
    let output = Command::new("ffmpeg").arg("-version").output().map_err(|e| {
        StartupError::FfmpegUnavailable(format!(
            "ffmpeg -version failed; is FFmpeg installed and in PATH? Error: {}",
            e
        ))
    })?;

    if !output.status.success() {
        return Err(StartupError::FfmpegUnavailable(
            "ffmpeg -version failed; is FFmpeg installed and in PATH?".to_string(),
        ));
    }

    Ok(())
}

/// Parse an FFmpeg version banner and extract the major version number.
///
/// Handles both plain versions ("ffmpeg version 6.1.1 ...") and n-prefixed
/// build tags ("ffmpeg version n7.0-...").
pub fn parse_ffmpeg_version(version_output: &str) -> Option<u32> {
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains("ffmpeg version"))?;

    let version_part = version_line
        .to_lowercase()
        .split("ffmpeg version")
        .nth(1)?
        .trim()
        .split_whitespace()
        .next()?
        .to_string();

    let version_str = version_part.trim_start_matches('n');
    let major_str = version_str.split(|c| c == '.' || c == '-').next()?;
    major_str.parse().ok()
}

/// Cheap RTSP URL validation: correct scheme and a non-empty host.
pub fn validate_rtsp_url(url: &str) -> bool {
    let Some(rest) = url.strip_prefix("rtsp://") else {
        return false;
    };
    let authority = rest.split('/').next().unwrap_or("");
    // Host is whatever follows the optional user:pass@ part
    let host = authority.rsplit('@').next().unwrap_or("");
    !host.is_empty()
}

/// Guess an RTSP URL for a bare IP address, using the most common port and
/// path.
pub fn guess_rtsp_url(ip: &str) -> String {
    format!("rtsp://{}:554/stream1", ip)
}

/// Run all startup checks: storage tree first, then the ffmpeg probe.
pub fn run_startup_checks(layout: &StorageLayout) -> Result<(), StartupError> {
    layout.ensure().map_err(StartupError::Storage)?;
    check_ffmpeg_available()?;
    Ok(())
}
