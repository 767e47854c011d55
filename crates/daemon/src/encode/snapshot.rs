//! One-shot snapshot capture command
//!
//! Extracts a single high-quality frame from a camera's RTSP feed into a
//! timestamped jpg.

use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use crate::encode::hls::DEFAULT_TRANSPORT;

/// Parameters for a single-frame capture
#[derive(Debug, Clone)]
pub struct SnapshotParams {
    /// RTSP source to sample
    pub source_uri: String,
    /// Full output path of the jpg
    pub output_path: PathBuf,
    /// RTSP transport
    pub transport: String,
}

impl SnapshotParams {
    pub fn new(source_uri: &str, output_path: PathBuf) -> Self {
        Self {
            source_uri: source_uri.to_string(),
            output_path,
            transport: DEFAULT_TRANSPORT.to_string(),
        }
    }
}

/// Build the ffmpeg command for a one-shot frame capture.
///
/// `-vframes 1` stops after the first decoded frame; `-q:v 2` keeps jpeg
/// quality near lossless. The caller bounds the run with a timeout, so the
/// child is killed when its handle drops.
pub fn build_snapshot_command(params: &SnapshotParams) -> Command {
    let mut cmd = Command::new("ffmpeg");

    cmd.arg("-rtsp_transport").arg(&params.transport);
    cmd.arg("-i").arg(&params.source_uri);
    cmd.arg("-hide_banner");
    cmd.arg("-loglevel").arg("warning");
    cmd.arg("-vframes").arg("1");
    cmd.arg("-q:v").arg("2");
    cmd.arg(&params.output_path);

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    cmd
}
