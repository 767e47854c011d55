//! Raw frame source for motion analysis
//!
//! Decodes a camera's RTSP feed into fixed-size grayscale frames via an
//! ffmpeg subprocess writing rawvideo to stdout. Frames arrive downscaled
//! and rate-capped so motion analysis stays cheap regardless of the
//! camera's native resolution.

use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::debug;

use crate::encode::hls::DEFAULT_TRANSPORT;

/// Analysis frame width in pixels.
pub const FRAME_WIDTH: usize = 320;

/// Analysis frame height in pixels.
pub const FRAME_HEIGHT: usize = 240;

/// Bytes per grayscale analysis frame.
pub const FRAME_LEN: usize = FRAME_WIDTH * FRAME_HEIGHT;

/// Build the ffmpeg command decoding an RTSP source to raw grayscale frames
/// on stdout.
///
/// Stderr is discarded outright rather than piped, so there is no pipe to
/// drain. `kill_on_drop` ties the decoder's lifetime to the `FrameSource`
/// owning it.
pub fn build_frame_command(source_uri: &str, fps: u32) -> Command {
    let mut cmd = Command::new("ffmpeg");

    cmd.arg("-rtsp_transport").arg(DEFAULT_TRANSPORT);
    cmd.arg("-i").arg(source_uri);
    cmd.arg("-hide_banner");
    cmd.arg("-loglevel").arg("error");
    cmd.arg("-an");
    cmd.arg("-vf")
        .arg(format!("scale={}:{},fps={}", FRAME_WIDTH, FRAME_HEIGHT, fps));
    cmd.arg("-f").arg("rawvideo");
    cmd.arg("-pix_fmt").arg("gray");
    cmd.arg("-");

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::null());
    cmd.kill_on_drop(true);

    cmd
}

/// An open grayscale frame pipe from one camera.
///
/// Dropping the source kills the decoder process.
pub struct FrameSource {
    child: Child,
    stdout: ChildStdout,
    read_timeout: Duration,
}

impl FrameSource {
    /// Spawn the decoder against an RTSP URI.
    ///
    /// Spawning succeeds even before the RTSP connection is established; a
    /// dead source shows up as a failed `read_frame` instead.
    pub fn open(source_uri: &str, fps: u32, read_timeout: Duration) -> std::io::Result<Self> {
        let mut child = build_frame_command(source_uri, fps).spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "decoder stdout not piped")
        })?;
        debug!(pid = child.id(), "opened raw frame source");
        Ok(Self {
            child,
            stdout,
            read_timeout,
        })
    }

    /// Read exactly one frame into `buf`, resizing it to `FRAME_LEN`.
    ///
    /// A read that does not complete within the timeout is reported as
    /// `TimedOut`, which callers treat like any other source failure.
    pub async fn read_frame(&mut self, buf: &mut Vec<u8>) -> std::io::Result<()> {
        buf.resize(FRAME_LEN, 0);
        match tokio::time::timeout(self.read_timeout, self.stdout.read_exact(buf)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "frame read timed out",
            )),
        }
    }

    /// Decoder process id, for logging.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}
