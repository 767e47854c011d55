//! External ffmpeg command grammar for the camera pipeline

pub mod frames;
pub mod hls;
pub mod segment;
pub mod snapshot;

pub use frames::{build_frame_command, FrameSource, FRAME_HEIGHT, FRAME_LEN, FRAME_WIDTH};
pub use hls::{build_hls_command, Encoder, HlsParams};
pub use segment::{build_segment_command, SegmentParams};
pub use snapshot::{build_snapshot_command, SnapshotParams};

#[cfg(test)]
pub(crate) mod test_support {
    use tokio::process::Command;

    /// Collect a command's arguments as strings for assertions.
    pub fn get_command_args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .filter_map(|arg| arg.to_str().map(String::from))
            .collect()
    }

    /// Check for a flag followed by a specific value.
    pub fn has_flag_with_value(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2)
            .any(|pair| pair[0] == flag && pair[1] == value)
    }

    /// Check for a standalone flag.
    pub fn has_flag(args: &[String], flag: &str) -> bool {
        args.iter().any(|arg| arg == flag)
    }
}
