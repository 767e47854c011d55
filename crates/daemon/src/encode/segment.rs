//! Continuous recording command for the camera pipeline
//!
//! Builds the ffmpeg invocation for on-demand recording: the RTSP source is
//! stream-copied (no re-encode) into fixed-duration, timestamp-named mp4
//! segments in the clips directory.

use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use crate::encode::hls::DEFAULT_TRANSPORT;

/// Seconds per recorded clip segment.
pub const DEFAULT_CLIP_SECS: u32 = 600;

/// Parameters for one camera's continuous recording
#[derive(Debug, Clone)]
pub struct SegmentParams {
    /// RTSP source to ingest
    pub source_uri: String,
    /// Flat clips directory receiving the segment files
    pub clips_dir: PathBuf,
    /// Camera id, used as the filename prefix
    pub camera_id: String,
    /// RTSP transport
    pub transport: String,
    /// Seconds per segment file
    pub clip_secs: u32,
}

impl SegmentParams {
    pub fn new(source_uri: &str, clips_dir: PathBuf, camera_id: &str) -> Self {
        Self {
            source_uri: source_uri.to_string(),
            clips_dir,
            camera_id: camera_id.to_string(),
            transport: DEFAULT_TRANSPORT.to_string(),
            clip_secs: DEFAULT_CLIP_SECS,
        }
    }

    /// strftime output pattern: `<clips>/<camera_id>_%Y%m%d-%H%M%S.mp4`
    pub fn output_pattern(&self) -> PathBuf {
        self.clips_dir
            .join(format!("{}_%Y%m%d-%H%M%S.mp4", self.camera_id))
    }
}

/// Build the ffmpeg command for continuous segment recording.
///
/// Stream copy keeps CPU cost near zero; ffmpeg names each segment itself
/// via strftime. Stdin stays piped: writing `q` there is the graceful
/// shutdown channel, letting ffmpeg finalize the open segment.
pub fn build_segment_command(params: &SegmentParams) -> Command {
    let mut cmd = Command::new("ffmpeg");

    cmd.arg("-rtsp_transport").arg(&params.transport);
    cmd.arg("-i").arg(&params.source_uri);
    cmd.arg("-hide_banner");
    cmd.arg("-loglevel").arg("warning");
    cmd.arg("-c").arg("copy");
    cmd.arg("-map").arg("0");
    cmd.arg("-f").arg("segment");
    cmd.arg("-segment_time").arg(params.clip_secs.to_string());
    cmd.arg("-segment_format").arg("mp4");
    cmd.arg("-strftime").arg("1");
    cmd.arg(params.output_pattern());

    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::piped());

    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::test_support::{get_command_args, has_flag_with_value};
    use proptest::prelude::*;
    use std::ffi::OsStr;

    #[test]
    fn test_segment_command_arguments() {
        let params = SegmentParams::new(
            "rtsp://10.0.0.5:554/stream1",
            PathBuf::from("/srv/cameras/clips"),
            "cam-1",
        );
        let cmd = build_segment_command(&params);
        let args = get_command_args(&cmd);

        assert_eq!(cmd.as_std().get_program(), OsStr::new("ffmpeg"));
        assert!(has_flag_with_value(&args, "-rtsp_transport", "tcp"));
        assert!(has_flag_with_value(&args, "-i", "rtsp://10.0.0.5:554/stream1"));
        assert!(has_flag_with_value(&args, "-c", "copy"));
        assert!(has_flag_with_value(&args, "-map", "0"));
        assert!(has_flag_with_value(&args, "-f", "segment"));
        assert!(has_flag_with_value(&args, "-segment_time", "600"));
        assert!(has_flag_with_value(&args, "-segment_format", "mp4"));
        assert!(has_flag_with_value(&args, "-strftime", "1"));
        assert_eq!(
            args.last().map(String::as_str),
            Some("/srv/cameras/clips/cam-1_%Y%m%d-%H%M%S.mp4")
        );
    }

    #[test]
    fn test_no_encoder_flags_present() {
        let params = SegmentParams::new(
            "rtsp://10.0.0.5:554/stream1",
            PathBuf::from("/clips"),
            "cam-1",
        );
        let args = get_command_args(&build_segment_command(&params));

        // Recording is a stream copy, never a re-encode
        assert!(!args.iter().any(|a| a == "-c:v"));
        assert!(!args.iter().any(|a| a == "libx264" || a == "h264_nvenc"));
    }

    // For any camera id and clip length, the output pattern keeps the
    // camera-id prefix convention the listing and retention code rely on.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_output_pattern_prefix(
            camera_id in "[a-zA-Z0-9-]{1,24}",
            clip_secs in 1u32..3600,
        ) {
            let mut params = SegmentParams::new(
                "rtsp://cam.local/stream1",
                PathBuf::from("/clips"),
                &camera_id,
            );
            params.clip_secs = clip_secs;

            let pattern = params.output_pattern();
            let filename = pattern.file_name().unwrap().to_str().unwrap();
            prop_assert!(
                filename.starts_with(&format!("{}_", camera_id)),
                "expected filename to keep camera-id prefix"
            );
            prop_assert!(filename.ends_with(".mp4"));

            let args = get_command_args(&build_segment_command(&params));
            prop_assert!(has_flag_with_value(&args, "-segment_time", &clip_secs.to_string()));
        }
    }
}
