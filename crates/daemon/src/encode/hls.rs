//! Segmented-stream transcode command for the camera pipeline
//!
//! Builds the ffmpeg invocation that turns one camera's RTSP feed into a
//! rolling HLS playlist: a hardware (nvenc) or software (x264) encode path,
//! AAC audio, and a bounded segment window with old segments deleted as new
//! ones land.

use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Default RTSP transport; TCP avoids packet loss artifacts on flaky links.
pub const DEFAULT_TRANSPORT: &str = "tcp";

/// Seconds per HLS segment.
pub const DEFAULT_SEGMENT_SECS: u32 = 4;

/// Number of segments kept in the rolling playlist window.
pub const DEFAULT_PLAYLIST_LEN: u32 = 6;

/// Encoder path for the stream transcode.
///
/// Selection affects performance only; a camera streams either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoder {
    /// CUDA-accelerated h264_nvenc
    Nvenc,
    /// libx264 software fallback
    Software,
}

impl Encoder {
    /// Map the stored encoder preference onto a variant.
    pub fn from_preference(use_nvenc: bool) -> Self {
        if use_nvenc {
            Encoder::Nvenc
        } else {
            Encoder::Software
        }
    }
}

/// Parameters for one camera's segmented-stream transcode
#[derive(Debug, Clone)]
pub struct HlsParams {
    /// RTSP source to ingest
    pub source_uri: String,
    /// Directory receiving the playlist and segment files
    pub output_dir: PathBuf,
    /// Camera id, used for the playlist's public base URL
    pub camera_id: String,
    /// Encoder path
    pub encoder: Encoder,
    /// RTSP transport ("tcp" or "udp")
    pub transport: String,
    /// Seconds per segment
    pub segment_secs: u32,
    /// Segments kept in the playlist
    pub playlist_len: u32,
}

impl HlsParams {
    pub fn new(source_uri: &str, output_dir: PathBuf, camera_id: &str, encoder: Encoder) -> Self {
        Self {
            source_uri: source_uri.to_string(),
            output_dir,
            camera_id: camera_id.to_string(),
            encoder,
            transport: DEFAULT_TRANSPORT.to_string(),
            segment_secs: DEFAULT_SEGMENT_SECS,
            playlist_len: DEFAULT_PLAYLIST_LEN,
        }
    }
}

/// Build the ffmpeg command for a segmented-stream transcode.
///
/// The command reads the RTSP source, encodes with the selected video
/// encoder plus AAC audio, and writes `index.m3u8` with a rolling segment
/// window into the output directory. Stdout is discarded; stderr is piped so
/// the supervisor can drain it line by line.
pub fn build_hls_command(params: &HlsParams) -> Command {
    let index_file = params.output_dir.join("index.m3u8");
    let segment_pattern = params.output_dir.join("seg%03d.ts");

    let mut cmd = Command::new("ffmpeg");

    cmd.arg("-rtsp_transport").arg(&params.transport);
    cmd.arg("-i").arg(&params.source_uri);
    cmd.arg("-hide_banner");
    cmd.arg("-loglevel").arg("warning");

    match params.encoder {
        Encoder::Nvenc => {
            cmd.arg("-hwaccel").arg("cuda");
            cmd.arg("-hwaccel_output_format").arg("cuda");
            cmd.arg("-c:v").arg("h264_nvenc");
            cmd.arg("-preset").arg("p1");
            cmd.arg("-b:v").arg("2M");
        }
        Encoder::Software => {
            cmd.arg("-c:v").arg("libx264");
            cmd.arg("-preset").arg("medium");
            cmd.arg("-b:v").arg("2M");
        }
    }

    cmd.arg("-c:a").arg("aac");
    cmd.arg("-b:a").arg("128k");
    cmd.arg("-f").arg("hls");
    cmd.arg("-hls_time").arg(params.segment_secs.to_string());
    cmd.arg("-hls_list_size").arg(params.playlist_len.to_string());
    // delete_segments keeps the window rolling instead of growing forever
    cmd.arg("-hls_flags").arg("delete_segments+append_list");
    cmd.arg("-hls_segment_filename").arg(&segment_pattern);
    // Relative segment paths in the playlist resolve through the serving
    // layer's /streams/<camera>/ route
    cmd.arg("-hls_base_url")
        .arg(format!("/streams/{}/", params.camera_id));
    cmd.arg(&index_file);

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::piped());

    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::test_support::{get_command_args, has_flag, has_flag_with_value};
    use proptest::prelude::*;
    use std::ffi::OsStr;

    fn params_for(encoder: Encoder) -> HlsParams {
        HlsParams::new(
            "rtsp://admin:pw@10.0.0.5:554/stream1",
            PathBuf::from("/srv/cameras/streams/cam-1"),
            "cam-1",
            encoder,
        )
    }

    #[test]
    fn test_common_arguments() {
        let cmd = build_hls_command(&params_for(Encoder::Software));
        let args = get_command_args(&cmd);

        assert_eq!(cmd.as_std().get_program(), OsStr::new("ffmpeg"));
        assert!(has_flag_with_value(&args, "-rtsp_transport", "tcp"));
        assert!(has_flag_with_value(
            &args,
            "-i",
            "rtsp://admin:pw@10.0.0.5:554/stream1"
        ));
        assert!(has_flag(&args, "-hide_banner"));
        assert!(has_flag_with_value(&args, "-c:a", "aac"));
        assert!(has_flag_with_value(&args, "-b:a", "128k"));
        assert!(has_flag_with_value(&args, "-f", "hls"));
        assert!(has_flag_with_value(&args, "-hls_time", "4"));
        assert!(has_flag_with_value(&args, "-hls_list_size", "6"));
        assert!(has_flag_with_value(
            &args,
            "-hls_flags",
            "delete_segments+append_list"
        ));
        assert!(has_flag_with_value(
            &args,
            "-hls_segment_filename",
            "/srv/cameras/streams/cam-1/seg%03d.ts"
        ));
        assert!(has_flag_with_value(&args, "-hls_base_url", "/streams/cam-1/"));
        assert_eq!(
            args.last().map(String::as_str),
            Some("/srv/cameras/streams/cam-1/index.m3u8")
        );
    }

    #[test]
    fn test_nvenc_variant_selects_hardware_path() {
        let cmd = build_hls_command(&params_for(Encoder::Nvenc));
        let args = get_command_args(&cmd);

        assert!(has_flag_with_value(&args, "-hwaccel", "cuda"));
        assert!(has_flag_with_value(&args, "-c:v", "h264_nvenc"));
        assert!(has_flag_with_value(&args, "-preset", "p1"));
        assert!(!args.iter().any(|a| a == "libx264"));
    }

    #[test]
    fn test_software_variant_has_no_hardware_flags() {
        let cmd = build_hls_command(&params_for(Encoder::Software));
        let args = get_command_args(&cmd);

        assert!(has_flag_with_value(&args, "-c:v", "libx264"));
        assert!(has_flag_with_value(&args, "-preset", "medium"));
        assert!(!args.iter().any(|a| a == "-hwaccel"));
        assert!(!args.iter().any(|a| a.contains("nvenc")));
    }

    #[test]
    fn test_encoder_from_preference() {
        assert_eq!(Encoder::from_preference(true), Encoder::Nvenc);
        assert_eq!(Encoder::from_preference(false), Encoder::Software);
    }

    // For any camera id, source URI, and window geometry, the built command
    // carries the full segmenting grammar and exactly one video encoder.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_hls_command_completeness(
            camera_id in "[a-zA-Z0-9-]{1,24}",
            host in "[a-z0-9.]{1,20}",
            segment_secs in 1u32..30,
            playlist_len in 1u32..20,
            use_nvenc in proptest::bool::ANY,
        ) {
            let uri = format!("rtsp://{}:554/stream1", host);
            let mut params = HlsParams::new(
                &uri,
                PathBuf::from(format!("/data/streams/{}", camera_id)),
                &camera_id,
                Encoder::from_preference(use_nvenc),
            );
            params.segment_secs = segment_secs;
            params.playlist_len = playlist_len;

            let cmd = build_hls_command(&params);
            let args = get_command_args(&cmd);

            prop_assert!(has_flag_with_value(&args, "-i", &uri));
            prop_assert!(has_flag_with_value(&args, "-hls_time", &segment_secs.to_string()));
            prop_assert!(has_flag_with_value(&args, "-hls_list_size", &playlist_len.to_string()));
            prop_assert!(
                has_flag_with_value(
                    &args,
                    "-hls_base_url",
                    &format!("/streams/{}/", camera_id)
                ),
                "expected -hls_base_url flag with per-camera path"
            );

            let nvenc = args.iter().any(|a| a == "h264_nvenc");
            let x264 = args.iter().any(|a| a == "libx264");
            prop_assert!(nvenc != x264, "exactly one encoder expected, args: {:?}", args);
            prop_assert_eq!(nvenc, use_nvenc);
        }
    }
}
