//! Camera Pipeline Daemon
//!
//! Background service that turns RTSP cameras into segmented browser
//! streams, supervises the external transcoding processes, triggers
//! recordings on motion, and retires old media on a retention schedule.

pub mod daemon;
pub mod encode;
pub mod motion;
pub mod poller;
pub mod process;
pub mod recorder;
pub mod registry;
pub mod retention;
pub mod startup;
pub mod status_server;
pub mod supervisor;
pub mod webrtc;

pub use camera_pipeline_config as config;
pub use camera_pipeline_config::{
    CameraConfig, MotionSettings, PipelineTuning, SettingsStore, StorageLayout,
};
pub use daemon::{BackgroundTasks, Daemon, DaemonError};
pub use encode::{
    build_frame_command, build_hls_command, build_segment_command, build_snapshot_command,
    Encoder, FrameSource, HlsParams, SegmentParams, SnapshotParams,
};
pub use motion::{detect_motion, BackgroundModel};
pub use poller::MotionPoller;
pub use recorder::{Recording, RecordingController};
pub use registry::{CameraRegistry, CameraStatus};
pub use retention::{sweep_directory, RetentionSweeper, SweepStats};
pub use startup::{
    check_ffmpeg_available, guess_rtsp_url, parse_ffmpeg_version, run_startup_checks,
    validate_rtsp_url, StartupError,
};
pub use status_server::{
    create_status_router, run_status_server, PipelineSnapshot, ServerError, StatusContext,
};
pub use supervisor::{StreamStatus, StreamSupervisor};
pub use webrtc::{WebRtcError, WebRtcStreamer};
