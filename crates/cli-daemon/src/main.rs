//! CLI entry point for the camera pipeline daemon
//!
//! Parses command line arguments, initializes logging, and runs the daemon
//! until interrupted.

use camera_pipeline_daemon::{run_startup_checks, Daemon, StorageLayout};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

/// Camera pipeline daemon - RTSP cameras to browser streams, with motion
/// recording and retention cleanup
#[derive(Parser, Debug)]
#[command(name = "camera-pipeline-daemon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the settings file (config.json)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Root directory for streams, clips, snapshots, and thumbnails
    #[arg(short, long, default_value = "storage")]
    storage_root: PathBuf,

    /// Treat a failed ffmpeg probe as fatal instead of a warning
    #[arg(long, default_value = "false")]
    require_ffmpeg: bool,

    /// Start streams for every configured camera at boot
    #[arg(long, default_value = "false")]
    autostart_streams: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("camera_pipeline_daemon=info".parse().unwrap())
                .add_directive("camera_pipeline_cli=info".parse().unwrap()),
        )
        .init();

    info!(config = %args.config.display(), storage = %args.storage_root.display(), "camera pipeline daemon starting");

    if args.require_ffmpeg {
        let layout = StorageLayout::new(&args.storage_root);
        if let Err(e) = run_startup_checks(&layout) {
            error!(error = %e, "startup checks failed");
            return ExitCode::FAILURE;
        }
    }

    let daemon = match Daemon::new(args.config, args.storage_root) {
        Ok(daemon) => daemon,
        Err(e) => {
            error!(error = %e, "failed to initialize daemon");
            return ExitCode::FAILURE;
        }
    };

    info!(
        cameras = daemon.registry.camera_count().await,
        status_port = daemon.tuning.status_port,
        "daemon initialized"
    );

    if args.autostart_streams {
        for camera in daemon.registry.list_cameras().await {
            if !daemon.start_stream(&camera.id, None).await {
                warn!(camera_id = %camera.id, "could not start stream at boot");
            }
        }
    }

    let tasks = daemon.spawn_background_tasks();

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to wait for shutdown signal");
    }

    daemon.shutdown(tasks).await;
    ExitCode::SUCCESS
}
