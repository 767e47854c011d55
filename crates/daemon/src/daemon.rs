//! Daemon wiring and lifecycle for the camera pipeline
//!
//! Builds the shared components, spawns the background tasks (motion
//! poller, retention sweeper, status server), and joins them all on
//! shutdown so the process exits deterministically.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use camera_pipeline_config::{PipelineTuning, SettingsStore, StorageLayout};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::encode::Encoder;
use crate::poller::MotionPoller;
use crate::recorder::RecordingController;
use crate::registry::CameraRegistry;
use crate::retention::RetentionSweeper;
use crate::startup::{check_ffmpeg_available, StartupError};
use crate::status_server::{run_status_server, StatusContext};
use crate::supervisor::StreamSupervisor;

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),
}

/// Handles of the long-lived background tasks, joined on shutdown.
pub struct BackgroundTasks {
    pub poller: JoinHandle<()>,
    pub sweeper: JoinHandle<()>,
    pub status_server: JoinHandle<()>,
}

/// Daemon state containing all runtime components
pub struct Daemon {
    pub settings: Arc<SettingsStore>,
    pub layout: StorageLayout,
    pub tuning: PipelineTuning,
    pub registry: Arc<CameraRegistry>,
    pub supervisor: Arc<StreamSupervisor>,
    pub recorder: Arc<RecordingController>,
    shutdown: CancellationToken,
}

impl Daemon {
    /// Initialize the daemon from a settings file and storage root.
    ///
    /// The storage tree is created up front; failure there is fatal. A
    /// missing ffmpeg only warns at this point, so the daemon can come up
    /// on a box that gets ffmpeg installed later.
    pub fn new<P: AsRef<Path>>(settings_path: P, storage_root: P) -> Result<Self, DaemonError> {
        let settings = SettingsStore::load_or_default(settings_path);
        settings.apply_env_overrides();

        let layout = StorageLayout::new(storage_root);
        layout.ensure().map_err(StartupError::Storage)?;

        if let Err(e) = check_ffmpeg_available() {
            warn!(error = %e, "ffmpeg probe failed; streaming will not work until it is installed");
        }

        Ok(Self::with_settings(Arc::new(settings), layout))
    }

    /// Build the daemon from already-loaded settings. The storage tree must
    /// exist; no checks run here.
    pub fn with_settings(settings: Arc<SettingsStore>, layout: StorageLayout) -> Self {
        let tuning = PipelineTuning::from_settings(&settings);
        let registry = Arc::new(CameraRegistry::from_settings(settings.clone()));
        let supervisor = Arc::new(StreamSupervisor::new(Duration::from_secs(
            tuning.stop_grace_secs,
        )));
        let recorder = Arc::new(RecordingController::new(
            registry.clone(),
            settings.clone(),
            layout.clone(),
            Duration::from_secs(tuning.stop_grace_secs),
            Duration::from_secs(tuning.snapshot_timeout_secs),
        ));

        Self {
            settings,
            layout,
            tuning,
            registry,
            supervisor,
            recorder,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token observed by every background task.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start a camera's segmented stream.
    ///
    /// Resolves the source URI (with constructed-URI fallback), reads the
    /// encoder preference, and hands off to the supervisor. Returns true if
    /// the stream is running afterwards, including the case where it
    /// already was.
    pub async fn start_stream(&self, camera_id: &str, profile_token: Option<&str>) -> bool {
        if self.supervisor.is_streaming(camera_id).await {
            warn!(camera_id, "stream already running");
            return true;
        }

        let Some(camera) = self.registry.get(camera_id).await else {
            error!(camera_id, "cannot start stream: camera not found");
            return false;
        };
        let profile = profile_token.or(camera.profile_token.as_deref());
        let Some(source_uri) = self.registry.resolve_stream_uri(camera_id, profile).await else {
            error!(camera_id, "cannot start stream: no source URI");
            return false;
        };

        let encoder = Encoder::from_preference(self.settings.get_bool("general.use_nvenc", true));
        let output_dir = self.layout.camera_stream_dir(camera_id);
        let started = self
            .supervisor
            .start(camera_id, &source_uri, &output_dir, encoder)
            .await;

        self.registry.set_streaming(camera_id, started).await;
        started
    }

    /// Stop a camera's segmented stream.
    pub async fn stop_stream(&self, camera_id: &str) -> bool {
        let stopped = self.supervisor.stop(camera_id).await;
        if stopped {
            self.registry.set_streaming(camera_id, false).await;
        }
        stopped
    }

    /// Spawn the motion poller, retention sweeper, and status server.
    pub fn spawn_background_tasks(&self) -> BackgroundTasks {
        let poller = MotionPoller::new(
            self.registry.clone(),
            self.recorder.clone(),
            self.tuning.clone(),
            self.shutdown.clone(),
        )
        .spawn();

        let sweeper = RetentionSweeper::new(
            self.settings.clone(),
            self.layout.clone(),
            Duration::from_secs(self.tuning.sweep_interval_secs),
            Duration::from_secs(self.tuning.sweep_retry_secs),
            self.shutdown.clone(),
        )
        .spawn();

        let ctx = StatusContext {
            registry: self.registry.clone(),
            supervisor: self.supervisor.clone(),
            recorder: self.recorder.clone(),
        };
        let port = self.tuning.status_port;
        let shutdown = self.shutdown.clone();
        let status_server = tokio::spawn(async move {
            if let Err(e) = run_status_server(ctx, port, shutdown).await {
                error!(error = %e, "status server error");
            }
        });

        BackgroundTasks {
            poller,
            sweeper,
            status_server,
        }
    }

    /// Cancel and join every background task, then stop all remaining
    /// streams and recordings.
    pub async fn shutdown(&self, tasks: BackgroundTasks) {
        info!("shutting down pipeline");
        self.shutdown.cancel();

        for (name, handle) in [
            ("poller", tasks.poller),
            ("sweeper", tasks.sweeper),
            ("status_server", tasks.status_server),
        ] {
            if handle.await.is_err() {
                error!(task = name, "background task panicked");
            }
        }

        for stream in self.supervisor.active_streams().await {
            self.supervisor.stop(&stream.camera_id).await;
        }
        for camera_id in self.recorder.active_recordings().await {
            self.recorder.stop_recording(&camera_id).await;
        }
        info!("pipeline stopped");
    }
}
