//! Recording controller
//!
//! Starts and stops the per-camera continuous recording processes, takes
//! on-demand snapshots, and lists recorded clips. Recording is a stream
//! copy into fixed-duration segments; stopping sends ffmpeg its `q` key so
//! the open segment gets finalized instead of truncated.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use camera_pipeline_config::{SettingsStore, StorageLayout};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::encode::{
    build_segment_command, build_snapshot_command, SegmentParams, SnapshotParams,
};
use crate::process::{await_exit, force_kill, spawn_stderr_drain};
use crate::registry::CameraRegistry;

/// Bookkeeping entry for one live recording process.
struct RecordingProcess {
    pid: u32,
    started_at: Instant,
    /// ffmpeg's stdin; writing `q` requests a clean shutdown.
    stdin: ChildStdin,
    exited: watch::Receiver<bool>,
}

/// One recorded clip, newest-first in listings.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Recording {
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Last-modified time, RFC 3339
    pub created: String,
}

/// Controls the per-camera recording processes and snapshot captures.
///
/// Invariant: at most one `RecordingProcess` per camera id.
pub struct RecordingController {
    registry: Arc<CameraRegistry>,
    settings: Arc<SettingsStore>,
    layout: StorageLayout,
    recordings: Arc<Mutex<HashMap<String, RecordingProcess>>>,
    stop_grace: Duration,
    snapshot_timeout: Duration,
}

impl RecordingController {
    pub fn new(
        registry: Arc<CameraRegistry>,
        settings: Arc<SettingsStore>,
        layout: StorageLayout,
        stop_grace: Duration,
        snapshot_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            settings,
            layout,
            recordings: Arc::new(Mutex::new(HashMap::new())),
            stop_grace,
            snapshot_timeout,
        }
    }

    /// Start continuous recording for a camera.
    ///
    /// Returns an identifier marking the recording as active, or None when
    /// a recording already runs, the camera is unknown, or the recorder
    /// cannot be spawned.
    pub async fn start_recording(&self, camera_id: &str) -> Option<String> {
        let recordings = self.recordings.lock().await;
        if recordings.contains_key(camera_id) {
            warn!(camera_id, "recording already active");
            return None;
        }

        let Some(source_uri) = self.registry.resolve_stream_uri(camera_id, None).await else {
            error!(camera_id, "cannot start recording: camera not found");
            return None;
        };

        let params = SegmentParams::new(&source_uri, self.layout.clips_dir(), camera_id);
        self.register_command(camera_id, build_segment_command(&params), recordings)
            .await
    }

    /// Spawn and register an already-built recorder command. The caller
    /// holds the table lock, so concurrent starts cannot both register.
    async fn register_command(
        &self,
        camera_id: &str,
        mut cmd: tokio::process::Command,
        mut recordings: tokio::sync::MutexGuard<'_, HashMap<String, RecordingProcess>>,
    ) -> Option<String> {
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(camera_id, error = %e, "failed to spawn recording process");
                return None;
            }
        };

        let Some(stdin) = child.stdin.take() else {
            error!(camera_id, "recording process has no stdin, killing");
            let _ = child.start_kill();
            return None;
        };
        let pid = child.id().unwrap_or(0);
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_drain("record", camera_id.to_string(), stderr);
        }

        let (exit_tx, exit_rx) = watch::channel(false);
        recordings.insert(
            camera_id.to_string(),
            RecordingProcess {
                pid,
                started_at: Instant::now(),
                stdin,
                exited: exit_rx,
            },
        );
        drop(recordings);

        self.spawn_monitor(camera_id.to_string(), child, exit_tx);
        self.registry.set_recording(camera_id, true).await;
        info!(target: "audit", event = "recording_started", camera_id);
        Some(format!("{}_recording_active", camera_id))
    }

    /// Monitor task for a recording process; the crash-vs-stop decision is
    /// the same table-presence check the stream supervisor uses.
    fn spawn_monitor(
        &self,
        camera_id: String,
        mut child: tokio::process::Child,
        exit_tx: watch::Sender<bool>,
    ) {
        let recordings = self.recordings.clone();
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            let _ = exit_tx.send(true);

            let removed = recordings.lock().await.remove(&camera_id);
            match removed {
                Some(entry) => {
                    let exit_code = status.ok().and_then(|s| s.code());
                    error!(
                        camera_id = %camera_id,
                        exit_code = ?exit_code,
                        uptime_secs = entry.started_at.elapsed().as_secs(),
                        "recording process exited unexpectedly"
                    );
                    registry.set_recording(&camera_id, false).await;
                }
                None => {
                    debug!(camera_id = %camera_id, "recording process exited after stop");
                }
            }
        });
    }

    /// Stop an active recording.
    ///
    /// Returns false when nothing is recording. The entry is removed before
    /// any signaling; the quit byte gives ffmpeg a chance to finalize the
    /// open segment, and a SIGKILL bounds the wait on timeout or any I/O
    /// error while signaling.
    pub async fn stop_recording(&self, camera_id: &str) -> bool {
        let entry = self.recordings.lock().await.remove(camera_id);
        let Some(mut entry) = entry else {
            warn!(camera_id, "no active recording to stop");
            return false;
        };

        let signaled: std::io::Result<()> = async {
            entry.stdin.write_all(b"q").await?;
            entry.stdin.flush().await?;
            Ok(())
        }
        .await;

        match signaled {
            Ok(()) => {
                if tokio::time::timeout(self.stop_grace, await_exit(&mut entry.exited))
                    .await
                    .is_err()
                {
                    warn!(camera_id, pid = entry.pid, "recorder ignored quit, killing");
                    force_kill(entry.pid);
                    let _ =
                        tokio::time::timeout(Duration::from_secs(2), await_exit(&mut entry.exited))
                            .await;
                }
            }
            Err(e) => {
                warn!(camera_id, pid = entry.pid, error = %e, "failed to signal recorder, killing");
                force_kill(entry.pid);
                let _ = tokio::time::timeout(Duration::from_secs(2), await_exit(&mut entry.exited))
                    .await;
            }
        }

        self.registry.set_recording(camera_id, false).await;
        info!(target: "audit", event = "recording_stopped", camera_id);
        true
    }

    /// Capture a single high-quality frame from a camera.
    ///
    /// Returns the snapshot filename, or None on timeout or a failed
    /// capture. Partial output from a failed run is deleted rather than
    /// reported as a result.
    pub async fn take_snapshot(&self, camera_id: &str) -> Option<String> {
        let Some(source_uri) = self.registry.resolve_stream_uri(camera_id, None).await else {
            error!(camera_id, "cannot take snapshot: camera not found");
            return None;
        };

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!("{}_{}.jpg", camera_id, timestamp);
        let output_path = self.layout.snapshots_dir().join(&filename);

        let params = SnapshotParams::new(&source_uri, output_path.clone());
        let mut cmd = build_snapshot_command(&params);

        let output = match tokio::time::timeout(self.snapshot_timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                error!(camera_id, error = %e, "failed to run snapshot capture");
                return None;
            }
            Err(_) => {
                error!(camera_id, "snapshot capture timed out");
                let _ = tokio::fs::remove_file(&output_path).await;
                return None;
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(camera_id, stderr = %stderr.trim(), "snapshot capture failed");
            let _ = tokio::fs::remove_file(&output_path).await;
            return None;
        }

        info!(target: "audit", event = "snapshot", camera_id, file = %filename);
        Some(filename)
    }

    pub async fn is_recording(&self, camera_id: &str) -> bool {
        self.recordings.lock().await.contains_key(camera_id)
    }

    /// Camera ids with an active recording, for the status endpoint.
    pub async fn active_recordings(&self) -> Vec<String> {
        self.recordings.lock().await.keys().cloned().collect()
    }

    /// List recorded clips, newest first.
    ///
    /// Filters by camera-id prefix when given and keeps only files modified
    /// within the retention window. The settings store's retention value
    /// wins over the caller's fallback, so listings always reflect current
    /// policy.
    pub fn list_recordings(
        &self,
        camera_id: Option<&str>,
        fallback_hours: u64,
    ) -> Vec<Recording> {
        let retention_hours = self
            .settings
            .get_u64("storage.retention_period_hours", fallback_hours);
        let cutoff = SystemTime::now() - Duration::from_secs(retention_hours * 3600);

        let entries = match std::fs::read_dir(self.layout.clips_dir()) {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "failed to read clips directory");
                return Vec::new();
            }
        };

        let mut recordings: Vec<(SystemTime, Recording)> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("mp4") {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(id) = camera_id {
                if !filename.starts_with(&format!("{}_", id)) {
                    continue;
                }
            }
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "could not stat recording");
                    continue;
                }
            };
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if modified <= cutoff {
                continue;
            }
            let created: DateTime<Utc> = modified.into();
            recordings.push((
                modified,
                Recording {
                    filename: filename.to_string(),
                    path: path.clone(),
                    size_bytes: metadata.len(),
                    created: created.to_rfc3339(),
                },
            ));
        }

        recordings.sort_by(|a, b| b.0.cmp(&a.0));
        recordings.into_iter().map(|(_, r)| r).collect()
    }
}
