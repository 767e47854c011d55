//! Stream process supervisor
//!
//! Owns one external transcoding process per actively streaming camera,
//! plus the access tokens gating segment-file reads. Every process gets a
//! dedicated monitor task, so a crash on one camera is detected immediately
//! and never affects the others.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::process::Command;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::encode::{build_hls_command, Encoder, HlsParams};
use crate::process::{await_exit, force_kill, request_termination, spawn_stderr_drain};

/// Length of a stream access token.
pub const TOKEN_LEN: usize = 22;

/// Bookkeeping entry for one live stream transcoder.
///
/// The child handle itself lives in the monitor task; this entry carries
/// what the request path needs to signal and to wait for the exit.
#[derive(Debug, Clone)]
pub struct StreamProcess {
    pub camera_id: String,
    pub pid: u32,
    pub started_at: Instant,
    exited: watch::Receiver<bool>,
}

/// Serializable view of an active stream, for the status endpoint.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct StreamStatus {
    pub camera_id: String,
    pub pid: u32,
    pub uptime_secs: u64,
}

/// Supervises the per-camera transcoding processes and their access tokens.
///
/// Invariant: at most one `StreamProcess` per camera id. Both tables are
/// mutex-guarded; the request path and the monitor tasks are the only
/// writers.
pub struct StreamSupervisor {
    processes: Arc<Mutex<HashMap<String, StreamProcess>>>,
    /// Access tokens by camera id. A token has no expiry of its own; it
    /// lives until the stream is stopped or a fresh token replaces it.
    tokens: Arc<Mutex<HashMap<String, String>>>,
    stop_grace: Duration,
}

impl StreamSupervisor {
    pub fn new(stop_grace: Duration) -> Self {
        Self {
            processes: Arc::new(Mutex::new(HashMap::new())),
            tokens: Arc::new(Mutex::new(HashMap::new())),
            stop_grace,
        }
    }

    /// Start a segmented-stream transcode for a camera.
    ///
    /// Returns false without side effects when a stream is already
    /// registered for the camera or the process cannot be spawned. On
    /// success the process is registered and monitored; the call does not
    /// wait for the playlist to appear.
    pub async fn start(
        &self,
        camera_id: &str,
        source_uri: &str,
        output_dir: &Path,
        encoder: Encoder,
    ) -> bool {
        if let Err(e) = tokio::fs::create_dir_all(output_dir).await {
            error!(camera_id, error = %e, "failed to create stream output directory");
            return false;
        }
        let params = HlsParams::new(source_uri, output_dir.to_path_buf(), camera_id, encoder);
        self.start_command(camera_id, build_hls_command(&params))
            .await
    }

    /// Spawn and register an already-built command. The table lock is held
    /// across the spawn so two concurrent starts cannot both register.
    async fn start_command(&self, camera_id: &str, mut cmd: Command) -> bool {
        let mut processes = self.processes.lock().await;
        if processes.contains_key(camera_id) {
            warn!(camera_id, "stream already running");
            return false;
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(camera_id, error = %e, "failed to spawn stream transcoder");
                return false;
            }
        };

        let pid = child.id().unwrap_or(0);
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_drain("hls", camera_id.to_string(), stderr);
        }

        let (exit_tx, exit_rx) = watch::channel(false);
        processes.insert(
            camera_id.to_string(),
            StreamProcess {
                camera_id: camera_id.to_string(),
                pid,
                started_at: Instant::now(),
                exited: exit_rx,
            },
        );
        drop(processes);

        self.spawn_monitor(camera_id.to_string(), child, exit_tx);
        info!(camera_id, pid, "started segmented stream");
        true
    }

    /// Monitor task: waits for the process to exit, then decides whether
    /// the exit was a crash.
    ///
    /// If the table still holds the entry, nobody called `stop`, so the
    /// process died on its own; clean up and log the crash. If the entry is
    /// gone, a `stop` already removed it before signaling. Table presence
    /// is the only discriminator, which is why `stop` must remove the entry
    /// before sending any signal.
    fn spawn_monitor(
        &self,
        camera_id: String,
        mut child: tokio::process::Child,
        exit_tx: watch::Sender<bool>,
    ) {
        let processes = self.processes.clone();
        let tokens = self.tokens.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            let _ = exit_tx.send(true);

            let removed = processes.lock().await.remove(&camera_id);
            match removed {
                Some(entry) => {
                    let exit_code = status.ok().and_then(|s| s.code());
                    error!(
                        camera_id = %camera_id,
                        exit_code = ?exit_code,
                        uptime_secs = entry.started_at.elapsed().as_secs(),
                        "stream transcoder exited unexpectedly"
                    );
                    tokens.lock().await.remove(&camera_id);
                }
                None => {
                    debug!(camera_id = %camera_id, "stream transcoder exited after stop");
                }
            }
        });
    }

    /// Stop a camera's stream.
    ///
    /// Returns false when no stream is registered. The entry and its token
    /// are removed synchronously before the process is signaled; a SIGTERM
    /// that is ignored past the grace period escalates to SIGKILL, so the
    /// call is always bounded.
    pub async fn stop(&self, camera_id: &str) -> bool {
        let entry = self.processes.lock().await.remove(camera_id);
        let Some(entry) = entry else {
            warn!(camera_id, "no active stream to stop");
            return false;
        };
        self.tokens.lock().await.remove(camera_id);

        request_termination(entry.pid);
        let mut exited = entry.exited.clone();
        if tokio::time::timeout(self.stop_grace, await_exit(&mut exited))
            .await
            .is_err()
        {
            warn!(camera_id, pid = entry.pid, "stream transcoder ignored SIGTERM, killing");
            force_kill(entry.pid);
            let _ = tokio::time::timeout(Duration::from_secs(2), await_exit(&mut exited)).await;
        }

        info!(camera_id, "stopped stream");
        true
    }

    /// Generate and register a fresh access token for a camera.
    ///
    /// Overwrites any prior token. Issuing before the stream starts is
    /// allowed, so the serving layer can hand the player a token along with
    /// the stream URL.
    pub async fn issue_token(&self, camera_id: &str) -> String {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();
        self.tokens
            .lock()
            .await
            .insert(camera_id.to_string(), token.clone());
        token
    }

    /// Check a presented token against the registered one.
    pub async fn verify_token(&self, camera_id: &str, token: &str) -> bool {
        self.tokens
            .lock()
            .await
            .get(camera_id)
            .map(|registered| registered == token)
            .unwrap_or(false)
    }

    pub async fn is_streaming(&self, camera_id: &str) -> bool {
        self.processes.lock().await.contains_key(camera_id)
    }

    /// Snapshot of all active streams for the status endpoint.
    pub async fn active_streams(&self) -> Vec<StreamStatus> {
        self.processes
            .lock()
            .await
            .values()
            .map(|p| StreamStatus {
                camera_id: p.camera_id.clone(),
                pid: p.pid,
                uptime_secs: p.started_at.elapsed().as_secs(),
            })
            .collect()
    }
}
