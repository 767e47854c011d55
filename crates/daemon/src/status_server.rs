//! Status HTTP server
//!
//! Exposes a pipeline status snapshot via a local HTTP endpoint for
//! dashboards and monitoring tools.

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

use crate::recorder::RecordingController;
use crate::registry::CameraRegistry;
use crate::supervisor::{StreamStatus, StreamSupervisor};

/// Errors that can occur when running the status server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

/// Host load figures attached to every snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SystemLoad {
    pub cpu_usage_percent: f32,
    pub mem_usage_percent: f32,
    pub load_avg_1: f32,
}

/// Point-in-time view of the whole pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineSnapshot {
    pub timestamp_unix_ms: i64,
    pub cameras: usize,
    pub streams: Vec<StreamStatus>,
    pub recordings: Vec<String>,
    pub system: SystemLoad,
}

/// Shared handles the status handler reads from.
#[derive(Clone)]
pub struct StatusContext {
    pub registry: Arc<CameraRegistry>,
    pub supervisor: Arc<StreamSupervisor>,
    pub recorder: Arc<RecordingController>,
}

/// Collect current host load using sysinfo
fn collect_system_load() -> SystemLoad {
    use sysinfo::System;

    let mut sys = System::new();
    sys.refresh_cpu_usage();
    sys.refresh_memory();

    let total_memory = sys.total_memory();
    let used_memory = sys.used_memory();
    let mem_usage = if total_memory > 0 {
        (used_memory as f64 / total_memory as f64 * 100.0) as f32
    } else {
        0.0
    };

    SystemLoad {
        cpu_usage_percent: sys.global_cpu_usage(),
        mem_usage_percent: mem_usage,
        load_avg_1: System::load_average().one as f32,
    }
}

fn timestamp_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Handler for GET /status: builds a fresh snapshot per request
async fn get_status(State(ctx): State<StatusContext>) -> Json<PipelineSnapshot> {
    let mut streams = ctx.supervisor.active_streams().await;
    streams.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
    let mut recordings = ctx.recorder.active_recordings().await;
    recordings.sort();

    Json(PipelineSnapshot {
        timestamp_unix_ms: timestamp_ms(),
        cameras: ctx.registry.camera_count().await,
        streams,
        recordings,
        system: collect_system_load(),
    })
}

/// Creates the axum Router with the status endpoint
pub fn create_status_router(ctx: StatusContext) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .with_state(ctx)
}

/// Runs the status HTTP server on 127.0.0.1 at the given port until the
/// shutdown token fires.
pub async fn run_status_server(
    ctx: StatusContext,
    port: u16,
    shutdown: tokio_util::sync::CancellationToken,
) -> Result<(), ServerError> {
    let app = create_status_router(ctx);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(ServerError::BindError)?;

    Ok(())
}
