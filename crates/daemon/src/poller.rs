//! Motion poller
//!
//! One background loop polls every motion-enabled camera at a fixed cadence
//! instead of spawning a thread per camera, bounding total analysis cost.
//! Tracker state is created lazily and torn down whenever the source
//! misbehaves, so a dropped RTSP connection heals itself on the next cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use camera_pipeline_config::PipelineTuning;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::encode::{FrameSource, FRAME_HEIGHT, FRAME_WIDTH};
use crate::motion::{detect_motion, BackgroundModel};
use crate::recorder::RecordingController;
use crate::registry::CameraRegistry;

/// Frames per second requested from each analysis decoder.
const ANALYSIS_FPS: u32 = 10;

/// Per-camera analysis state, alive only while detection is enabled and the
/// frame source is healthy.
struct MotionTracker {
    source: FrameSource,
    model: BackgroundModel,
    last_triggered: Option<Instant>,
    frame: Vec<u8>,
}

impl MotionTracker {
    fn new(source: FrameSource) -> Self {
        Self {
            source,
            model: BackgroundModel::new(FRAME_WIDTH, FRAME_HEIGHT),
            last_triggered: None,
            frame: Vec::new(),
        }
    }
}

/// The motion detection background loop.
pub struct MotionPoller {
    registry: Arc<CameraRegistry>,
    recorder: Arc<RecordingController>,
    tuning: PipelineTuning,
    shutdown: CancellationToken,
}

impl MotionPoller {
    pub fn new(
        registry: Arc<CameraRegistry>,
        recorder: Arc<RecordingController>,
        tuning: PipelineTuning,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            recorder,
            tuning,
            shutdown,
        }
    }

    /// Spawn the poll loop as a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        info!(
            interval_ms = self.tuning.poll_interval_ms,
            "motion poller started"
        );
        let mut trackers: HashMap<String, MotionTracker> = HashMap::new();
        let mut tick =
            tokio::time::interval(Duration::from_millis(self.tuning.poll_interval_ms.max(1)));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tick.tick() => {}
            }
            self.poll_cycle(&mut trackers).await;
        }

        // Dropping a tracker kills its decoder; all sources are released
        // before the task returns
        trackers.clear();
        info!("motion poller stopped");
    }

    /// One pass over every known camera.
    async fn poll_cycle(&self, trackers: &mut HashMap<String, MotionTracker>) {
        let cameras = self.registry.list_cameras().await;

        // Cameras deleted from the registry lose their tracker too
        trackers.retain(|id, _| cameras.iter().any(|c| &c.id == id));

        for camera in cameras {
            if !camera.motion.enabled {
                if trackers.remove(&camera.id).is_some() {
                    debug!(camera_id = %camera.id, "motion detection disabled, released tracker");
                }
                continue;
            }

            if !trackers.contains_key(&camera.id) {
                let Some(uri) = self.registry.resolve_stream_uri(&camera.id, None).await else {
                    continue;
                };
                let read_timeout = Duration::from_secs(self.tuning.frame_read_timeout_secs);
                match FrameSource::open(&uri, ANALYSIS_FPS, read_timeout) {
                    Ok(source) => {
                        debug!(camera_id = %camera.id, "opened motion tracker");
                        trackers.insert(camera.id.clone(), MotionTracker::new(source));
                    }
                    Err(e) => {
                        warn!(camera_id = %camera.id, error = %e, "failed to open frame source");
                        continue;
                    }
                }
            }

            let tracker = trackers
                .get_mut(&camera.id)
                .expect("tracker inserted above");
            if let Err(e) = tracker.source.read_frame(&mut tracker.frame).await {
                // Source exhausted or disconnected: drop everything and let
                // the next cycle rebuild from scratch
                warn!(camera_id = %camera.id, error = %e, "frame read failed, resetting tracker");
                trackers.remove(&camera.id);
                continue;
            }

            let tracker = trackers
                .get_mut(&camera.id)
                .expect("tracker present after successful read");
            let frame = std::mem::take(&mut tracker.frame);
            let motion = detect_motion(&mut tracker.model, &frame, camera.motion.min_area);
            tracker.frame = frame;

            if !motion {
                continue;
            }

            let cooldown = Duration::from_secs(camera.motion.cooldown_secs);
            if !cooldown_allows(tracker.last_triggered, cooldown) {
                // Within cooldown: no recording call, no state change
                continue;
            }

            info!(camera_id = %camera.id, "motion detected, triggering recording");
            tracker.last_triggered = Some(Instant::now());

            // Recording startup spawns a process; keep it off the poll loop
            let recorder = self.recorder.clone();
            let camera_id = camera.id.clone();
            tokio::spawn(async move {
                recorder.start_recording(&camera_id).await;
            });
        }
    }
}

/// Decide whether a motion event may trigger, given the previous trigger
/// time. Extracted for direct testing of the cooldown rule.
pub fn cooldown_allows(last_triggered: Option<Instant>, cooldown: Duration) -> bool {
    last_triggered.map(|t| t.elapsed() > cooldown).unwrap_or(true)
}
