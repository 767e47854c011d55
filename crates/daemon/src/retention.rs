//! Retention sweeper
//!
//! A long-interval background loop that deletes snapshots, clips, and
//! thumbnails older than the configured retention window. Policy is read
//! fresh from the settings store every cycle, so changes apply without a
//! restart.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use camera_pipeline_config::{SettingsStore, StorageLayout};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Fallback retention window in hours.
pub const DEFAULT_RETENTION_HOURS: u64 = 7;

/// Outcome of sweeping one directory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub deleted: usize,
    pub failed: usize,
}

/// The retention cleanup background loop.
pub struct RetentionSweeper {
    settings: Arc<SettingsStore>,
    layout: StorageLayout,
    sweep_interval: Duration,
    retry_interval: Duration,
    shutdown: CancellationToken,
}

impl RetentionSweeper {
    pub fn new(
        settings: Arc<SettingsStore>,
        layout: StorageLayout,
        sweep_interval: Duration,
        retry_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            settings,
            layout,
            sweep_interval,
            retry_interval,
            shutdown,
        }
    }

    /// Spawn the sweep loop as a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        info!(
            interval_secs = self.sweep_interval.as_secs(),
            "retention sweeper started"
        );
        loop {
            let next_interval = match self.sweep_cycle() {
                Ok(stats) => {
                    if stats.deleted > 0 || stats.failed > 0 {
                        info!(
                            deleted = stats.deleted,
                            failed = stats.failed,
                            "retention sweep finished"
                        );
                    }
                    self.sweep_interval
                }
                Err(e) => {
                    // A broken cycle retries sooner instead of waiting out
                    // the full interval
                    error!(error = %e, "retention sweep failed, retrying sooner");
                    self.retry_interval
                }
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(next_interval) => {}
            }
        }
        info!("retention sweeper stopped");
    }

    /// One sweep across all managed directories, honoring current policy.
    fn sweep_cycle(&self) -> Result<SweepStats, std::io::Error> {
        if !self.settings.get_bool("storage.auto_cleanup", true) {
            debug!("auto cleanup disabled, skipping sweep");
            return Ok(SweepStats::default());
        }

        let retention_hours = self
            .settings
            .get_u64("storage.retention_period_hours", DEFAULT_RETENTION_HOURS);
        let cutoff = SystemTime::now() - Duration::from_secs(retention_hours * 3600);

        let mut totals = SweepStats::default();
        for dir in self.layout.retention_dirs() {
            if !dir.exists() {
                continue;
            }
            let stats = sweep_directory(&dir, cutoff)?;
            totals.deleted += stats.deleted;
            totals.failed += stats.failed;
        }
        Ok(totals)
    }
}

/// Delete every file in `dir` whose modification time precedes `cutoff`.
///
/// A single file that fails to stat or delete is logged and skipped; the
/// rest of the directory is still swept. Only a failure to walk the
/// directory itself is an error.
pub fn sweep_directory(dir: &Path, cutoff: SystemTime) -> Result<SweepStats, std::io::Error> {
    let mut stats = SweepStats::default();

    for entry in WalkDir::new(dir).max_depth(1) {
        let entry = entry.map_err(|e| {
            e.into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed"))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let modified = match entry.metadata().ok().and_then(|m| m.modified().ok()) {
            Some(modified) => modified,
            None => {
                warn!(file = %entry.path().display(), "could not stat file");
                stats.failed += 1;
                continue;
            }
        };

        if modified >= cutoff {
            continue;
        }

        match std::fs::remove_file(entry.path()) {
            Ok(()) => {
                debug!(file = %entry.path().display(), "cleaned up old file");
                stats.deleted += 1;
            }
            Err(e) => {
                warn!(file = %entry.path().display(), error = %e, "failed to delete old file");
                stats.failed += 1;
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn write_aged(dir: &Path, name: &str, age: Duration) {
        let file = File::create(dir.join(name)).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn test_sweep_deletes_only_expired_files() {
        let dir = TempDir::new().unwrap();
        write_aged(dir.path(), "old.mp4", Duration::from_secs(10 * 3600));
        write_aged(dir.path(), "fresh.mp4", Duration::from_secs(3600));

        let cutoff = SystemTime::now() - Duration::from_secs(7 * 3600);
        let stats = sweep_directory(dir.path(), cutoff).unwrap();

        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.failed, 0);
        assert!(!dir.path().join("old.mp4").exists());
        assert!(dir.path().join("fresh.mp4").exists());
    }

    #[test]
    fn test_sweep_ignores_subdirectories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        write_aged(dir.path(), "old.jpg", Duration::from_secs(10 * 3600));

        let cutoff = SystemTime::now() - Duration::from_secs(7 * 3600);
        let stats = sweep_directory(dir.path(), cutoff).unwrap();

        assert_eq!(stats.deleted, 1);
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn test_sweep_empty_directory() {
        let dir = TempDir::new().unwrap();
        let cutoff = SystemTime::now();
        assert_eq!(sweep_directory(dir.path(), cutoff).unwrap(), SweepStats::default());
    }

    fn sweeper_with(settings_json: &str, root: &Path) -> RetentionSweeper {
        let settings = Arc::new(SettingsStore::parse_json(settings_json).unwrap());
        let layout = StorageLayout::new(root);
        layout.ensure().unwrap();
        RetentionSweeper::new(
            settings,
            layout,
            Duration::from_secs(3600),
            Duration::from_secs(300),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_cycle_sweeps_all_managed_directories() {
        let dir = TempDir::new().unwrap();
        let sweeper = sweeper_with(
            r#"{ "storage": { "auto_cleanup": true, "retention_period_hours": 7 } }"#,
            dir.path(),
        );

        let old = Duration::from_secs(10 * 3600);
        let fresh = Duration::from_secs(3600);
        write_aged(&sweeper.layout.snapshots_dir(), "a.jpg", old);
        write_aged(&sweeper.layout.clips_dir(), "b.mp4", old);
        write_aged(&sweeper.layout.thumbnails_dir(), "c.jpg", old);
        write_aged(&sweeper.layout.clips_dir(), "keep.mp4", fresh);

        let stats = sweeper.sweep_cycle().unwrap();
        assert_eq!(stats.deleted, 3);
        assert!(sweeper.layout.clips_dir().join("keep.mp4").exists());
    }

    #[test]
    fn test_cycle_respects_auto_cleanup_flag() {
        let dir = TempDir::new().unwrap();
        let sweeper = sweeper_with(
            r#"{ "storage": { "auto_cleanup": false, "retention_period_hours": 7 } }"#,
            dir.path(),
        );

        write_aged(
            &sweeper.layout.clips_dir(),
            "old.mp4",
            Duration::from_secs(100 * 3600),
        );

        let stats = sweeper.sweep_cycle().unwrap();
        assert_eq!(stats.deleted, 0);
        assert!(sweeper.layout.clips_dir().join("old.mp4").exists());
    }

    #[test]
    fn test_cycle_reads_retention_fresh_each_time() {
        let dir = TempDir::new().unwrap();
        let sweeper = sweeper_with(
            r#"{ "storage": { "auto_cleanup": true, "retention_period_hours": 100 } }"#,
            dir.path(),
        );

        write_aged(
            &sweeper.layout.clips_dir(),
            "old.mp4",
            Duration::from_secs(50 * 3600),
        );

        // Inside the 100-hour window: preserved
        assert_eq!(sweeper.sweep_cycle().unwrap().deleted, 0);

        // Tighten the policy; the next cycle must pick it up unprompted
        sweeper
            .settings
            .set("storage.retention_period_hours", serde_json::json!(24));
        assert_eq!(sweeper.sweep_cycle().unwrap().deleted, 1);
    }

    #[tokio::test]
    async fn test_sweeper_shuts_down_promptly() {
        let dir = TempDir::new().unwrap();
        let shutdown = CancellationToken::new();
        let settings = Arc::new(SettingsStore::parse_json("{}").unwrap());
        let layout = StorageLayout::new(dir.path());
        layout.ensure().unwrap();
        let sweeper = RetentionSweeper::new(
            settings,
            layout,
            Duration::from_secs(3600),
            Duration::from_secs(300),
            shutdown.clone(),
        );

        let handle = sweeper.spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sweeper should stop on cancellation")
            .unwrap();
    }
}
