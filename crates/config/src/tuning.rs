//! Pipeline timing knobs.
//!
//! Poll rates, grace periods, and sweep intervals are configurable under the
//! `pipeline.*` settings keys; the defaults below match the original
//! deployment values.

use crate::settings::SettingsStore;

/// Timing configuration for the background pipeline tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineTuning {
    /// Motion poll cadence in milliseconds (~10 Hz)
    pub poll_interval_ms: u64,
    /// Grace period before a stop escalates to a forced kill, seconds
    pub stop_grace_secs: u64,
    /// Upper bound on a one-shot snapshot capture, seconds
    pub snapshot_timeout_secs: u64,
    /// Upper bound on a single motion-frame read, seconds
    pub frame_read_timeout_secs: u64,
    /// Retention sweep interval, seconds
    pub sweep_interval_secs: u64,
    /// Sweep retry interval after a failed cycle, seconds
    pub sweep_retry_secs: u64,
    /// Local port for the status endpoint
    pub status_port: u16,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            stop_grace_secs: 10,
            snapshot_timeout_secs: 15,
            frame_read_timeout_secs: 5,
            sweep_interval_secs: 3600,
            sweep_retry_secs: 300,
            status_port: 7878,
        }
    }
}

impl PipelineTuning {
    /// Read tuning values from the settings store, falling back to the
    /// defaults for anything unset.
    pub fn from_settings(settings: &SettingsStore) -> Self {
        let defaults = Self::default();
        Self {
            poll_interval_ms: settings
                .get_u64("pipeline.poll_interval_ms", defaults.poll_interval_ms),
            stop_grace_secs: settings
                .get_u64("pipeline.stop_grace_secs", defaults.stop_grace_secs),
            snapshot_timeout_secs: settings.get_u64(
                "pipeline.snapshot_timeout_secs",
                defaults.snapshot_timeout_secs,
            ),
            frame_read_timeout_secs: settings.get_u64(
                "pipeline.frame_read_timeout_secs",
                defaults.frame_read_timeout_secs,
            ),
            sweep_interval_secs: settings
                .get_u64("pipeline.sweep_interval_secs", defaults.sweep_interval_secs),
            sweep_retry_secs: settings
                .get_u64("pipeline.sweep_retry_secs", defaults.sweep_retry_secs),
            status_port: settings.get_u64("pipeline.status_port", defaults.status_port as u64)
                as u16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let tuning = PipelineTuning::default();

        assert_eq!(tuning.poll_interval_ms, 100);
        assert_eq!(tuning.stop_grace_secs, 10);
        assert_eq!(tuning.snapshot_timeout_secs, 15);
        assert_eq!(tuning.sweep_interval_secs, 3600);
        assert_eq!(tuning.sweep_retry_secs, 300);
        assert_eq!(tuning.status_port, 7878);
    }

    #[test]
    fn test_from_settings_overrides() {
        let store = SettingsStore::parse_json(
            r#"{ "pipeline": { "poll_interval_ms": 250, "sweep_interval_secs": 600 } }"#,
        )
        .unwrap();

        let tuning = PipelineTuning::from_settings(&store);

        assert_eq!(tuning.poll_interval_ms, 250);
        assert_eq!(tuning.sweep_interval_secs, 600);
        // Unset values keep their defaults
        assert_eq!(tuning.stop_grace_secs, 10);
        assert_eq!(tuning.status_port, 7878);
    }

    #[test]
    fn test_from_empty_settings_is_default() {
        let store = SettingsStore::empty();
        assert_eq!(PipelineTuning::from_settings(&store), PipelineTuning::default());
    }
}
