//! Camera registry
//!
//! Holds the known cameras, their transient runtime status, and the stream
//! URI resolution chain. Camera identity comes from the settings store; the
//! pipeline reads it and flips status flags but never rewrites identity.

use camera_pipeline_config::{CameraConfig, SettingsStore};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Transient per-camera runtime flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CameraStatus {
    pub streaming: bool,
    pub recording: bool,
}

/// Shared camera table with URI resolution.
///
/// Every map is lock-guarded: the motion poller, monitor tasks, and the
/// request path all read and write here concurrently.
pub struct CameraRegistry {
    settings: Arc<SettingsStore>,
    cameras: RwLock<HashMap<String, CameraConfig>>,
    /// URIs deposited by the external ONVIF layer, keyed by camera id.
    resolved_uris: RwLock<HashMap<String, String>>,
    statuses: RwLock<HashMap<String, CameraStatus>>,
}

impl CameraRegistry {
    /// Build the registry from the settings store's camera list.
    pub fn from_settings(settings: Arc<SettingsStore>) -> Self {
        let cameras: HashMap<String, CameraConfig> = settings
            .camera_configs()
            .into_iter()
            .filter(|c| {
                if c.id.is_empty() {
                    warn!("skipping configured camera with no id");
                    false
                } else {
                    true
                }
            })
            .map(|c| (c.id.clone(), c))
            .collect();
        info!(count = cameras.len(), "loaded cameras from settings");
        Self {
            settings,
            cameras: RwLock::new(cameras),
            resolved_uris: RwLock::new(HashMap::new()),
            statuses: RwLock::new(HashMap::new()),
        }
    }

    /// All configured cameras, in no particular order.
    pub async fn list_cameras(&self) -> Vec<CameraConfig> {
        self.cameras.read().await.values().cloned().collect()
    }

    pub async fn get(&self, camera_id: &str) -> Option<CameraConfig> {
        self.cameras.read().await.get(camera_id).cloned()
    }

    pub async fn camera_count(&self) -> usize {
        self.cameras.read().await.len()
    }

    /// Register a new camera and persist it.
    ///
    /// Assigns a fresh UUID when the config carries no id. Returns the
    /// camera id, or None when the settings store rejects the entry
    /// (duplicate IP).
    pub async fn add_camera(&self, mut config: CameraConfig) -> Option<String> {
        if let Some(url) = &config.rtsp_url {
            if !crate::startup::validate_rtsp_url(url) {
                warn!(name = %config.name, url = %url, "rejecting camera with malformed rtsp_url");
                return None;
            }
        }
        if config.id.is_empty() {
            config.id = Uuid::new_v4().to_string();
        }
        if !self.settings.add_camera_config(&config) {
            return None;
        }
        let id = config.id.clone();
        self.cameras.write().await.insert(id.clone(), config);
        info!(camera_id = %id, "registered camera");
        Some(id)
    }

    /// Remove a camera from the runtime table and the settings store.
    pub async fn remove_camera(&self, camera_id: &str) -> bool {
        let existed = self.cameras.write().await.remove(camera_id).is_some();
        if !existed {
            warn!(camera_id, "attempted to remove unknown camera");
            return false;
        }
        self.resolved_uris.write().await.remove(camera_id);
        self.statuses.write().await.remove(camera_id);
        self.settings.remove_camera_config(camera_id);
        true
    }

    /// Deposit an externally resolved stream URI for a camera.
    ///
    /// This is the seam where the ONVIF layer hands over the result of its
    /// GetStreamUri call; resolution order prefers it over everything else.
    pub async fn set_resolved_uri(&self, camera_id: &str, uri: String) {
        self.resolved_uris
            .write()
            .await
            .insert(camera_id.to_string(), uri);
    }

    pub async fn clear_resolved_uri(&self, camera_id: &str) {
        self.resolved_uris.write().await.remove(camera_id);
    }

    /// Resolve a camera's stream URI.
    ///
    /// Order: deposited ONVIF URI, explicit rtsp_url override, constructed
    /// URI from stored credentials and ports. Only an unknown camera id
    /// yields None. The profile token is recorded by the ONVIF layer when it
    /// deposits a URI; it does not alter the fallback chain.
    pub async fn resolve_stream_uri(
        &self,
        camera_id: &str,
        _profile_token: Option<&str>,
    ) -> Option<String> {
        let camera = self.get(camera_id).await?;

        if let Some(uri) = self.resolved_uris.read().await.get(camera_id) {
            return Some(uri.clone());
        }

        if let Some(uri) = &camera.rtsp_url {
            return Some(uri.clone());
        }

        let constructed = camera.constructed_rtsp_url();
        warn!(
            camera_id,
            uri = %constructed,
            "no resolved stream URI, falling back to constructed URI"
        );
        Some(constructed)
    }

    pub async fn set_streaming(&self, camera_id: &str, streaming: bool) {
        let mut statuses = self.statuses.write().await;
        statuses.entry(camera_id.to_string()).or_default().streaming = streaming;
    }

    pub async fn set_recording(&self, camera_id: &str, recording: bool) {
        let mut statuses = self.statuses.write().await;
        statuses.entry(camera_id.to_string()).or_default().recording = recording;
    }

    pub async fn status(&self, camera_id: &str) -> CameraStatus {
        self.statuses
            .read()
            .await
            .get(camera_id)
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(cameras: &str) -> CameraRegistry {
        let settings = SettingsStore::parse_json(&format!(r#"{{ "cameras": {} }}"#, cameras))
            .expect("valid settings json");
        CameraRegistry::from_settings(Arc::new(settings))
    }

    #[tokio::test]
    async fn test_loads_cameras_from_settings() {
        let registry = registry_with(
            r#"[
                { "id": "cam-1", "name": "Front", "ip": "10.0.0.5" },
                { "id": "cam-2", "name": "Back", "ip": "10.0.0.6" }
            ]"#,
        );

        assert_eq!(registry.camera_count().await, 2);
        assert_eq!(registry.get("cam-1").await.unwrap().name, "Front");
        assert!(registry.get("cam-9").await.is_none());
    }

    #[tokio::test]
    async fn test_skips_cameras_without_id() {
        let registry = registry_with(r#"[ { "name": "Broken", "ip": "10.0.0.7" } ]"#);
        assert_eq!(registry.camera_count().await, 0);
    }

    #[tokio::test]
    async fn test_resolution_prefers_deposited_uri() {
        let registry = registry_with(
            r#"[ {
                "id": "cam-1", "name": "Front", "ip": "10.0.0.5",
                "rtsp_url": "rtsp://override.local/main",
                "username": "admin", "password": "pw"
            } ]"#,
        );

        // Explicit override beats the constructed URI
        assert_eq!(
            registry.resolve_stream_uri("cam-1", None).await.unwrap(),
            "rtsp://override.local/main"
        );

        // A deposited ONVIF URI beats both
        registry
            .set_resolved_uri("cam-1", "rtsp://10.0.0.5/onvif-media".to_string())
            .await;
        assert_eq!(
            registry.resolve_stream_uri("cam-1", None).await.unwrap(),
            "rtsp://10.0.0.5/onvif-media"
        );

        // Clearing the deposit falls back again
        registry.clear_resolved_uri("cam-1").await;
        assert_eq!(
            registry.resolve_stream_uri("cam-1", None).await.unwrap(),
            "rtsp://override.local/main"
        );
    }

    #[tokio::test]
    async fn test_resolution_constructs_fallback_uri() {
        let registry = registry_with(
            r#"[ {
                "id": "cam-1", "name": "Front", "ip": "10.0.0.5",
                "username": "admin", "password": "pw"
            } ]"#,
        );

        assert_eq!(
            registry.resolve_stream_uri("cam-1", None).await.unwrap(),
            "rtsp://admin:pw@10.0.0.5:554/stream1"
        );
        assert!(registry.resolve_stream_uri("nope", None).await.is_none());
    }

    #[tokio::test]
    async fn test_add_camera_assigns_uuid_and_rejects_duplicate_ip() {
        let registry = registry_with("[]");

        let config = CameraConfig {
            name: "New".to_string(),
            ip: "10.0.0.8".to_string(),
            ..CameraConfig::default()
        };
        let id = registry.add_camera(config.clone()).await.expect("added");
        assert_eq!(id.len(), 36);
        assert_eq!(registry.camera_count().await, 1);

        // Same IP again is rejected by the settings store
        assert!(registry.add_camera(config).await.is_none());
        assert_eq!(registry.camera_count().await, 1);
    }

    #[tokio::test]
    async fn test_add_camera_rejects_malformed_rtsp_url() {
        let registry = registry_with("[]");

        let config = CameraConfig {
            name: "Bad".to_string(),
            ip: "10.0.0.9".to_string(),
            rtsp_url: Some("http://not-rtsp/stream".to_string()),
            ..CameraConfig::default()
        };
        assert!(registry.add_camera(config).await.is_none());
        assert_eq!(registry.camera_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_camera_clears_derived_state() {
        let registry = registry_with(r#"[ { "id": "cam-1", "name": "F", "ip": "10.0.0.5" } ]"#);

        registry.set_resolved_uri("cam-1", "rtsp://x/y".to_string()).await;
        registry.set_streaming("cam-1", true).await;

        assert!(registry.remove_camera("cam-1").await);
        assert!(!registry.remove_camera("cam-1").await);
        assert_eq!(registry.status("cam-1").await, CameraStatus::default());
        assert!(registry.resolve_stream_uri("cam-1", None).await.is_none());
    }

    #[tokio::test]
    async fn test_status_flags() {
        let registry = registry_with(r#"[ { "id": "cam-1", "name": "F", "ip": "10.0.0.5" } ]"#);

        assert!(!registry.status("cam-1").await.streaming);

        registry.set_streaming("cam-1", true).await;
        registry.set_recording("cam-1", true).await;
        let status = registry.status("cam-1").await;
        assert!(status.streaming);
        assert!(status.recording);

        registry.set_streaming("cam-1", false).await;
        let status = registry.status("cam-1").await;
        assert!(!status.streaming);
        assert!(status.recording);
    }
}
