//! Settings store backed by a JSON document.
//!
//! Holds the persistent configuration (general options, storage policy,
//! pipeline tuning, camera list) and supports dot-separated key lookup so
//! callers can read nested values without knowing the document shape.

use serde_json::{json, Map, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};

use crate::camera::CameraConfig;

/// Error type for settings operations
#[derive(Debug)]
pub enum SettingsError {
    /// IO error reading or writing the settings file
    Io(std::io::Error),
    /// JSON parsing error
    Parse(serde_json::Error),
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "Failed to read settings file: {}", e),
            SettingsError::Parse(e) => write!(f, "Failed to parse settings: {}", e),
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<std::io::Error> for SettingsError {
    fn from(e: std::io::Error) -> Self {
        SettingsError::Io(e)
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(e: serde_json::Error) -> Self {
        SettingsError::Parse(e)
    }
}

/// The default document used when no settings file exists yet.
fn default_document() -> Value {
    json!({
        "general": {},
        "storage": {},
        "pipeline": {},
        "cameras": []
    })
}

/// Thread-safe settings store.
///
/// All reads go through dotted-key lookup against the in-memory document;
/// mutations deep-merge into the document and persist it back to disk when a
/// backing path is configured.
pub struct SettingsStore {
    path: Option<PathBuf>,
    doc: RwLock<Value>,
}

impl SettingsStore {
    /// Create an in-memory store with the default empty document.
    pub fn empty() -> Self {
        Self {
            path: None,
            doc: RwLock::new(default_document()),
        }
    }

    /// Load the settings document from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path.as_ref())?;
        let doc: Value = serde_json::from_str(&content)?;
        Ok(Self {
            path: Some(path.as_ref().to_path_buf()),
            doc: RwLock::new(doc),
        })
    }

    /// Load settings, falling back to the default document when the file is
    /// missing or unreadable.
    ///
    /// The fallback still remembers the path, so later mutations create the
    /// file.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(store) => {
                info!(path = %path.as_ref().display(), "loaded settings");
                store
            }
            Err(e) => {
                warn!(
                    path = %path.as_ref().display(),
                    error = %e,
                    "settings file unavailable, starting from defaults"
                );
                Self {
                    path: Some(path.as_ref().to_path_buf()),
                    doc: RwLock::new(default_document()),
                }
            }
        }
    }

    /// Parse a settings document from a JSON string (no backing file).
    pub fn parse_json(content: &str) -> Result<Self, SettingsError> {
        let doc: Value = serde_json::from_str(content)?;
        Ok(Self {
            path: None,
            doc: RwLock::new(doc),
        })
    }

    /// Look up a nested value using a dot-separated key path.
    ///
    /// `get("storage.retention_period_hours")` walks the document one object
    /// level per path segment. Returns `None` when any segment is missing or
    /// a non-object is traversed.
    pub fn get(&self, key_path: &str) -> Option<Value> {
        let doc = self.doc.read().unwrap_or_else(|e| e.into_inner());
        let mut current = &*doc;
        for key in key_path.split('.') {
            current = current.as_object()?.get(key)?;
        }
        Some(current.clone())
    }

    /// Boolean lookup with a default for missing or mistyped values.
    pub fn get_bool(&self, key_path: &str, default: bool) -> bool {
        self.get(key_path)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    /// Unsigned integer lookup with a default.
    pub fn get_u64(&self, key_path: &str, default: u64) -> u64 {
        self.get(key_path)
            .and_then(|v| v.as_u64())
            .unwrap_or(default)
    }

    /// Float lookup with a default.
    pub fn get_f64(&self, key_path: &str, default: f64) -> f64 {
        self.get(key_path)
            .and_then(|v| v.as_f64())
            .unwrap_or(default)
    }

    /// String lookup with a default.
    pub fn get_str(&self, key_path: &str, default: &str) -> String {
        self.get(key_path)
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| default.to_string())
    }

    /// Deep-merge new values into the document and persist.
    ///
    /// Object values merge one level at a time; everything else replaces the
    /// existing value, matching the original deep-merge update rules.
    pub fn update(&self, new_values: Value) {
        {
            let mut doc = self.doc.write().unwrap_or_else(|e| e.into_inner());
            merge_values(&mut doc, new_values);
        }
        self.save();
    }

    /// Set a single nested value by dotted key path and persist.
    ///
    /// Intermediate objects are created as needed.
    pub fn set(&self, key_path: &str, value: Value) {
        {
            let mut doc = self.doc.write().unwrap_or_else(|e| e.into_inner());
            let mut current = &mut *doc;
            let segments: Vec<&str> = key_path.split('.').collect();
            for key in &segments[..segments.len() - 1] {
                if !current.is_object() {
                    *current = Value::Object(Map::new());
                }
                current = current
                    .as_object_mut()
                    .expect("object ensured above")
                    .entry(key.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
            }
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            current
                .as_object_mut()
                .expect("object ensured above")
                .insert(segments[segments.len() - 1].to_string(), value);
        }
        self.save();
    }

    /// Returns the configured camera list.
    ///
    /// Entries that fail to deserialize are skipped with a warning rather
    /// than poisoning the whole list.
    pub fn camera_configs(&self) -> Vec<CameraConfig> {
        let doc = self.doc.read().unwrap_or_else(|e| e.into_inner());
        let Some(cameras) = doc.get("cameras").and_then(|v| v.as_array()) else {
            return Vec::new();
        };
        cameras
            .iter()
            .filter_map(|entry| match serde_json::from_value(entry.clone()) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!(error = %e, "skipping malformed camera entry in settings");
                    None
                }
            })
            .collect()
    }

    /// Add a camera configuration and persist.
    ///
    /// Rejects a camera whose IP is already registered, returning false.
    pub fn add_camera_config(&self, config: &CameraConfig) -> bool {
        {
            let mut doc = self.doc.write().unwrap_or_else(|e| e.into_inner());
            let cameras = doc
                .as_object_mut()
                .map(|o| o.entry("cameras").or_insert_with(|| json!([])));
            let Some(Value::Array(cameras)) = cameras else {
                return false;
            };
            let duplicate = cameras
                .iter()
                .any(|c| c.get("ip").and_then(|v| v.as_str()) == Some(config.ip.as_str()));
            if duplicate {
                warn!(ip = %config.ip, "camera with this IP already exists");
                return false;
            }
            match serde_json::to_value(config) {
                Ok(value) => cameras.push(value),
                Err(_) => return false,
            }
        }
        self.save();
        true
    }

    /// Remove a camera configuration by id and persist. Returns whether an
    /// entry was actually removed.
    pub fn remove_camera_config(&self, camera_id: &str) -> bool {
        let removed = {
            let mut doc = self.doc.write().unwrap_or_else(|e| e.into_inner());
            let Some(Value::Array(cameras)) = doc.get_mut("cameras") else {
                return false;
            };
            let before = cameras.len();
            cameras.retain(|c| c.get("id").and_then(|v| v.as_str()) != Some(camera_id));
            cameras.len() < before
        };
        if removed {
            self.save();
            info!(camera_id, "removed camera from settings");
        }
        removed
    }

    /// Merge new values into an existing camera entry and persist.
    pub fn update_camera_config(&self, camera_id: &str, new_values: Value) -> bool {
        let found = {
            let mut doc = self.doc.write().unwrap_or_else(|e| e.into_inner());
            let Some(Value::Array(cameras)) = doc.get_mut("cameras") else {
                return false;
            };
            match cameras
                .iter_mut()
                .find(|c| c.get("id").and_then(|v| v.as_str()) == Some(camera_id))
            {
                Some(entry) => {
                    merge_values(entry, new_values);
                    true
                }
                None => false,
            }
        };
        if found {
            self.save();
        } else {
            warn!(camera_id, "no camera with this id to update");
        }
        found
    }

    /// Apply environment variable overrides to the document.
    ///
    /// Overrides the following values if environment variables are set:
    /// - CAMERA_PIPELINE_USE_NVENC -> general.use_nvenc
    /// - CAMERA_PIPELINE_RETENTION_HOURS -> storage.retention_period_hours
    /// - CAMERA_PIPELINE_STATUS_PORT -> pipeline.status_port
    pub fn apply_env_overrides(&self) {
        if let Ok(val) = env::var("CAMERA_PIPELINE_USE_NVENC") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.set("general.use_nvenc", json!(true)),
                "false" | "0" | "no" => self.set("general.use_nvenc", json!(false)),
                _ => {}
            }
        }

        if let Ok(val) = env::var("CAMERA_PIPELINE_RETENTION_HOURS") {
            if let Ok(hours) = val.parse::<u64>() {
                self.set("storage.retention_period_hours", json!(hours));
            }
        }

        if let Ok(val) = env::var("CAMERA_PIPELINE_STATUS_PORT") {
            if let Ok(port) = val.parse::<u16>() {
                self.set("pipeline.status_port", json!(port));
            }
        }
    }

    /// Persist the document to the backing file, if any. Write failures are
    /// logged and do not disturb the in-memory state.
    fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let doc = self.doc.read().unwrap_or_else(|e| e.into_inner());
        let serialized = match serde_json::to_string_pretty(&*doc) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to serialize settings");
                return;
            }
        };
        if let Err(e) = fs::write(path, serialized) {
            warn!(path = %path.display(), error = %e, "failed to save settings");
        }
    }
}

/// Deep merge: objects merge key by key, anything else replaces.
fn merge_values(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(target_map), Value::Object(incoming_map)) => {
            for (key, value) in incoming_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target_slot, incoming) => *target_slot = incoming,
    }
}
