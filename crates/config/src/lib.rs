//! Configuration module for the camera pipeline daemon
//!
//! Provides the JSON settings store, camera configuration types, the storage
//! directory layout, and pipeline timing knobs.

pub mod camera;
pub mod layout;
pub mod settings;
pub mod tuning;

pub use camera::{CameraConfig, MotionSettings};
pub use layout::StorageLayout;
pub use settings::{SettingsError, SettingsStore};
pub use tuning::PipelineTuning;
