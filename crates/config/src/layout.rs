//! Storage directory layout.
//!
//! All media written by the pipeline lives under one root: per-camera
//! segmented streams, flat snapshot/clip directories, thumbnails, and logs.

use std::io;
use std::path::{Path, PathBuf};

/// Derives the media directory tree from a single storage root.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Base directory for segmented streams; each camera gets a
    /// subdirectory.
    pub fn streams_dir(&self) -> PathBuf {
        self.root.join("streams")
    }

    /// Segmented-stream output directory for one camera.
    pub fn camera_stream_dir(&self, camera_id: &str) -> PathBuf {
        self.streams_dir().join(camera_id)
    }

    /// Flat directory of timestamped single-frame snapshots.
    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    /// Flat directory of timestamped recording segments.
    pub fn clips_dir(&self) -> PathBuf {
        self.root.join("clips")
    }

    /// Thumbnail directory, refreshed by the (out-of-scope) web layer.
    pub fn thumbnails_dir(&self) -> PathBuf {
        self.root.join("thumbnails")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// The directories swept by retention cleanup.
    pub fn retention_dirs(&self) -> [PathBuf; 3] {
        [
            self.snapshots_dir(),
            self.clips_dir(),
            self.thumbnails_dir(),
        ]
    }

    /// Create every managed directory. Failure here is fatal at startup;
    /// nothing else in the pipeline can run without its output tree.
    pub fn ensure(&self) -> io::Result<()> {
        for dir in [
            self.streams_dir(),
            self.snapshots_dir(),
            self.clips_dir(),
            self.thumbnails_dir(),
            self.logs_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths_derive_from_root() {
        let layout = StorageLayout::new("/srv/cameras");

        assert_eq!(layout.streams_dir(), PathBuf::from("/srv/cameras/streams"));
        assert_eq!(
            layout.camera_stream_dir("cam-1"),
            PathBuf::from("/srv/cameras/streams/cam-1")
        );
        assert_eq!(layout.clips_dir(), PathBuf::from("/srv/cameras/clips"));
        assert_eq!(
            layout.snapshots_dir(),
            PathBuf::from("/srv/cameras/snapshots")
        );
        assert_eq!(
            layout.thumbnails_dir(),
            PathBuf::from("/srv/cameras/thumbnails")
        );
    }

    #[test]
    fn test_ensure_creates_tree() {
        let dir = TempDir::new().unwrap();
        let layout = StorageLayout::new(dir.path().join("storage"));

        layout.ensure().unwrap();

        assert!(layout.streams_dir().is_dir());
        assert!(layout.snapshots_dir().is_dir());
        assert!(layout.clips_dir().is_dir());
        assert!(layout.thumbnails_dir().is_dir());
        assert!(layout.logs_dir().is_dir());
    }

    #[test]
    fn test_retention_dirs_cover_media_dirs() {
        let layout = StorageLayout::new("/srv/cameras");
        let dirs = layout.retention_dirs();

        assert!(dirs.contains(&layout.snapshots_dir()));
        assert!(dirs.contains(&layout.clips_dir()));
        assert!(dirs.contains(&layout.thumbnails_dir()));
        // Streams are rolling windows managed by the transcoder, never swept
        assert!(!dirs.contains(&layout.streams_dir()));
    }
}
