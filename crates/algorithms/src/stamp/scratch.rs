//! Per-run scratch space for intermediate artifacts
//!
//! Every run gets its own uniquely named directory under a scratch root.
//! The directory and everything in it are removed when the guard drops,
//! whether the run succeeded, failed or unwound.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use terrastamp_core::Result;
use tracing::{debug, info};

/// Ring buffer artifact (tagged rings)
pub const BUFFER_ARTIFACT: &str = "stamp_buffer.geojson";
/// Stamp raster artifact
pub const RASTER_ARTIFACT: &str = "stamp_raster.tif";

/// Scope guard owning a run's scratch directory
#[derive(Debug)]
pub struct ScratchSpace {
    dir: Option<TempDir>,
    path: PathBuf,
    keep: bool,
}

impl ScratchSpace {
    /// Create a fresh directory under `root`, creating `root` if needed.
    ///
    /// With `keep` set the directory survives the guard for inspection.
    pub fn new(root: impl AsRef<Path>, keep: bool) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;

        let dir = tempfile::Builder::new()
            .prefix("terrastamp-")
            .keep(keep)
            .tempdir_in(root)?;
        let path = dir.path().to_path_buf();
        debug!("scratch space at {}", path.display());

        Ok(Self {
            dir: Some(dir),
            path,
            keep,
        })
    }

    /// Scratch space under the system temporary directory
    pub fn in_temp_dir() -> Result<Self> {
        Self::new(std::env::temp_dir(), false)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a named artifact inside the scratch directory
    pub fn artifact(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    pub fn buffer_path(&self) -> PathBuf {
        self.artifact(BUFFER_ARTIFACT)
    }

    pub fn raster_path(&self) -> PathBuf {
        self.artifact(RASTER_ARTIFACT)
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        if self.keep {
            info!("keeping intermediate artifacts in {}", self.path.display());
            drop(dir);
            return;
        }
        match dir.close() {
            Ok(()) => debug!("removed scratch space {}", self.path.display()),
            // Never mask the run's own outcome
            Err(e) => debug!("could not remove scratch space {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(root: &Path) -> usize {
        std::fs::read_dir(root).unwrap().count()
    }

    #[test]
    fn test_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let scratch = ScratchSpace::new(root.path(), false).unwrap();
            std::fs::write(scratch.buffer_path(), "{}").unwrap();
            std::fs::write(scratch.raster_path(), [0u8; 4]).unwrap();
            assert_eq!(entries(scratch.path()), 2);
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(entries(root.path()), 0);
    }

    #[test]
    fn test_runs_do_not_share_a_namespace() {
        let root = tempfile::tempdir().unwrap();
        let a = ScratchSpace::new(root.path(), false).unwrap();
        let b = ScratchSpace::new(root.path(), false).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(root.path()));
    }

    #[test]
    fn test_removed_on_unwind() {
        let root = tempfile::tempdir().unwrap();
        let root_path = root.path().to_path_buf();
        let result = std::panic::catch_unwind(move || {
            let scratch = ScratchSpace::new(&root_path, false).unwrap();
            std::fs::write(scratch.buffer_path(), "{}").unwrap();
            panic!("stage failed");
        });
        assert!(result.is_err());
        assert_eq!(entries(root.path()), 0);
    }

    #[test]
    fn test_keep_intermediates() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let scratch = ScratchSpace::new(root.path(), true).unwrap();
            std::fs::write(scratch.raster_path(), [0u8; 4]).unwrap();
            scratch.path().to_path_buf()
        };
        assert!(path.join(RASTER_ARTIFACT).exists());
    }
}
