//! Input dataset resolution
//!
//! Inputs are resolved to existing files once, at the boundary, so the
//! pipeline only ever sees concrete paths of a known kind.

use std::fmt;
use std::path::{Path, PathBuf};
use terrastamp_core::{Error, Result, Stage};

/// Kind of dataset a path holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    /// GeoJSON features
    Features,
    /// GeoTIFF raster
    Raster,
}

impl DatasetKind {
    fn extensions(self) -> &'static [&'static str] {
        match self {
            DatasetKind::Features => &["geojson", "json"],
            DatasetKind::Raster => &["tif", "tiff", "gtiff"],
        }
    }

    fn stage(self) -> Stage {
        match self {
            DatasetKind::Features => Stage::ReadFeatures,
            DatasetKind::Raster => Stage::ReadSurface,
        }
    }
}

/// A path checked to exist and to look like a dataset of the given kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPath {
    path: PathBuf,
    kind: DatasetKind,
}

impl DatasetPath {
    /// Resolve `path` as a dataset of `kind`.
    ///
    /// Fails with `Operation` attributed to the matching read stage when the
    /// file does not exist or has an unexpected extension.
    pub fn resolve(path: impl AsRef<Path>, kind: DatasetKind) -> Result<Self> {
        let path = path.as_ref();
        let fail = |message: String| Error::Operation {
            stage: kind.stage(),
            message,
        };

        if !path.is_file() {
            return Err(fail(format!("{} does not exist or is not a file", path.display())));
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !kind.extensions().contains(&ext.as_str()) {
            return Err(fail(format!(
                "{} is not a {:?} dataset (expected one of: {})",
                path.display(),
                kind,
                kind.extensions().join(", ")
            )));
        }

        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Ok(Self { path, kind })
    }

    /// Resolve a GeoJSON feature file
    pub fn features(path: impl AsRef<Path>) -> Result<Self> {
        Self::resolve(path, DatasetKind::Features)
    }

    /// Resolve a GeoTIFF raster file
    pub fn raster(path: impl AsRef<Path>) -> Result<Self> {
        Self::resolve(path, DatasetKind::Raster)
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }
}

impl AsRef<Path> for DatasetPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for DatasetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
