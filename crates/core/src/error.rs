//! Error types for TerraStamp

use std::fmt;
use thiserror::Error;

/// Pipeline stage that an [`Error::Operation`] failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading the source features
    ReadFeatures,
    /// Reading the surface raster
    ReadSurface,
    /// Creating the per-run scratch namespace
    Scratch,
    /// Multi-ring buffer generation
    Buffer,
    /// Attaching elevations to rings
    Tag,
    /// Polygon-to-raster conversion
    Rasterize,
    /// Combining the stamp with the surface
    Combine,
    /// Writing the output surface
    WriteOutput,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ReadFeatures => "read features",
            Stage::ReadSurface => "read surface",
            Stage::Scratch => "scratch",
            Stage::Buffer => "buffer",
            Stage::Tag => "tag rings",
            Stage::Rasterize => "rasterize",
            Stage::Combine => "combine",
            Stage::WriteOutput => "write output",
        };
        f.write_str(name)
    }
}

/// Main error type for TerraStamp operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("GDAL error: {0}")]
    #[cfg(feature = "gdal")]
    Gdal(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("Invalid height expression{}: {reason}", ring_context(.ring, .distance))]
    InvalidExpression {
        ring: Option<usize>,
        distance: Option<f64>,
        reason: String,
    },

    #[error("Invalid distance list: {0}")]
    InvalidDistances(String),

    #[error("Ring at distance {distance} has no resolved elevation")]
    MissingElevation { distance: f64 },

    #[error("Numeric fault at ({row}, {col}): {reason}")]
    NumericFault {
        row: usize,
        col: usize,
        reason: String,
    },

    #[error("Stamp is not aligned with the surface: {0}")]
    Misaligned(String),

    #[error("{stage} stage failed: {message}")]
    Operation { stage: Stage, message: String },

    #[error("Invalid GeoJSON: {0}")]
    GeoJson(String),

    #[error("{0}")]
    Other(String),
}

fn ring_context(ring: &Option<usize>, distance: &Option<f64>) -> String {
    match (*ring, *distance) {
        (Some(i), Some(d)) => format!(" (ring {} at distance {})", i, d),
        (Some(i), None) => format!(" (ring {})", i),
        (None, Some(d)) => format!(" (distance {})", d),
        (None, None) => String::new(),
    }
}

impl Error {
    /// Build an expression error that is not tied to a particular ring.
    pub fn expression(reason: impl Into<String>) -> Self {
        Error::InvalidExpression {
            ring: None,
            distance: None,
            reason: reason.into(),
        }
    }

    /// Whether this error describes bad input or arithmetic rather than a
    /// failing backing operation.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Error::InvalidPolicy(_)
                | Error::InvalidExpression { .. }
                | Error::InvalidDistances(_)
                | Error::MissingElevation { .. }
                | Error::NumericFault { .. }
                | Error::Misaligned(_)
                | Error::InvalidParameter { .. }
                | Error::Operation { .. }
        )
    }
}

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for Error {
    fn from(e: gdal::errors::GdalError) -> Self {
        Error::Gdal(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::GeoJson(e.to_string())
    }
}

/// Result type alias for TerraStamp operations
pub type Result<T> = std::result::Result<T, Error>;

/// Attribute a failed backing operation to a pipeline stage.
///
/// Domain errors pass through unchanged; everything else becomes
/// [`Error::Operation`] carrying the stage.
pub trait StageContext<T> {
    fn at_stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageContext<T> for Result<T> {
    fn at_stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| {
            if e.is_domain() {
                e
            } else {
                Error::Operation {
                    stage,
                    message: e.to_string(),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_error_names_ring() {
        let err = Error::InvalidExpression {
            ring: Some(2),
            distance: Some(30.0),
            reason: "division by zero".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ring 2"), "{msg}");
        assert!(msg.contains("distance 30"), "{msg}");
    }

    #[test]
    fn test_stage_wraps_io_errors() {
        let res: Result<()> = Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "gone",
        )));
        match res.at_stage(Stage::Rasterize) {
            Err(Error::Operation { stage, .. }) => assert_eq!(stage, Stage::Rasterize),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_stage_keeps_domain_errors() {
        let res: Result<()> = Err(Error::NumericFault {
            row: 1,
            col: 2,
            reason: "x".into(),
        });
        assert!(matches!(
            res.at_stage(Stage::Combine),
            Err(Error::NumericFault { row: 1, col: 2, .. })
        ));
    }
}
