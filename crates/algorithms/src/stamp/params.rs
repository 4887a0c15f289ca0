//! Stamp configuration
//!
//! `StampParams` is the full set of knobs for one stamp run. It can be built
//! in code, or loaded from a JSON job file where every field is optional:
//!
//! ```json
//! {
//!   "operation": "ADD",
//!   "distances": [10, 20, 30],
//!   "height_function": "d * d",
//!   "stair_policy": "MID",
//!   "dissolve": "ALL"
//! }
//! ```

use crate::conversion::{CellAssignment, RasterizeParams};
use crate::profile::StairPolicy;
use crate::stamp::combine::{StampOp, ZeroDivision};
use crate::vector::{BufferUnit, Dissolve, MultiRingParams, Z_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use terrastamp_core::{Error, Result};

/// Parameters for a raster stamp run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StampParams {
    /// Applied as `surface op stamp`
    pub operation: StampOp,
    /// Ring outer distances, in `buffer_unit`
    pub distances: Vec<f64>,
    /// Height function of the sample distance `d`
    pub height_function: String,
    pub stair_policy: StairPolicy,
    pub buffer_unit: BufferUnit,
    /// Unit of the feature and surface coordinates
    pub map_unit: BufferUnit,
    pub dissolve: Dissolve,
    pub outside_polygons_only: bool,
    pub cell_assignment: CellAssignment,
    pub zero_division: ZeroDivision,
    /// Segments per full circle when buffering
    pub arc_segments: usize,
    /// Sub-cell samples per axis for the area based cell assignments
    pub subcell_samples: usize,
    /// Keep the scratch artifacts after the run
    pub keep_intermediates: bool,
}

impl Default for StampParams {
    fn default() -> Self {
        Self {
            operation: StampOp::Add,
            distances: Vec::new(),
            height_function: "d".to_string(),
            stair_policy: StairPolicy::Mid,
            buffer_unit: BufferUnit::Default,
            map_unit: BufferUnit::Meters,
            dissolve: Dissolve::All,
            outside_polygons_only: false,
            cell_assignment: CellAssignment::CellCenter,
            zero_division: ZeroDivision::Fail,
            arc_segments: 32,
            subcell_samples: 8,
            keep_intermediates: false,
        }
    }
}

impl StampParams {
    /// Parse a JSON job description.
    ///
    /// Keyword fields are case-insensitive and accept the same spellings as
    /// their `FromStr` impls. An unknown keyword fails with `InvalidPolicy`;
    /// any other malformed job fails with `Other`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let job: Value = serde_json::from_str(json).map_err(invalid_job)?;
        if let Some(fields) = job.as_object() {
            for (field, value) in fields {
                if let Some(keyword) = value.as_str() {
                    check_keyword(field, keyword)?;
                }
            }
        }
        serde_json::from_value(job).map_err(invalid_job)
    }

    /// Load a JSON job file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn ring_params(&self) -> MultiRingParams {
        MultiRingParams {
            distances: self.distances.clone(),
            unit: self.buffer_unit,
            map_unit: self.map_unit,
            dissolve: self.dissolve,
            outside_polygons_only: self.outside_polygons_only,
            segments: self.arc_segments,
        }
    }

    pub fn rasterize_params(&self) -> RasterizeParams {
        RasterizeParams {
            value_field: Z_FIELD.to_string(),
            cell_assignment: self.cell_assignment,
            subcell_samples: self.subcell_samples,
        }
    }
}

fn invalid_job(e: serde_json::Error) -> Error {
    Error::Other(format!("invalid stamp job: {}", e))
}

fn check_keyword(field: &str, keyword: &str) -> Result<()> {
    match field {
        "operation" => keyword.parse::<StampOp>().map(drop),
        "stair_policy" => keyword.parse::<StairPolicy>().map(drop),
        "buffer_unit" | "map_unit" => keyword.parse::<BufferUnit>().map(drop),
        "dissolve" => keyword.parse::<Dissolve>().map(drop),
        "cell_assignment" => keyword.parse::<CellAssignment>().map(drop),
        "zero_division" => keyword.parse::<ZeroDivision>().map(drop),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_file_fills_defaults() {
        let p = StampParams::from_json_str(
            r#"{
                "operation": "DIVIDE",
                "distances": [30, 10, 20],
                "height_function": "math.sqrt(d)",
                "stair_policy": "OUTSIDE",
                "buffer_unit": "FEET",
                "cell_assignment": "MAXIMUM_AREA"
            }"#,
        )
        .unwrap();

        assert_eq!(p.operation, StampOp::Divide);
        assert_eq!(p.distances, vec![30.0, 10.0, 20.0]);
        assert_eq!(p.stair_policy, StairPolicy::Outer);
        assert_eq!(p.buffer_unit, BufferUnit::Feet);
        assert_eq!(p.cell_assignment, CellAssignment::MaximumArea);
        assert_eq!(p.dissolve, Dissolve::All);
        assert_eq!(p.arc_segments, 32);
        assert!(!p.keep_intermediates);

        let rings = p.ring_params();
        assert_eq!(rings.unit, BufferUnit::Feet);
        assert_eq!(p.rasterize_params().value_field, Z_FIELD);
    }

    #[test]
    fn test_unknown_keyword_is_invalid_policy() {
        for job in [
            r#"{ "stair_policy": "DIAGONAL" }"#,
            r#"{ "operation": "MODULO" }"#,
            r#"{ "buffer_unit": "FURLONGS" }"#,
            r#"{ "map_unit": "CUBITS" }"#,
            r#"{ "dissolve": "SOME" }"#,
            r#"{ "cell_assignment": "MINIMUM_AREA" }"#,
            r#"{ "zero_division": "IGNORE" }"#,
        ] {
            let res = StampParams::from_json_str(job);
            assert!(matches!(res, Err(Error::InvalidPolicy(_))), "{}: {:?}", job, res);
        }
    }

    #[test]
    fn test_malformed_job_is_rejected() {
        assert!(matches!(
            StampParams::from_json_str(r#"{ "distance": [1] }"#),
            Err(Error::Other(_))
        ));
        assert!(matches!(
            StampParams::from_json_str(r#"{ "stair_policy": 3 }"#),
            Err(Error::Other(_))
        ));
        assert!(matches!(StampParams::from_json_str("[1, 2"), Err(Error::Other(_))));
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let p = StampParams::from_json_str(
            r#"{
                "operation": "subtract",
                "stair_policy": "inner",
                "buffer_unit": "nautical-miles",
                "dissolve": "none",
                "cell_assignment": "maximum_combined_area",
                "zero_division": "nodata"
            }"#,
        )
        .unwrap();

        assert_eq!(p.operation, StampOp::Subtract);
        assert_eq!(p.stair_policy, StairPolicy::Inner);
        assert_eq!(p.buffer_unit, BufferUnit::NauticalMiles);
        assert_eq!(p.dissolve, Dissolve::None);
        assert_eq!(p.cell_assignment, CellAssignment::MaximumCombinedArea);
        assert_eq!(p.zero_division, ZeroDivision::NoData);
    }

    #[test]
    fn test_roundtrip_through_json() {
        let p = StampParams {
            distances: vec![5.0],
            keep_intermediates: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(StampParams::from_json_str(&json).unwrap(), p);
    }
}
