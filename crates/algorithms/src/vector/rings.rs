//! Multi-ring buffers
//!
//! Builds concentric, non-overlapping distance bands around features and
//! tags each band with its resolved elevation.

use super::buffer::{buffer_geometry, polygonal_part, union_all, BufferParams};
use crate::profile::{sorted_distances, ElevationProfile};
use geo::{Area, BooleanOps, Geometry, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use terrastamp_core::vector::{AttributeValue, Feature, FeatureCollection};
use terrastamp_core::{Error, Result};
use tracing::debug;

/// Attribute holding a ring's outer distance, in the buffer unit
pub const DISTANCE_FIELD: &str = "distance";
/// Attribute holding a ring's elevation
pub const Z_FIELD: &str = "z_value";

// Rings smaller than this (in squared map units) are treated as empty
const MIN_RING_AREA: f64 = 1e-12;

/// Linear unit of the ring distances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum BufferUnit {
    /// The map units of the input features
    #[default]
    Default,
    Meters,
    Kilometers,
    Feet,
    Yards,
    Miles,
    NauticalMiles,
    Decimeters,
    Centimeters,
    Millimeters,
    Inches,
}

impl BufferUnit {
    /// Length of one unit in meters. `Default` counts as meters.
    pub fn meters(self) -> f64 {
        match self {
            BufferUnit::Default | BufferUnit::Meters => 1.0,
            BufferUnit::Kilometers => 1000.0,
            BufferUnit::Feet => 0.3048,
            BufferUnit::Yards => 0.9144,
            BufferUnit::Miles => 1609.344,
            BufferUnit::NauticalMiles => 1852.0,
            BufferUnit::Decimeters => 0.1,
            BufferUnit::Centimeters => 0.01,
            BufferUnit::Millimeters => 0.001,
            BufferUnit::Inches => 0.0254,
        }
    }

    /// Convert a distance in this unit to map units.
    pub fn to_map_units(self, distance: f64, map_unit: BufferUnit) -> f64 {
        match self {
            BufferUnit::Default => distance,
            unit => distance * unit.meters() / map_unit.meters(),
        }
    }
}

impl FromStr for BufferUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let unit = match s.trim().to_ascii_uppercase().replace([' ', '-'], "_").as_str() {
            "DEFAULT" | "" => BufferUnit::Default,
            "METERS" | "METRES" | "M" => BufferUnit::Meters,
            "KILOMETERS" | "KILOMETRES" | "KM" => BufferUnit::Kilometers,
            "FEET" | "FT" => BufferUnit::Feet,
            "YARDS" | "YD" => BufferUnit::Yards,
            "MILES" | "MI" => BufferUnit::Miles,
            "NAUTICAL_MILES" | "NMI" => BufferUnit::NauticalMiles,
            "DECIMETERS" | "DM" => BufferUnit::Decimeters,
            "CENTIMETERS" | "CM" => BufferUnit::Centimeters,
            "MILLIMETERS" | "MM" => BufferUnit::Millimeters,
            "INCHES" | "IN" => BufferUnit::Inches,
            _ => return Err(Error::InvalidPolicy(format!("unknown distance unit '{}'", s))),
        };
        Ok(unit)
    }
}

impl TryFrom<String> for BufferUnit {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// How rings of different features are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Dissolve {
    /// Separate rings per input feature; rings of nearby features may overlap
    None,
    /// One ring per distance covering all features
    #[default]
    All,
}

impl FromStr for Dissolve {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(Dissolve::None),
            "ALL" => Ok(Dissolve::All),
            _ => Err(Error::InvalidPolicy(format!(
                "unknown dissolve option '{}' (expected NONE or ALL)",
                s
            ))),
        }
    }
}

impl TryFrom<String> for Dissolve {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Parameters for [`multi_ring_buffer`]
#[derive(Debug, Clone)]
pub struct MultiRingParams {
    /// Ring outer distances in `unit`; sorted and validated before use
    pub distances: Vec<f64>,
    pub unit: BufferUnit,
    /// Unit of the feature coordinates
    pub map_unit: BufferUnit,
    pub dissolve: Dissolve,
    /// Remove polygon interiors from the first ring
    pub outside_polygons_only: bool,
    /// Segments per full circle
    pub segments: usize,
}

impl Default for MultiRingParams {
    fn default() -> Self {
        Self {
            distances: Vec::new(),
            unit: BufferUnit::Default,
            map_unit: BufferUnit::Meters,
            dissolve: Dissolve::All,
            outside_polygons_only: false,
            segments: 32,
        }
    }
}

fn ring_feature(geometry: MultiPolygon<f64>, distance: f64, id: Option<String>) -> Feature {
    let mut f = Feature::new(Geometry::MultiPolygon(geometry));
    f.id = id;
    f.set_property(DISTANCE_FIELD, AttributeValue::Float(distance));
    f
}

/// Rings for one group of geometries, one per distance. Empty rings are
/// skipped.
fn rings_for(
    geoms: &[&Geometry<f64>],
    distances: &[f64],
    params: &MultiRingParams,
) -> Vec<(f64, MultiPolygon<f64>)> {
    let source = if params.outside_polygons_only {
        Some(union_all(geoms.iter().map(|g| polygonal_part(g)).collect()))
    } else {
        None
    };

    let mut rings = Vec::with_capacity(distances.len());
    let mut inner: Option<MultiPolygon<f64>> = source.filter(|s| !s.0.is_empty());

    for &d in distances {
        let buffer_params = BufferParams {
            distance: params.unit.to_map_units(d, params.map_unit),
            segments: params.segments,
        };
        let outer = union_all(geoms.iter().map(|g| buffer_geometry(g, &buffer_params)).collect());

        let ring = match &inner {
            Some(hole) => outer.difference(hole),
            None => outer.clone(),
        };

        if ring.unsigned_area() > MIN_RING_AREA {
            rings.push((d, ring));
        } else {
            debug!("dropping empty ring at distance {}", d);
        }
        inner = Some(outer);
    }

    rings
}

/// Build concentric rings around every feature.
///
/// Ring `i` covers `buffer(d_i) - buffer(d_{i-1})`; the first ring covers
/// the source geometry too unless `outside_polygons_only` is set. Each
/// ring carries a [`DISTANCE_FIELD`] attribute in the caller's unit.
///
/// With [`Dissolve::All`] there is at most one ring per distance, ordered
/// by distance. With [`Dissolve::None`] the rings of each feature follow the
/// feature's input order.
pub fn multi_ring_buffer(features: &FeatureCollection, params: &MultiRingParams) -> Result<FeatureCollection> {
    let distances = sorted_distances(&params.distances)?;
    if params.segments < 4 {
        return Err(Error::InvalidParameter {
            name: "segments",
            value: params.segments.to_string(),
            reason: "at least 4 segments are needed to approximate a circle".into(),
        });
    }

    let mut out = FeatureCollection::new();
    out.crs = features.crs.clone();

    match params.dissolve {
        Dissolve::All => {
            let geoms: Vec<&Geometry<f64>> = features.geometries().collect();
            for (d, ring) in rings_for(&geoms, &distances, params) {
                out.push(ring_feature(ring, d, None));
            }
        }
        Dissolve::None => {
            for feature in features.iter() {
                let Some(geom) = feature.geometry.as_ref() else {
                    continue;
                };
                for (d, ring) in rings_for(&[geom], &distances, params) {
                    out.push(ring_feature(ring, d, feature.id.clone()));
                }
            }
        }
    }

    debug!(
        "built {} rings from {} features ({:?} dissolve)",
        out.len(),
        features.len(),
        params.dissolve
    );
    Ok(out)
}

/// Attach the profile elevation to every ring as [`Z_FIELD`].
///
/// Fails with `MissingElevation` for a ring whose distance is not in the
/// profile.
pub fn tag_rings(rings: &mut FeatureCollection, profile: &ElevationProfile) -> Result<()> {
    for ring in rings.features.iter_mut() {
        let distance = ring.get_f64(DISTANCE_FIELD).ok_or_else(|| Error::InvalidParameter {
            name: "distance",
            value: "<missing>".into(),
            reason: "ring feature has no distance attribute".into(),
        })?;
        let z = profile
            .get(distance)
            .ok_or(Error::MissingElevation { distance })?;
        ring.set_property(Z_FIELD, AttributeValue::Float(z));
    }
    Ok(())
}
