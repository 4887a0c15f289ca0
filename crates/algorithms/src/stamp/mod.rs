//! Raster stamping
//!
//! Builds distance rings around vector features, gives each ring an
//! elevation from a height function, rasterizes the rings onto the surface
//! grid and combines the result with the surface:
//!
//! ```text
//! distances ──> resolve_profile ─┐
//! features ──> multi_ring_buffer ┴─> tag_rings ─> polygons_to_raster ─> combine
//! ```
//!
//! Intermediate artifacts go to a per-run [`ScratchSpace`] that is removed
//! however the run ends.

mod combine;
mod dataset;
mod params;
mod scratch;

pub use combine::{combine, combine_with, StampOp, ZeroDivision};
pub use dataset::{DatasetKind, DatasetPath};
pub use params::StampParams;
pub use scratch::{ScratchSpace, BUFFER_ARTIFACT, RASTER_ARTIFACT};

use crate::conversion::polygons_to_raster;
use crate::profile::{resolve_profile, ElevationProfile, Expression};
use crate::vector::{multi_ring_buffer, tag_rings};
use std::path::{Path, PathBuf};
use std::time::Instant;
use terrastamp_core::io::{read_geojson, read_geotiff, write_geojson, write_geotiff};
use terrastamp_core::raster::Raster;
use terrastamp_core::vector::FeatureCollection;
use terrastamp_core::{Algorithm, Error, Result, Stage, StageContext};
use tracing::{debug, info, warn};

/// Raster stamp algorithm
#[derive(Debug, Clone, Default)]
pub struct RasterStamp;

impl Algorithm for RasterStamp {
    type Input = (FeatureCollection, Raster<f64>);
    type Output = Raster<f64>;
    type Params = StampParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "RasterStamp"
    }

    fn description(&self) -> &'static str {
        "Stamp elevation rings built around vector features onto a surface raster"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let profile = ring_profile(&params)?;
        let scratch = ScratchSpace::in_temp_dir().at_stage(Stage::Scratch)?;
        stamp_rings(&input.0, &input.1, &profile, &params, &scratch)
    }
}

/// Run the stamp pipeline in memory.
///
/// The surface is not modified; the returned raster has the surface's
/// extent, transform, CRS and no-data value. Tagged rings and the stamp
/// raster are written to `scratch`.
///
/// # Errors
/// Domain errors (`InvalidExpression`, `InvalidDistances`,
/// `MissingElevation`, `NumericFault`, ...) are returned as is. Failing
/// I/O or geometry steps become `Operation` naming the stage.
pub fn raster_stamp(
    features: &FeatureCollection,
    surface: &Raster<f64>,
    params: &StampParams,
    scratch: &ScratchSpace,
) -> Result<Raster<f64>> {
    let profile = ring_profile(params)?;
    stamp_rings(features, surface, &profile, params, scratch)
}

/// Compile the height function and resolve the ring elevations
fn ring_profile(params: &StampParams) -> Result<ElevationProfile> {
    let height_fn = Expression::compile(&params.height_function)?;
    let profile = resolve_profile(&params.distances, params.stair_policy, &height_fn)?;
    info!(
        "resolved {} ring elevations ({} policy, f(d) = {})",
        profile.len(),
        profile.policy(),
        height_fn
    );
    for entry in profile.iter() {
        debug!(
            "ring {} -> f({}) = {}",
            entry.distance, entry.sample, entry.elevation
        );
    }
    Ok(profile)
}

fn stamp_rings(
    features: &FeatureCollection,
    surface: &Raster<f64>,
    profile: &ElevationProfile,
    params: &StampParams,
    scratch: &ScratchSpace,
) -> Result<Raster<f64>> {
    let start = Instant::now();

    if let (Some(fc_crs), Some(surface_crs)) = (features.crs.as_ref(), surface.crs()) {
        if !fc_crs.is_equivalent(surface_crs) {
            warn!(
                "feature CRS {} differs from surface CRS {}; coordinates are used as is",
                fc_crs, surface_crs
            );
        }
    }

    let mut rings = multi_ring_buffer(features, &params.ring_params()).at_stage(Stage::Buffer)?;
    info!("buffered {} features into {} rings", features.len(), rings.len());

    tag_rings(&mut rings, profile).at_stage(Stage::Tag)?;
    write_geojson(&rings, scratch.buffer_path()).at_stage(Stage::Tag)?;

    let stamp = polygons_to_raster(&rings, surface, &params.rasterize_params()).at_stage(Stage::Rasterize)?;

    let output = match stamp {
        Some(stamp) => {
            info!(
                "rasterized rings into a {}x{} stamp ({:?})",
                stamp.rows(),
                stamp.cols(),
                params.cell_assignment
            );
            write_geotiff(&stamp, scratch.raster_path(), None).at_stage(Stage::Rasterize)?;
            combine_with(surface, &stamp, params.operation, params.zero_division).at_stage(Stage::Combine)?
        }
        None => {
            warn!("no ring overlaps the surface; output equals the input surface");
            surface.clone()
        }
    };

    info!("{} stamp finished in {:.2?}", params.operation, start.elapsed());
    Ok(output)
}

/// Run the stamp pipeline on files.
///
/// Reads GeoJSON features and a GeoTIFF surface, writes the stamped surface
/// to `out_raster` and returns its path. Scratch artifacts live in a fresh
/// directory under `scratch_root` and are removed before returning, unless
/// `params.keep_intermediates` is set.
pub fn raster_stamp_files(
    in_features: impl AsRef<Path>,
    in_surface: impl AsRef<Path>,
    out_raster: impl AsRef<Path>,
    params: &StampParams,
    scratch_root: impl AsRef<Path>,
) -> Result<PathBuf> {
    let features_path = DatasetPath::features(in_features)?;
    let surface_path = DatasetPath::raster(in_surface)?;
    let out_raster = out_raster.as_ref();

    // A bad job never gets as far as the scratch root
    let profile = ring_profile(params)?;

    info!("reading features from {}", features_path);
    let features = read_geojson(&features_path).at_stage(Stage::ReadFeatures)?;

    info!("reading surface from {}", surface_path);
    let surface: Raster<f64> = read_geotiff(&surface_path, None).at_stage(Stage::ReadSurface)?;

    let scratch = ScratchSpace::new(scratch_root, params.keep_intermediates).at_stage(Stage::Scratch)?;
    let output = stamp_rings(&features, &surface, &profile, params, &scratch)?;

    write_geotiff(&output, out_raster, None).at_stage(Stage::WriteOutput)?;
    info!("wrote {}", out_raster.display());

    Ok(out_raster.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::point;
    use terrastamp_core::vector::Feature;
    use terrastamp_core::{GeoTransform, CRS};

    fn surface() -> Raster<f64> {
        let mut r = Raster::filled(40, 40, 100.0);
        r.set_transform(GeoTransform::new(0.0, 40.0, 1.0, -1.0));
        r.set_crs(Some(CRS::from_epsg(32633)));
        r.set_nodata(Some(-9999.0));
        r
    }

    fn one_point(x: f64, y: f64) -> FeatureCollection {
        vec![Feature::new(geo::Geometry::Point(point!(x: x, y: y)))]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_stamp_in_memory() {
        let scratch_root = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::new(scratch_root.path(), false).unwrap();
        let params = StampParams {
            distances: vec![5.0, 10.0],
            height_function: "d + 1".into(),
            stair_policy: crate::profile::StairPolicy::Inner,
            ..Default::default()
        };

        let out = raster_stamp(&one_point(20.0, 20.0), &surface(), &params, &scratch).unwrap();
        assert_eq!(out.shape(), (40, 40));
        // cell (19, 19) is centered 0.7 from the point: first ring, f(0) = 1
        assert_eq!(out.get(19, 19).unwrap(), 101.0);
        // cell (19, 27) is centered 7.5 away: second ring, f(5) = 6
        assert_eq!(out.get(19, 27).unwrap(), 106.0);
        assert_eq!(out.get(0, 0).unwrap(), 100.0);

        assert!(scratch.buffer_path().exists());
        assert!(scratch.raster_path().exists());
    }

    #[test]
    fn test_features_off_surface_pass_through() {
        let scratch = ScratchSpace::in_temp_dir().unwrap();
        let params = StampParams {
            distances: vec![1.0],
            ..Default::default()
        };
        let s = surface();
        let out = raster_stamp(&one_point(500.0, 500.0), &s, &params, &scratch).unwrap();
        assert_eq!(out.data(), s.data());
    }

    #[test]
    fn test_algorithm_trait() {
        let stamp = RasterStamp;
        assert_eq!(stamp.name(), "RasterStamp");
        let params = StampParams {
            distances: vec![3.0],
            height_function: "-2".into(),
            ..Default::default()
        };
        let out = stamp.execute((one_point(10.0, 10.0), surface()), params).unwrap();
        assert_eq!(out.get(30, 10).unwrap(), 98.0);
    }

    #[test]
    fn test_bad_expression_fails_before_buffering() {
        let scratch_root = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::new(scratch_root.path(), false).unwrap();
        let params = StampParams {
            distances: vec![3.0],
            height_function: "d +* 2".into(),
            ..Default::default()
        };
        let res = raster_stamp(&one_point(10.0, 10.0), &surface(), &params, &scratch);
        assert!(matches!(res, Err(Error::InvalidExpression { .. })));
        assert!(!scratch.buffer_path().exists());
    }
}
