//! Polygon to raster conversion
//!
//! Burns a numeric attribute of polygon features into a grid that shares
//! cell size and snap with a template raster. The output covers the
//! features' footprint only, snapped outward to whole template cells and
//! clipped to the template.
//!
//! Coverage is estimated with an `n x n` sub-cell sample per cell using an
//! even-odd scanline over the polygon edges in pixel space, so rotated
//! templates work unchanged.

use crate::maybe_rayon::*;
use crate::vector::DISTANCE_FIELD;
use geo::{Coord, Geometry, LineString, Polygon};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use terrastamp_core::raster::{GeoTransform, Raster, RasterElement};
use terrastamp_core::vector::FeatureCollection;
use terrastamp_core::{Error, Result};
use tracing::debug;

/// Rule deciding which feature a cell takes its value from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum CellAssignment {
    /// The feature containing the cell center
    #[default]
    CellCenter,
    /// The single feature covering the largest share of the cell
    MaximumArea,
    /// The value whose features together cover the largest share of the cell
    MaximumCombinedArea,
}

impl FromStr for CellAssignment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace([' ', '-'], "_").as_str() {
            "CELL_CENTER" | "CELL_CENTRE" | "CENTER" => Ok(CellAssignment::CellCenter),
            "MAXIMUM_AREA" | "MAX_AREA" => Ok(CellAssignment::MaximumArea),
            "MAXIMUM_COMBINED_AREA" | "MAX_COMBINED_AREA" => Ok(CellAssignment::MaximumCombinedArea),
            _ => Err(Error::InvalidPolicy(format!("unknown cell assignment '{}'", s))),
        }
    }
}

impl TryFrom<String> for CellAssignment {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Parameters for polygon rasterization
#[derive(Debug, Clone)]
pub struct RasterizeParams {
    /// Numeric attribute burned into the cells
    pub value_field: String,
    pub cell_assignment: CellAssignment,
    /// Sub-cell samples per axis for the area based methods (default: 8)
    pub subcell_samples: usize,
}

impl Default for RasterizeParams {
    fn default() -> Self {
        Self {
            value_field: crate::vector::Z_FIELD.to_string(),
            cell_assignment: CellAssignment::CellCenter,
            subcell_samples: 8,
        }
    }
}

/// A polygon feature prepared for scanning, in window pixel coordinates
struct Shape {
    value: f64,
    /// (x0, y0, x1, y1) per non-horizontal edge
    edges: Vec<[f64; 4]>,
    row_min: f64,
    row_max: f64,
}

impl Shape {
    fn overlaps_row(&self, row: usize) -> bool {
        self.row_max > row as f64 && self.row_min < (row + 1) as f64
    }

    /// Number of sub-cell samples inside the shape, per column of `row`.
    fn coverage(&self, row: usize, cols: usize, n: usize, xs: &mut Vec<f64>) -> Vec<u32> {
        let mut counts = vec![0u32; cols];
        let nf = n as f64;
        let total = (cols * n) as f64;

        for i in 0..n {
            let y = row as f64 + (i as f64 + 0.5) / nf;

            xs.clear();
            for &[x0, y0, x1, y1] in &self.edges {
                if (y0 <= y) != (y1 <= y) {
                    xs.push(x0 + (y - y0) * (x1 - x0) / (y1 - y0));
                }
            }
            xs.sort_by(f64::total_cmp);

            // Sub-column s is inside when its center (s + 0.5) / n is in [xa, xb)
            for pair in xs.chunks_exact(2) {
                let s0 = (pair[0] * nf - 0.5).ceil().max(0.0);
                let s1 = (pair[1] * nf - 0.5).ceil().min(total);
                if s1 <= s0 {
                    continue;
                }
                for s in s0 as usize..s1 as usize {
                    counts[s / n] += 1;
                }
            }
        }

        counts
    }
}

fn push_ring(ring: &LineString<f64>, gt: &GeoTransform, edges: &mut Vec<[f64; 4]>, rows: &mut (f64, f64)) {
    let px: Vec<Coord<f64>> = ring
        .0
        .iter()
        .map(|c| {
            let (x, y) = gt.geo_to_pixel(c.x, c.y);
            Coord { x, y }
        })
        .collect();

    for w in px.windows(2) {
        let (a, b) = (w[0], w[1]);
        rows.0 = rows.0.min(a.y);
        rows.1 = rows.1.max(a.y);
        if a.y != b.y {
            edges.push([a.x, a.y, b.x, b.y]);
        }
    }
    // Close rings that were not closed by the source
    if let (Some(first), Some(last)) = (px.first(), px.last()) {
        rows.0 = rows.0.min(last.y);
        rows.1 = rows.1.max(last.y);
        if first != last && first.y != last.y {
            edges.push([last.x, last.y, first.x, first.y]);
        }
    }
}

fn push_polygon(poly: &Polygon<f64>, gt: &GeoTransform, edges: &mut Vec<[f64; 4]>, rows: &mut (f64, f64)) {
    push_ring(poly.exterior(), gt, edges, rows);
    for hole in poly.interiors() {
        push_ring(hole, gt, edges, rows);
    }
}

fn collect_edges(geom: &Geometry<f64>, gt: &GeoTransform, edges: &mut Vec<[f64; 4]>, rows: &mut (f64, f64)) {
    match geom {
        Geometry::Polygon(p) => push_polygon(p, gt, edges, rows),
        Geometry::MultiPolygon(mp) => {
            for p in &mp.0 {
                push_polygon(p, gt, edges, rows);
            }
        }
        Geometry::Rect(r) => push_polygon(&r.to_polygon(), gt, edges, rows),
        Geometry::Triangle(t) => push_polygon(&t.to_polygon(), gt, edges, rows),
        Geometry::GeometryCollection(gc) => {
            for g in &gc.0 {
                collect_edges(g, gt, edges, rows);
            }
        }
        // Points and lines carry no area
        _ => {}
    }
}

/// Burn polygon features into a grid aligned with `template`.
///
/// When several features cover a cell, the innermost ring wins ties:
/// features are ranked by their [`DISTANCE_FIELD`] attribute (smaller first,
/// missing last) and then by input order.
///
/// Returns `Ok(None)` when no polygon overlaps the template.
pub fn polygons_to_raster<T: RasterElement>(
    features: &FeatureCollection,
    template: &Raster<T>,
    params: &RasterizeParams,
) -> Result<Option<Raster<f64>>> {
    if params.subcell_samples == 0 {
        return Err(Error::InvalidParameter {
            name: "subcell_samples",
            value: "0".into(),
            reason: "at least one sample per axis is required".into(),
        });
    }

    let Some(bounds) = features.bounds() else {
        return Ok(None);
    };
    let Some(window) = template.window_for_bounds(bounds.min().x, bounds.min().y, bounds.max().x, bounds.max().y)
    else {
        debug!("features lie outside the template grid");
        return Ok(None);
    };

    let gt = template.transform().offset(window.row_off, window.col_off);

    let mut ranked: Vec<(f64, usize, Shape)> = Vec::new();
    for (index, feature) in features.iter().enumerate() {
        let Some(geom) = feature.geometry.as_ref() else {
            continue;
        };
        let value = feature.get_f64(&params.value_field).ok_or_else(|| Error::InvalidParameter {
            name: "value_field",
            value: params.value_field.clone(),
            reason: format!("feature {} has no numeric value for this field", index),
        })?;

        let mut edges = Vec::new();
        let mut rows = (f64::INFINITY, f64::NEG_INFINITY);
        collect_edges(geom, &gt, &mut edges, &mut rows);
        if edges.is_empty() {
            continue;
        }

        let rank = feature.get_f64(DISTANCE_FIELD).unwrap_or(f64::INFINITY);
        ranked.push((
            rank,
            index,
            Shape {
                value,
                edges,
                row_min: rows.0,
                row_max: rows.1,
            },
        ));
    }

    if ranked.is_empty() {
        return Ok(None);
    }
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    let shapes: Vec<Shape> = ranked.into_iter().map(|(_, _, s)| s).collect();

    let (rows, cols) = (window.rows, window.cols);
    let assignment = params.cell_assignment;
    let n = match assignment {
        CellAssignment::CellCenter => 1,
        _ => params.subcell_samples,
    };

    debug!(
        "rasterizing {} shapes into a {}x{} window at ({}, {})",
        shapes.len(),
        rows,
        cols,
        window.row_off,
        window.col_off
    );

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| burn_row(&shapes, row, cols, n, assignment))
        .collect();

    let mut stamp = Raster::from_vec(data, rows, cols)?;
    stamp.set_transform(gt);
    stamp.set_crs(template.crs().cloned());
    stamp.set_nodata(Some(f64::NAN));

    Ok(Some(stamp))
}

fn burn_row(shapes: &[Shape], row: usize, cols: usize, n: usize, assignment: CellAssignment) -> Vec<f64> {
    let mut row_data = vec![f64::NAN; cols];
    let mut xs = Vec::new();

    match assignment {
        CellAssignment::CellCenter | CellAssignment::MaximumArea => {
            let mut best = vec![0u32; cols];
            for shape in shapes.iter().filter(|s| s.overlaps_row(row)) {
                let counts = shape.coverage(row, cols, n, &mut xs);
                for col in 0..cols {
                    // Strictly greater: earlier (inner) shapes keep ties
                    if counts[col] > best[col] {
                        best[col] = counts[col];
                        row_data[col] = shape.value;
                    }
                }
            }
        }
        CellAssignment::MaximumCombinedArea => {
            let mut tallies: Vec<Vec<(f64, u32)>> = vec![Vec::new(); cols];
            for shape in shapes.iter().filter(|s| s.overlaps_row(row)) {
                let counts = shape.coverage(row, cols, n, &mut xs);
                for col in 0..cols {
                    if counts[col] == 0 {
                        continue;
                    }
                    let tally = &mut tallies[col];
                    match tally.iter_mut().find(|(v, _)| v.total_cmp(&shape.value).is_eq()) {
                        Some((_, c)) => *c += counts[col],
                        None => tally.push((shape.value, counts[col])),
                    }
                }
            }
            for (col, tally) in tallies.iter().enumerate() {
                let mut best = 0u32;
                for &(value, count) in tally {
                    if count > best {
                        best = count;
                        row_data[col] = value;
                    }
                }
            }
        }
    }

    row_data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{resolve_profile, StairPolicy};
    use crate::vector::{multi_ring_buffer, tag_rings, MultiRingParams, Z_FIELD};
    use geo::{point, Rect};
    use terrastamp_core::vector::{AttributeValue, Feature};

    fn surface(rows: usize, cols: usize) -> Raster<f64> {
        let mut r = Raster::filled(rows, cols, 0.0);
        r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        r
    }

    fn strip(x0: f64, x1: f64, distance: f64, z: f64) -> Feature {
        let mut f = Feature::new(Geometry::Rect(Rect::new((x0, 0.0), (x1, 1.0))));
        f.set_property(DISTANCE_FIELD, AttributeValue::Float(distance));
        f.set_property(Z_FIELD, AttributeValue::Float(z));
        f
    }

    /// Rings of 10, 20 and 30 around (50, 50) burned into `template` must
    /// match the analytic distance of every cell center.
    fn assert_rings_match_distance(template: &Raster<f64>) {
        let points: FeatureCollection = vec![Feature::new(Geometry::Point(point!(x: 50.0, y: 50.0)))]
            .into_iter()
            .collect();

        let distances = [10.0, 20.0, 30.0];
        let mut rings = multi_ring_buffer(
            &points,
            &MultiRingParams {
                distances: distances.to_vec(),
                segments: 64,
                ..Default::default()
            },
        )
        .unwrap();
        let profile = resolve_profile(&distances, StairPolicy::Outer, &|d: f64| d).unwrap();
        tag_rings(&mut rings, &profile).unwrap();

        let stamp = polygons_to_raster(&rings, template, &RasterizeParams::default())
            .unwrap()
            .unwrap();
        let (r0, c0) = template.transform().cell_offset_of(stamp.transform()).unwrap();

        let mut inner_cells = 0;
        for row in 0..stamp.rows() {
            for col in 0..stamp.cols() {
                let (x, y) = template.pixel_to_geo(col + c0 as usize, row + r0 as usize);
                let r = ((x - 50.0).powi(2) + (y - 50.0).powi(2)).sqrt();
                if distances.iter().any(|d| (r - d).abs() < 0.1) {
                    continue;
                }
                let v = stamp.get(row, col).unwrap();
                match distances.iter().find(|&&d| r < d) {
                    Some(&d) => assert_eq!(v, d, "cell ({}, {}) at r = {}", row, col, r),
                    None => assert!(v.is_nan(), "cell ({}, {}) at r = {}", row, col, r),
                }
                if r < 10.0 {
                    inner_cells += 1;
                }
            }
        }
        // pi * 10^2 unit cells, give or take the boundary
        assert!((290..=340).contains(&inner_cells), "{} inner cells", inner_cells);
    }

    #[test]
    fn test_point_rings_match_distance() {
        assert_rings_match_distance(&surface(100, 100));
    }

    #[test]
    fn test_rotated_template() {
        // 1 m cells rotated by 30 degrees, centered on (50, 50)
        let (sin, cos) = 30f64.to_radians().sin_cos();
        let gt = GeoTransform::from_gdal([50.0 - 50.0 * (cos + sin), cos, sin, 50.0 - 50.0 * (sin - cos), sin, -cos]);

        let mut template = Raster::filled(100, 100, 0.0);
        template.set_transform(gt);
        assert_rings_match_distance(&template);
    }

    #[test]
    fn test_assignment_methods_differ_on_straddling_cell() {
        let template = surface(1, 3);
        // Shares of cell 1 with 10x10 sampling: A 0.4, D 0.1 (holds the
        // center), B 0.3, C 0.2. B and C share a value.
        let fc: FeatureCollection = vec![
            strip(1.0, 1.4, 1.0, 1.0),
            strip(1.4, 1.52, 2.0, 3.0),
            strip(1.52, 1.78, 3.0, 2.0),
            strip(1.78, 2.0, 4.0, 2.0),
        ]
        .into_iter()
        .collect();

        let burn = |cell_assignment| {
            let params = RasterizeParams {
                cell_assignment,
                subcell_samples: 10,
                ..Default::default()
            };
            let stamp = polygons_to_raster(&fc, &template, &params).unwrap().unwrap();
            assert_eq!(stamp.shape(), (1, 1));
            stamp.get(0, 0).unwrap()
        };

        assert_eq!(burn(CellAssignment::CellCenter), 3.0);
        assert_eq!(burn(CellAssignment::MaximumArea), 1.0);
        assert_eq!(burn(CellAssignment::MaximumCombinedArea), 2.0);
    }

    #[test]
    fn test_inner_ring_wins_overlap() {
        let template = surface(1, 4);
        // The outer ring comes first in the collection but the inner one wins
        let fc: FeatureCollection = vec![strip(0.0, 4.0, 20.0, 5.0), strip(0.0, 4.0, 10.0, 7.0)]
            .into_iter()
            .collect();

        for method in [
            CellAssignment::CellCenter,
            CellAssignment::MaximumArea,
            CellAssignment::MaximumCombinedArea,
        ] {
            let params = RasterizeParams {
                cell_assignment: method,
                ..Default::default()
            };
            let stamp = polygons_to_raster(&fc, &template, &params).unwrap().unwrap();
            assert_eq!(stamp.get(0, 2).unwrap(), 7.0, "{:?}", method);
        }
    }

    #[test]
    fn test_window_is_aligned_and_clipped() {
        let mut template = surface(10, 10);
        template.set_transform(GeoTransform::new(100.0, 200.0, 2.0, -2.0));

        let mut f = Feature::new(Geometry::Rect(Rect::new((103.0, 184.0), (130.0, 195.0))));
        f.set_property(Z_FIELD, AttributeValue::Float(4.0));
        let fc: FeatureCollection = vec![f].into_iter().collect();

        let stamp = polygons_to_raster(&fc, &template, &RasterizeParams::default())
            .unwrap()
            .unwrap();

        // Columns 1..10 (clipped at the template edge), rows 2..8
        assert_eq!(stamp.shape(), (6, 9));
        assert_eq!(template.transform().cell_offset_of(stamp.transform()), Some((2, 1)));
        // Cell (0, 0) is centered on the rectangle's top-left corner, which is inside
        assert_eq!(stamp.get(0, 0).unwrap(), 4.0);
        assert_eq!(stamp.get(5, 8).unwrap(), 4.0);
    }

    #[test]
    fn test_outside_template_and_missing_field() {
        let template = surface(5, 5);

        let mut far = Feature::new(Geometry::Rect(Rect::new((100.0, 100.0), (110.0, 110.0))));
        far.set_property(Z_FIELD, AttributeValue::Float(1.0));
        let fc: FeatureCollection = vec![far].into_iter().collect();
        assert!(polygons_to_raster(&fc, &template, &RasterizeParams::default())
            .unwrap()
            .is_none());

        let bare: FeatureCollection = vec![Feature::new(Geometry::Rect(Rect::new((0.0, 0.0), (2.0, 2.0))))]
            .into_iter()
            .collect();
        assert!(matches!(
            polygons_to_raster(&bare, &template, &RasterizeParams::default()),
            Err(Error::InvalidParameter { name: "value_field", .. })
        ));
    }

    #[test]
    fn test_assignment_parsing() {
        assert_eq!(
            "maximum_combined_area".parse::<CellAssignment>().unwrap(),
            CellAssignment::MaximumCombinedArea
        );
        assert_eq!("CELL_CENTER".parse::<CellAssignment>().unwrap(), CellAssignment::CellCenter);
        assert!("nearest".parse::<CellAssignment>().is_err());
    }
}
