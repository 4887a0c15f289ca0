//! Buffer operations
//!
//! Create buffer zones around geometries. Points become circles
//! approximated as polygons, line strings become the union of one capsule
//! per segment, and polygons are grown by unioning capsules along every
//! boundary ring with the polygon itself. The result is the Minkowski sum of
//! the geometry with a disk, up to the arc approximation.

use geo::{BooleanOps, Coord, Geometry, LineString, MultiPolygon, Point, Polygon};
use std::f64::consts::PI;

/// Parameters for buffer operations
#[derive(Debug, Clone)]
pub struct BufferParams {
    /// Buffer distance in map units. Must be positive to grow the geometry.
    pub distance: f64,
    /// Number of segments used to approximate a full circle (default: 32)
    pub segments: usize,
}

impl Default for BufferParams {
    fn default() -> Self {
        Self {
            distance: 1.0,
            segments: 32,
        }
    }
}

fn circle(center: Coord<f64>, r: f64, segments: usize) -> Polygon<f64> {
    let n = segments.max(4);

    let mut coords = Vec::with_capacity(n + 1);
    for i in 0..n {
        let angle = 2.0 * PI * i as f64 / n as f64;
        coords.push((center.x + r * angle.cos(), center.y + r * angle.sin()));
    }
    // Close the ring
    coords.push(coords[0]);

    Polygon::new(LineString::from(coords), vec![])
}

/// Stadium-shaped buffer of the segment `a`-`b`.
fn capsule(a: Coord<f64>, b: Coord<f64>, r: f64, segments: usize) -> Polygon<f64> {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    if dx == 0.0 && dy == 0.0 {
        return circle(a, r, segments);
    }

    let half = (segments.max(4) / 2).max(2);
    let theta = dy.atan2(dx);

    let mut coords = Vec::with_capacity(2 * half + 3);
    for (center, start) in [(b, theta - PI / 2.0), (a, theta + PI / 2.0)] {
        for i in 0..=half {
            let angle = start + PI * i as f64 / half as f64;
            coords.push((center.x + r * angle.cos(), center.y + r * angle.sin()));
        }
    }
    coords.push(coords[0]);

    Polygon::new(LineString::from(coords), vec![])
}

/// Create a circular buffer around a point.
///
/// # Arguments
/// * `point` - Center point
/// * `params` - Buffer parameters (distance, segments)
pub fn buffer_points(point: &Point<f64>, params: &BufferParams) -> Polygon<f64> {
    circle(point.0, params.distance.abs(), params.segments)
}

fn buffer_line_string(ls: &LineString<f64>, params: &BufferParams) -> MultiPolygon<f64> {
    match ls.0.len() {
        0 => MultiPolygon::new(vec![]),
        1 => MultiPolygon::new(vec![circle(ls.0[0], params.distance, params.segments)]),
        _ => union_all(
            ls.lines()
                .map(|l| MultiPolygon::new(vec![capsule(l.start, l.end, params.distance, params.segments)]))
                .collect(),
        ),
    }
}

fn buffer_polygon(poly: &Polygon<f64>, params: &BufferParams) -> MultiPolygon<f64> {
    let mut parts = vec![MultiPolygon::new(vec![poly.clone()])];
    if params.distance > 0.0 {
        for ring in std::iter::once(poly.exterior()).chain(poly.interiors()) {
            parts.push(buffer_line_string(ring, params));
        }
    }
    union_all(parts)
}

/// Buffer any geometry by `params.distance`.
///
/// A non-positive distance returns the polygonal part of the geometry
/// unchanged (and nothing for points and lines).
///
/// # Example
/// ```ignore
/// let zone = buffer_geometry(&line.into(), &BufferParams { distance: 50.0, segments: 32 });
/// ```
pub fn buffer_geometry(geom: &Geometry<f64>, params: &BufferParams) -> MultiPolygon<f64> {
    let grow = params.distance > 0.0;
    match geom {
        Geometry::Point(p) if grow => MultiPolygon::new(vec![buffer_points(p, params)]),
        Geometry::MultiPoint(mp) if grow => {
            union_all(mp.0.iter().map(|p| MultiPolygon::new(vec![buffer_points(p, params)])).collect())
        }
        Geometry::Line(l) if grow => {
            MultiPolygon::new(vec![capsule(l.start, l.end, params.distance, params.segments)])
        }
        Geometry::LineString(ls) if grow => buffer_line_string(ls, params),
        Geometry::MultiLineString(mls) if grow => {
            union_all(mls.0.iter().map(|ls| buffer_line_string(ls, params)).collect())
        }
        Geometry::Point(_)
        | Geometry::MultiPoint(_)
        | Geometry::Line(_)
        | Geometry::LineString(_)
        | Geometry::MultiLineString(_) => MultiPolygon::new(vec![]),
        Geometry::Polygon(p) => buffer_polygon(p, params),
        Geometry::MultiPolygon(mp) => union_all(mp.0.iter().map(|p| buffer_polygon(p, params)).collect()),
        Geometry::Rect(r) => buffer_polygon(&r.to_polygon(), params),
        Geometry::Triangle(t) => buffer_polygon(&t.to_polygon(), params),
        Geometry::GeometryCollection(gc) => {
            union_all(gc.0.iter().map(|g| buffer_geometry(g, params)).collect())
        }
    }
}

/// The polygonal part of a geometry, used to keep rings outside polygons.
pub fn polygonal_part(geom: &Geometry<f64>) -> MultiPolygon<f64> {
    buffer_geometry(geom, &BufferParams { distance: 0.0, segments: 4 })
}

/// Union a set of multipolygons, pairing them up level by level so that
/// each boolean operation works on operands of similar size.
pub fn union_all(mut parts: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    parts.retain(|p| !p.0.is_empty());
    while parts.len() > 1 {
        let mut next = Vec::with_capacity(parts.len().div_ceil(2));
        let mut iter = parts.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => next.push(a.union(&b)),
                None => next.push(a),
            }
        }
        parts = next;
    }
    parts.pop().unwrap_or_else(|| MultiPolygon::new(vec![]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon, Area, Contains};

    #[test]
    fn test_buffer_point_circle() {
        let point = Point::new(0.0, 0.0);
        let params = BufferParams {
            distance: 10.0,
            segments: 64,
        };

        let polygon = buffer_points(&point, &params);

        // Area should approximate π * r²
        let expected_area = PI * 100.0;
        let actual_area = polygon.unsigned_area();

        let error = (actual_area - expected_area).abs() / expected_area;
        assert!(
            error < 0.01,
            "Circle area error {:.2}% (expected {:.1}, got {:.1})",
            error * 100.0,
            expected_area,
            actual_area
        );
        assert_eq!(polygon.exterior().0.len(), 65);
    }

    #[test]
    fn test_buffer_line_is_stadium() {
        let line: Geometry<f64> = line_string![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0)].into();
        let params = BufferParams { distance: 5.0, segments: 64 };
        let zone = buffer_geometry(&line, &params);

        // rectangle + full circle
        let expected = 100.0 * 10.0 + PI * 25.0;
        let area = zone.unsigned_area();
        assert!((area - expected).abs() / expected < 0.01, "area {}", area);

        assert!(zone.contains(&point!(x: 50.0, y: 4.9)));
        assert!(zone.contains(&point!(x: -4.9, y: 0.0)));
        assert!(!zone.contains(&point!(x: 50.0, y: 5.1)));
    }

    #[test]
    fn test_buffer_bent_line_has_round_join() {
        let line: Geometry<f64> =
            line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0)].into();
        let zone = buffer_geometry(&line, &BufferParams { distance: 2.0, segments: 64 });

        // Outer corner of the turn lies at distance 2 from (10, 0)
        assert!(zone.contains(&point!(x: 11.3, y: -1.3)));
        assert!(!zone.contains(&point!(x: 11.9, y: -1.9)));
        assert_eq!(zone.0.len(), 1);
    }

    #[test]
    fn test_buffer_polygon_grows_and_keeps_interior() {
        let square: Geometry<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ]
        .into();
        let zone = buffer_geometry(&square, &BufferParams { distance: 1.0, segments: 64 });

        let expected = 100.0 + 4.0 * 10.0 + PI;
        assert!((zone.unsigned_area() - expected).abs() / expected < 0.01);
        assert!(zone.contains(&point!(x: 5.0, y: 5.0)));
        assert!(zone.contains(&point!(x: 10.5, y: 5.0)));
    }

    #[test]
    fn test_non_positive_distance_keeps_polygons_only() {
        let pt: Geometry<f64> = point!(x: 1.0, y: 1.0).into();
        assert!(polygonal_part(&pt).0.is_empty());

        let tri: Geometry<f64> = polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 0.0, y: 4.0)].into();
        assert!((polygonal_part(&tri).unsigned_area() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_union_all_merges_overlaps() {
        let a = MultiPolygon::new(vec![buffer_points(&Point::new(0.0, 0.0), &BufferParams::default())]);
        let b = MultiPolygon::new(vec![buffer_points(&Point::new(1.0, 0.0), &BufferParams::default())]);
        let c = MultiPolygon::new(vec![buffer_points(&Point::new(10.0, 0.0), &BufferParams::default())]);

        let merged = union_all(vec![a, b, c, MultiPolygon::new(vec![])]);
        assert_eq!(merged.0.len(), 2);
        assert!(union_all(vec![]).0.is_empty());
    }
}
