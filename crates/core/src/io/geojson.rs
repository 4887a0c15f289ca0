//! GeoJSON reading and writing for vector features
//!
//! Accepts a FeatureCollection, a single Feature or a bare geometry.
//! Positions with a Z (or M) ordinate are read as 2D. The legacy named
//! `crs` member is understood so that the source CRS can be compared with
//! the surface raster.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, FeatureCollection};
use geo_types::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

type Position = Vec<f64>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum GeometryDoc {
    Point { coordinates: Position },
    MultiPoint { coordinates: Vec<Position> },
    LineString { coordinates: Vec<Position> },
    MultiLineString { coordinates: Vec<Vec<Position>> },
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
    GeometryCollection { geometries: Vec<GeometryDoc> },
}

#[derive(Debug, Serialize, Deserialize)]
struct FeatureDoc {
    #[serde(rename = "type", default = "feature_type")]
    type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(default)]
    geometry: Option<GeometryDoc>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CrsDoc {
    #[serde(rename = "type")]
    type_: String,
    properties: CrsProperties,
}

#[derive(Debug, Serialize, Deserialize)]
struct CrsProperties {
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CollectionDoc {
    #[serde(rename = "type")]
    type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    crs: Option<CrsDoc>,
    features: Vec<FeatureDoc>,
}

fn feature_type() -> String {
    "Feature".to_string()
}

// ─── Decoding ───────────────────────────────────────────────────────────

fn coord(pos: &[f64]) -> Result<Coord<f64>> {
    match pos {
        [x, y, ..] => Ok(Coord { x: *x, y: *y }),
        _ => Err(Error::GeoJson(format!(
            "position needs at least 2 ordinates, got {}",
            pos.len()
        ))),
    }
}

fn line(positions: &[Position]) -> Result<LineString<f64>> {
    positions
        .iter()
        .map(|p| coord(p))
        .collect::<Result<Vec<_>>>()
        .map(LineString::new)
}

fn polygon(rings: &[Vec<Position>]) -> Result<Polygon<f64>> {
    let mut rings = rings.iter().map(|r| line(r));
    let exterior = rings
        .next()
        .transpose()?
        .ok_or_else(|| Error::GeoJson("polygon without exterior ring".into()))?;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn to_geometry(doc: &GeometryDoc) -> Result<Geometry<f64>> {
    Ok(match doc {
        GeometryDoc::Point { coordinates } => Geometry::Point(Point(coord(coordinates)?)),
        GeometryDoc::MultiPoint { coordinates } => Geometry::MultiPoint(MultiPoint(
            coordinates
                .iter()
                .map(|p| coord(p).map(Point))
                .collect::<Result<Vec<_>>>()?,
        )),
        GeometryDoc::LineString { coordinates } => Geometry::LineString(line(coordinates)?),
        GeometryDoc::MultiLineString { coordinates } => Geometry::MultiLineString(MultiLineString(
            coordinates.iter().map(|l| line(l)).collect::<Result<Vec<_>>>()?,
        )),
        GeometryDoc::Polygon { coordinates } => Geometry::Polygon(polygon(coordinates)?),
        GeometryDoc::MultiPolygon { coordinates } => Geometry::MultiPolygon(MultiPolygon(
            coordinates.iter().map(|p| polygon(p)).collect::<Result<Vec<_>>>()?,
        )),
        GeometryDoc::GeometryCollection { geometries } => {
            Geometry::GeometryCollection(GeometryCollection(
                geometries.iter().map(to_geometry).collect::<Result<Vec<_>>>()?,
            ))
        }
    })
}

fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => n
                .as_f64()
                .map(AttributeValue::Float)
                .unwrap_or(AttributeValue::Null),
        },
        Value::String(s) => AttributeValue::String(s.clone()),
        other => AttributeValue::String(other.to_string()),
    }
}

fn to_feature(doc: &FeatureDoc) -> Result<Feature> {
    let mut feature = match &doc.geometry {
        Some(g) => Feature::new(to_geometry(g)?),
        None => Feature::empty(),
    };
    feature.id = doc.id.as_ref().map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    });
    if let Some(props) = &doc.properties {
        for (k, v) in props {
            feature.set_property(k.clone(), to_attribute(v));
        }
    }
    Ok(feature)
}

/// Parse GeoJSON text into a feature collection
pub fn parse_geojson(text: &str) -> Result<FeatureCollection> {
    from_value(serde_json::from_str(text)?)
}

fn from_value(value: Value) -> Result<FeatureCollection> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::GeoJson("missing \"type\" member".into()))?
        .to_string();

    match kind.as_str() {
        "FeatureCollection" => {
            let doc: CollectionDoc = serde_json::from_value(value)?;
            let mut fc: FeatureCollection = doc
                .features
                .iter()
                .map(to_feature)
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .collect();
            fc.crs = doc.crs.and_then(|c| CRS::parse_identifier(&c.properties.name));
            Ok(fc)
        }
        "Feature" => {
            let doc: FeatureDoc = serde_json::from_value(value)?;
            Ok(std::iter::once(to_feature(&doc)?).collect())
        }
        _ => {
            let doc: GeometryDoc = serde_json::from_value(value)?;
            Ok(std::iter::once(Feature::new(to_geometry(&doc)?)).collect())
        }
    }
}

/// Read a GeoJSON file into a feature collection
pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let file = File::open(path.as_ref())?;
    from_value(serde_json::from_reader(BufReader::new(file))?)
}

// ─── Encoding ───────────────────────────────────────────────────────────

fn pos(c: &Coord<f64>) -> Position {
    vec![c.x, c.y]
}

fn line_doc(ls: &LineString<f64>) -> Vec<Position> {
    ls.0.iter().map(pos).collect()
}

fn polygon_doc(p: &Polygon<f64>) -> Vec<Vec<Position>> {
    std::iter::once(p.exterior())
        .chain(p.interiors())
        .map(line_doc)
        .collect()
}

fn from_geometry(geom: &Geometry<f64>) -> GeometryDoc {
    match geom {
        Geometry::Point(p) => GeometryDoc::Point { coordinates: pos(&p.0) },
        Geometry::Line(l) => GeometryDoc::LineString {
            coordinates: vec![pos(&l.start), pos(&l.end)],
        },
        Geometry::LineString(ls) => GeometryDoc::LineString { coordinates: line_doc(ls) },
        Geometry::Polygon(p) => GeometryDoc::Polygon { coordinates: polygon_doc(p) },
        Geometry::MultiPoint(mp) => GeometryDoc::MultiPoint {
            coordinates: mp.0.iter().map(|p| pos(&p.0)).collect(),
        },
        Geometry::MultiLineString(mls) => GeometryDoc::MultiLineString {
            coordinates: mls.0.iter().map(line_doc).collect(),
        },
        Geometry::MultiPolygon(mp) => GeometryDoc::MultiPolygon {
            coordinates: mp.0.iter().map(polygon_doc).collect(),
        },
        Geometry::GeometryCollection(gc) => GeometryDoc::GeometryCollection {
            geometries: gc.0.iter().map(from_geometry).collect(),
        },
        Geometry::Rect(r) => GeometryDoc::Polygon {
            coordinates: polygon_doc(&r.to_polygon()),
        },
        Geometry::Triangle(t) => GeometryDoc::Polygon {
            coordinates: polygon_doc(&t.to_polygon()),
        },
    }
}

fn from_attribute(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Null => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Int(i) => Value::from(*i),
        // Non-finite floats have no JSON representation
        AttributeValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        AttributeValue::String(s) => Value::String(s.clone()),
    }
}

fn collection_doc(fc: &FeatureCollection) -> CollectionDoc {
    CollectionDoc {
        type_: "FeatureCollection".to_string(),
        crs: fc.crs.as_ref().and_then(CRS::epsg).map(|code| CrsDoc {
            type_: "name".to_string(),
            properties: CrsProperties {
                name: format!("urn:ogc:def:crs:EPSG::{}", code),
            },
        }),
        features: fc
            .iter()
            .map(|f| FeatureDoc {
                type_: feature_type(),
                id: f.id.clone().map(Value::String),
                geometry: f.geometry.as_ref().map(from_geometry),
                properties: Some(
                    f.properties
                        .iter()
                        .map(|(k, v)| (k.clone(), from_attribute(v)))
                        .collect(),
                ),
            })
            .collect(),
    }
}

/// Serialize a feature collection to GeoJSON text
pub fn to_geojson_string(fc: &FeatureCollection) -> Result<String> {
    Ok(serde_json::to_string(&collection_doc(fc))?)
}

/// Write a feature collection to a GeoJSON file
pub fn write_geojson<P: AsRef<Path>>(fc: &FeatureCollection, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &collection_doc(fc))?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;

    #[test]
    fn test_parse_feature_collection() {
        let text = r#"{
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32760"}},
            "features": [
                {"type": "Feature", "id": 7, "geometry": {"type": "Point", "coordinates": [1.0, 2.0, 30.0]},
                 "properties": {"name": "well", "depth": 12, "ok": true}},
                {"type": "Feature", "geometry": {"type": "Polygon", "coordinates": [
                    [[0, 0], [4, 0], [4, 4], [0, 4], [0, 0]],
                    [[1, 1], [2, 1], [2, 2], [1, 1]]
                ]}, "properties": null},
                {"type": "Feature", "geometry": null, "properties": {}}
            ]
        }"#;

        let fc = parse_geojson(text).unwrap();
        assert_eq!(fc.len(), 3);
        assert_eq!(fc.crs.as_ref().and_then(CRS::epsg), Some(32760));

        let well = &fc.features[0];
        assert_eq!(well.id.as_deref(), Some("7"));
        assert_eq!(well.geometry, Some(Geometry::Point(Point::new(1.0, 2.0))));
        assert_eq!(well.get_f64("depth"), Some(12.0));
        assert_eq!(well.get_property("ok"), Some(&AttributeValue::Bool(true)));

        match &fc.features[1].geometry {
            Some(Geometry::Polygon(p)) => assert_eq!(p.interiors().len(), 1),
            other => panic!("expected polygon, got {:?}", other),
        }
        assert!(fc.features[2].geometry.is_none());
    }

    #[test]
    fn test_parse_bare_geometry() {
        let fc = parse_geojson(r#"{"type": "LineString", "coordinates": [[0, 0], [10, 0]]}"#).unwrap();
        assert_eq!(fc.len(), 1);
        assert!(matches!(fc.features[0].geometry, Some(Geometry::LineString(_))));
    }

    #[test]
    fn test_rejects_short_position() {
        let res = parse_geojson(r#"{"type": "Point", "coordinates": [1.0]}"#);
        assert!(matches!(res, Err(Error::GeoJson(_))));
    }

    #[test]
    fn test_write_then_read_rings() {
        let mut ring = Feature::new(Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 5.0, y: 0.0),
            (x: 5.0, y: 5.0),
            (x: 0.0, y: 0.0),
        ]));
        ring.set_property("distance", AttributeValue::Float(10.0));
        ring.set_property("z_value", AttributeValue::Float(f64::NAN));

        let mut fc: FeatureCollection = std::iter::once(ring).collect();
        fc.crs = Some(CRS::from_epsg(2193));

        let tmp = tempfile::NamedTempFile::with_suffix(".geojson").unwrap();
        write_geojson(&fc, tmp.path()).unwrap();
        let back = read_geojson(tmp.path()).unwrap();

        assert_eq!(back.crs, Some(CRS::from_epsg(2193)));
        assert_eq!(back.features[0].get_f64("distance"), Some(10.0));
        assert_eq!(back.features[0].get_property("z_value"), Some(&AttributeValue::Null));
        assert_eq!(back.features[0].geometry, fc.features[0].geometry);
    }
}
