//! Vector features: geometry plus attributes

use crate::crs::CRS;
use geo_types::{Geometry, Rect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(i) => Some(*i as f64),
            AttributeValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Feature geometry
    pub geometry: Option<Geometry<f64>>,
    /// Feature attributes, kept in key order so written files are stable
    pub properties: BTreeMap<String, AttributeValue>,
    /// Optional feature ID
    pub id: Option<String>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: BTreeMap::new(),
            id: None,
        }
    }

    /// Create a feature with no geometry
    pub fn empty() -> Self {
        Self {
            geometry: None,
            properties: BTreeMap::new(),
            id: None,
        }
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }

    /// Numeric attribute lookup
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.properties.get(key).and_then(AttributeValue::as_f64)
    }
}

/// Collection of features
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    /// CRS declared by the source, if any
    pub crs: Option<CRS>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self {
            features: Vec::new(),
            crs: None,
        }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Iterate over the geometries that are present
    pub fn geometries(&self) -> impl Iterator<Item = &Geometry<f64>> {
        self.features.iter().filter_map(|f| f.geometry.as_ref())
    }

    /// Combined bounding box of all geometries
    pub fn bounds(&self) -> Option<Rect<f64>> {
        let mut acc: Option<(f64, f64, f64, f64)> = None;
        for geom in self.geometries() {
            for c in coords_of(geom) {
                acc = Some(match acc {
                    None => (c.x, c.y, c.x, c.y),
                    Some((x0, y0, x1, y1)) => (x0.min(c.x), y0.min(c.y), x1.max(c.x), y1.max(c.y)),
                });
            }
        }
        acc.map(|(x0, y0, x1, y1)| Rect::new((x0, y0), (x1, y1)))
    }
}

impl FromIterator<Feature> for FeatureCollection {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self {
            features: iter.into_iter().collect(),
            crs: None,
        }
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

fn coords_of(geom: &Geometry<f64>) -> Vec<geo_types::Coord<f64>> {
    use geo_types::Geometry as G;
    match geom {
        G::Point(p) => vec![p.0],
        G::Line(l) => vec![l.start, l.end],
        G::LineString(ls) => ls.0.clone(),
        G::Polygon(p) => p.exterior().0.clone(),
        G::MultiPoint(mp) => mp.0.iter().map(|p| p.0).collect(),
        G::MultiLineString(mls) => mls.0.iter().flat_map(|ls| ls.0.iter().copied()).collect(),
        G::MultiPolygon(mp) => mp
            .0
            .iter()
            .flat_map(|p| p.exterior().0.iter().copied())
            .collect(),
        G::GeometryCollection(gc) => gc.0.iter().flat_map(coords_of).collect(),
        G::Rect(r) => vec![r.min(), r.max()],
        G::Triangle(t) => vec![t.0, t.1, t.2],
    }
}
