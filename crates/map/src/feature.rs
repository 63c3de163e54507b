//! GeoJSON feature types.
//!
//! `Feature<P>` / `FeatureCollection<P>` are generic over their properties so
//! endpoint schemas can be typed; `MapFeature` is the untyped form handed to
//! the map host, with a numeric id used for feature state.

use foundation::geo::{LngLat, LngLatBounds};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Properties = serde_json::Map<String, Value>;

/// A GeoJSON position. Extra ordinates (altitude) are accepted and dropped.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[f64; 2]")]
pub struct Position(pub LngLat);

impl TryFrom<Vec<f64>> for Position {
    type Error = String;

    fn try_from(v: Vec<f64>) -> Result<Self, Self::Error> {
        if v.len() < 2 {
            return Err(format!("position needs at least 2 ordinates, got {}", v.len()));
        }
        Ok(Position(LngLat::new(v[0], v[1])))
    }
}

impl From<Position> for [f64; 2] {
    fn from(p: Position) -> Self {
        [p.0.lng, p.0.lat]
    }
}

impl From<LngLat> for Position {
    fn from(p: LngLat) -> Self {
        Position(p)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    pub fn point(p: LngLat) -> Self {
        Geometry::Point(Position(p))
    }

    pub fn polygon(rings: Vec<Vec<LngLat>>) -> Self {
        Geometry::Polygon(
            rings
                .into_iter()
                .map(|r| r.into_iter().map(Position).collect())
                .collect(),
        )
    }

    /// Polygons as rings of coordinates (one entry per polygon).
    pub fn polygons(&self) -> Vec<Vec<Vec<LngLat>>> {
        let rings = |r: &Vec<Vec<Position>>| -> Vec<Vec<LngLat>> {
            r.iter().map(|ring| ring.iter().map(|p| p.0).collect()).collect()
        };
        match self {
            Geometry::Polygon(r) => vec![rings(r)],
            Geometry::MultiPolygon(ps) => ps.iter().map(rings).collect(),
            _ => Vec::new(),
        }
    }

    pub fn points(&self) -> Vec<LngLat> {
        match self {
            Geometry::Point(p) => vec![p.0],
            Geometry::MultiPoint(ps) => ps.iter().map(|p| p.0).collect(),
            _ => Vec::new(),
        }
    }

    pub fn lines(&self) -> Vec<Vec<LngLat>> {
        match self {
            Geometry::LineString(l) => vec![l.iter().map(|p| p.0).collect()],
            Geometry::MultiLineString(ls) => ls
                .iter()
                .map(|l| l.iter().map(|p| p.0).collect())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn bounds(&self) -> Option<LngLatBounds> {
        let mut all: Vec<LngLat> = self.points();
        for l in self.lines() {
            all.extend(l);
        }
        for poly in self.polygons() {
            if let Some(outer) = poly.into_iter().next() {
                all.extend(outer);
            }
        }
        LngLatBounds::from_points(&all)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureId {
    Number(u64),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature<P = Properties> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FeatureId>,
    pub geometry: Geometry,
    pub properties: P,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection<P = Properties> {
    pub features: Vec<Feature<P>>,
}

impl<P> Default for FeatureCollection<P> {
    fn default() -> Self {
        Self {
            features: Vec::new(),
        }
    }
}

impl<P> FeatureCollection<P> {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Untyped feature as stored by the map host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapFeature {
    pub id: u64,
    pub geometry: Geometry,
    pub properties: Properties,
}

impl MapFeature {
    pub fn new(id: u64, geometry: Geometry, properties: Properties) -> Self {
        Self {
            id,
            geometry,
            properties,
        }
    }

    /// Converts a typed feature, using `id` as the host-side feature id.
    pub fn from_feature<P: Serialize>(id: u64, f: &Feature<P>) -> Result<Self, serde_json::Error> {
        let properties = match serde_json::to_value(&f.properties)? {
            Value::Object(map) => map,
            Value::Null => Properties::new(),
            other => {
                let mut map = Properties::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Ok(Self::new(id, f.geometry.clone(), properties))
    }
}

/// Converts a typed collection, assigning ids by position.
pub fn to_map_features<P: Serialize>(
    fc: &FeatureCollection<P>,
) -> Result<Vec<MapFeature>, serde_json::Error> {
    fc.features
        .iter()
        .enumerate()
        .map(|(i, f)| MapFeature::from_feature(i as u64, f))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_geojson_with_altitude_and_string_ids() {
        let raw = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "id": "st-1",
                    "geometry": { "type": "Point", "coordinates": [30.06, -1.95, 1567.0] },
                    "properties": { "name": "Kigali" }
                },
                {
                    "type": "Feature",
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
                    },
                    "properties": {}
                }
            ]
        });
        let fc: FeatureCollection = serde_json::from_value(raw).expect("parse");
        assert_eq!(fc.len(), 2);
        assert_eq!(fc.features[0].id, Some(FeatureId::String("st-1".into())));
        assert_eq!(fc.features[0].geometry.points(), vec![LngLat::new(30.06, -1.95)]);
        assert_eq!(fc.features[1].geometry.polygons()[0][0].len(), 4);
    }

    #[test]
    fn short_position_is_rejected() {
        let raw = json!({ "type": "Point", "coordinates": [1.0] });
        assert!(serde_json::from_value::<Geometry>(raw).is_err());
    }

    #[test]
    fn typed_properties_become_a_property_map() {
        #[derive(Serialize)]
        struct Props {
            name: &'static str,
            mean_aqi: f64,
        }
        let fc = FeatureCollection {
            features: vec![Feature {
                id: None,
                geometry: Geometry::point(LngLat::new(0.0, 0.0)),
                properties: Props {
                    name: "A",
                    mean_aqi: 75.0,
                },
            }],
        };
        let out = to_map_features(&fc).expect("convert");
        assert_eq!(out[0].id, 0);
        assert_eq!(out[0].properties.get("mean_aqi"), Some(&json!(75.0)));
    }
}
