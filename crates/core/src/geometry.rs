//! Polygon geometry in geographic coordinates (`[lon, lat]`, EPSG:4326).
//!
//! Parsed from and emitted as GeoJSON; encoded as little-endian WKB for the
//! GeoPackage writer.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub type Coord = [f64; 2];

/// A closed ring. The first coordinate is repeated at the end.
pub type Ring = Vec<Coord>;

#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub exterior: Ring,
    pub holes: Vec<Ring>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Polygon(Polygon),
    MultiPolygon(Vec<Polygon>),
}

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("geometry is not an object")]
    NotAnObject,
    #[error("unsupported geometry type '{0}' (expected Polygon or MultiPolygon)")]
    UnsupportedType(String),
    #[error("malformed coordinates: {0}")]
    Malformed(String),
    #[error("ring has {0} distinct vertices; at least 3 are required")]
    DegenerateRing(usize),
}

impl Polygon {
    pub fn new(exterior: Ring, holes: Vec<Ring>) -> Result<Self, GeometryError> {
        Ok(Self {
            exterior: close_ring(exterior)?,
            holes: holes.into_iter().map(close_ring).collect::<Result<_, _>>()?,
        })
    }

    pub fn rings(&self) -> impl Iterator<Item = &Ring> {
        std::iter::once(&self.exterior).chain(self.holes.iter())
    }
}

impl Geometry {
    pub fn polygons(&self) -> &[Polygon] {
        match self {
            Geometry::Polygon(p) => std::slice::from_ref(p),
            Geometry::MultiPolygon(ps) => ps,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Polygon(_) => "POLYGON",
            Geometry::MultiPolygon(_) => "MULTIPOLYGON",
        }
    }

    /// `[min_x, max_x, min_y, max_y]`, GeoPackage envelope order.
    pub fn envelope(&self) -> Option<[f64; 4]> {
        let mut coords = self
            .polygons()
            .iter()
            .flat_map(|p| p.exterior.iter());
        let first = coords.next()?;
        let mut env = [first[0], first[0], first[1], first[1]];
        for c in coords {
            env[0] = env[0].min(c[0]);
            env[1] = env[1].max(c[0]);
            env[2] = env[2].min(c[1]);
            env[3] = env[3].max(c[1]);
        }
        Some(env)
    }

    // -----------------------------------------------------------------------
    // GeoJSON
    // -----------------------------------------------------------------------

    pub fn from_geojson(value: &serde_json::Value) -> Result<Self, GeometryError> {
        let obj = value.as_object().ok_or(GeometryError::NotAnObject)?;
        let kind = obj
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| GeometryError::Malformed("missing 'type'".into()))?;
        let coords = obj
            .get("coordinates")
            .ok_or_else(|| GeometryError::Malformed("missing 'coordinates'".into()))?;

        match kind {
            "Polygon" => Ok(Geometry::Polygon(parse_polygon(coords)?)),
            "MultiPolygon" => {
                let parts = coords
                    .as_array()
                    .ok_or_else(|| GeometryError::Malformed("MultiPolygon is not an array".into()))?;
                let mut polygons = parts.iter().map(parse_polygon).collect::<Result<Vec<_>, _>>()?;
                match polygons.len() {
                    0 => Err(GeometryError::Malformed("MultiPolygon has no parts".into())),
                    1 => Ok(Geometry::Polygon(polygons.remove(0))),
                    _ => Ok(Geometry::MultiPolygon(polygons)),
                }
            }
            other => Err(GeometryError::UnsupportedType(other.to_string())),
        }
    }

    pub fn to_geojson(&self) -> serde_json::Value {
        fn polygon_coords(p: &Polygon) -> serde_json::Value {
            serde_json::Value::Array(
                p.rings()
                    .map(|ring| serde_json::json!(ring))
                    .collect(),
            )
        }

        match self {
            Geometry::Polygon(p) => serde_json::json!({
                "type": "Polygon",
                "coordinates": polygon_coords(p),
            }),
            Geometry::MultiPolygon(ps) => serde_json::json!({
                "type": "MultiPolygon",
                "coordinates": ps.iter().map(polygon_coords).collect::<Vec<_>>(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // WKB
    // -----------------------------------------------------------------------

    /// ISO WKB, little-endian, 2D.
    pub fn to_wkb(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Geometry::Polygon(p) => write_wkb_polygon(&mut out, p),
            Geometry::MultiPolygon(ps) => {
                out.push(1);
                out.extend_from_slice(&6u32.to_le_bytes());
                out.extend_from_slice(&(ps.len() as u32).to_le_bytes());
                for p in ps {
                    write_wkb_polygon(&mut out, p);
                }
            }
        }
        out
    }
}

impl Serialize for Geometry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_geojson().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Geometry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Geometry::from_geojson(&value).map_err(serde::de::Error::custom)
    }
}

fn write_wkb_polygon(out: &mut Vec<u8>, p: &Polygon) {
    out.push(1);
    out.extend_from_slice(&3u32.to_le_bytes());
    out.extend_from_slice(&((1 + p.holes.len()) as u32).to_le_bytes());
    for ring in p.rings() {
        out.extend_from_slice(&(ring.len() as u32).to_le_bytes());
        for c in ring {
            out.extend_from_slice(&c[0].to_le_bytes());
            out.extend_from_slice(&c[1].to_le_bytes());
        }
    }
}

fn parse_polygon(value: &serde_json::Value) -> Result<Polygon, GeometryError> {
    let rings = value
        .as_array()
        .ok_or_else(|| GeometryError::Malformed("polygon is not an array of rings".into()))?;
    let mut parsed = rings.iter().map(parse_ring);
    let exterior = parsed
        .next()
        .ok_or_else(|| GeometryError::Malformed("polygon has no rings".into()))??;
    let holes = parsed.collect::<Result<Vec<_>, _>>()?;
    Polygon::new(exterior, holes)
}

fn parse_ring(value: &serde_json::Value) -> Result<Ring, GeometryError> {
    let points = value
        .as_array()
        .ok_or_else(|| GeometryError::Malformed("ring is not an array".into()))?;
    points
        .iter()
        .map(|pt| {
            let xy = pt.as_array().filter(|a| a.len() >= 2);
            match xy.map(|a| (a[0].as_f64(), a[1].as_f64())) {
                Some((Some(x), Some(y))) if x.is_finite() && y.is_finite() => Ok([x, y]),
                _ => Err(GeometryError::Malformed(format!("bad position {pt}"))),
            }
        })
        .collect()
}

/// Close an open ring and reject rings with fewer than 3 distinct vertices.
pub fn close_ring(mut ring: Ring) -> Result<Ring, GeometryError> {
    if ring.first() != ring.last() {
        if let Some(&first) = ring.first() {
            ring.push(first);
        }
    }
    let distinct = ring.len().saturating_sub(1);
    if distinct < 3 {
        return Err(GeometryError::DegenerateRing(distinct));
    }
    Ok(ring)
}
