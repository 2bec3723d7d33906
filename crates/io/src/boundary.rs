// Boundary input: zipped shapefile, zipped or bare GeoJSON FeatureCollection

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use geofuse_core::{GeoTable, Geometry, Polygon, Ring, Table, Value};
use shapefile::dbase::{self, FieldValue};
use shapefile::{PolygonRing, Shape};
use tracing::{debug, warn};

use crate::csv::read_file_as_utf8;
use crate::error::IoError;

/// Read a boundary file.
///
/// `.zip` archives are searched for a shapefile (`.shp` plus the `.dbf` of
/// the same stem) first, then the first `.geojson` and finally `.json` entry.
pub fn read_boundaries(path: &Path) -> Result<GeoTable, IoError> {
    let is_zip = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"));
    if is_zip {
        return read_archive(path);
    }
    let text = read_file_as_utf8(path)?;
    parse_feature_collection(&text).map_err(|message| IoError::format(path, message))
}

fn read_archive(path: &Path) -> Result<GeoTable, IoError> {
    let file = File::open(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| IoError::format(path, e.to_string()))?;

    let mut names: Vec<(usize, String)> = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(|e| IoError::format(path, e.to_string()))?;
        let name = entry.name().to_lowercase();
        if !entry.is_dir() && !name.starts_with("__macosx/") {
            names.push((i, name));
        }
    }
    let find = |suffix: &str| names.iter().find(|(_, n)| n.ends_with(suffix)).map(|(i, _)| *i);
    let sibling = |stem: &str, ext: &str| {
        let wanted = format!("{stem}.{ext}");
        names.iter().find(|(_, n)| *n == wanted).map(|(i, _)| *i)
    };

    let shapefile = names.iter().find_map(|(i, n)| {
        let stem = n.strip_suffix(".shp")?;
        Some((*i, sibling(stem, "dbf")?, sibling(stem, "prj")))
    });
    if let Some((shp, dbf, prj)) = shapefile {
        if let Some(prj) = prj {
            let wkt = String::from_utf8_lossy(&entry_bytes(&mut archive, prj, path)?).into_owned();
            if !wkt.trim_start().starts_with("GEOGCS") {
                warn!("shapefile projection is not geographic; coordinates are read as lon/lat");
            }
        }
        let shp = entry_bytes(&mut archive, shp, path)?;
        let dbf = entry_bytes(&mut archive, dbf, path)?;
        return parse_shapefile(shp, dbf).map_err(|message| IoError::format(path, message));
    }

    let index = find(".geojson")
        .or_else(|| find(".json"))
        .ok_or_else(|| IoError::format(path, "archive contains no shapefile, .geojson or .json entry"))?;
    let bytes = entry_bytes(&mut archive, index, path)?;
    let text = String::from_utf8(bytes).map_err(|_| IoError::format(path, "boundary entry is not UTF-8"))?;
    parse_feature_collection(&text).map_err(|message| IoError::format(path, message))
}

fn entry_bytes(archive: &mut zip::ZipArchive<File>, index: usize, path: &Path) -> Result<Vec<u8>, IoError> {
    let mut entry = archive.by_index(index).map_err(|e| IoError::format(path, e.to_string()))?;
    debug!(entry = entry.name(), "reading boundary entry");
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(bytes)
}

// ---------------------------------------------------------------------------
// Shapefile
// ---------------------------------------------------------------------------

/// Parse `.shp` + `.dbf` contents. Attribute columns follow the dBase field
/// order; non-polygon shapes keep their attributes and get no geometry.
pub fn parse_shapefile(shp: Vec<u8>, dbf: Vec<u8>) -> Result<GeoTable, String> {
    let shapes = shapefile::ShapeReader::new(Cursor::new(shp)).map_err(|e| format!("invalid .shp: {e}"))?;
    let records = dbase::Reader::new(Cursor::new(dbf)).map_err(|e| format!("invalid .dbf: {e}"))?;
    let columns: Vec<String> = records.fields().iter().map(|f| f.name().to_string()).collect();
    let mut reader = shapefile::Reader::new(shapes, records);

    let mut table = Table::new(columns);
    let mut geometries = Vec::new();
    let mut skipped = 0usize;
    for (i, item) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = item.map_err(|e| format!("shape {i}: {e}"))?;
        let row = table
            .columns
            .iter()
            .map(|c| record.get(c).map(dbase_value).unwrap_or(Value::Null))
            .collect();
        table.push_row(row);

        let geometry = match shape_geometry(&shape) {
            Ok(geometry) => geometry,
            Err(e) => {
                skipped += 1;
                debug!(shape = i, error = %e, "geometry dropped");
                None
            }
        };
        geometries.push(geometry);
    }
    if skipped > 0 {
        warn!(skipped, "shapes with unusable geometry kept without geometry");
    }

    Ok(GeoTable::new(table, geometries))
}

fn dbase_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => {
            let s = s.trim();
            if s.is_empty() {
                Value::Null
            } else {
                Value::Text(s.to_string())
            }
        }
        FieldValue::Numeric(Some(n)) if n.fract() == 0.0 && n.abs() < 9.0e15 => Value::Int(*n as i64),
        FieldValue::Numeric(Some(n)) | FieldValue::Double(n) | FieldValue::Currency(n) => Value::Float(*n),
        FieldValue::Float(Some(f)) => Value::Float(f64::from(*f)),
        FieldValue::Integer(i) => Value::Int(i64::from(*i)),
        FieldValue::Logical(Some(b)) => Value::Bool(*b),
        FieldValue::Date(Some(d)) => Value::Text(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day())),
        _ => Value::Null,
    }
}

/// Outer rings open a new polygon; inner rings are holes of the last one.
fn shape_geometry(shape: &Shape) -> Result<Option<Geometry>, String> {
    let rings: Vec<(bool, Ring)> = match shape {
        Shape::NullShape => return Ok(None),
        Shape::Polygon(p) => ring_coords(p.rings(), |pt| [pt.x, pt.y]),
        Shape::PolygonM(p) => ring_coords(p.rings(), |pt| [pt.x, pt.y]),
        Shape::PolygonZ(p) => ring_coords(p.rings(), |pt| [pt.x, pt.y]),
        other => return Err(format!("unsupported shape type {:?}", other.shapetype())),
    };

    let mut parts: Vec<(Ring, Vec<Ring>)> = Vec::new();
    for (outer, ring) in rings {
        match parts.last_mut() {
            Some((_, holes)) if !outer => holes.push(ring),
            _ => parts.push((ring, Vec::new())),
        }
    }
    let mut polygons = parts
        .into_iter()
        .map(|(exterior, holes)| Polygon::new(exterior, holes))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;

    Ok(match polygons.len() {
        0 => None,
        1 => polygons.pop().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(polygons)),
    })
}

fn ring_coords<P>(rings: &[PolygonRing<P>], xy: impl Fn(&P) -> [f64; 2]) -> Vec<(bool, Ring)> {
    rings
        .iter()
        .map(|ring| {
            let outer = matches!(ring, PolygonRing::Outer(_));
            (outer, ring.points().iter().map(&xy).collect())
        })
        .collect()
}

// ---------------------------------------------------------------------------
// GeoJSON
// ---------------------------------------------------------------------------

/// Parse a FeatureCollection (or a single Feature) into attributes + geometry.
///
/// Property columns appear in first-seen order. Features whose geometry is
/// null or not polygonal keep their attributes and get no geometry.
pub fn parse_feature_collection(text: &str) -> Result<GeoTable, String> {
    let root: serde_json::Value = serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;

    let features: Vec<&serde_json::Value> = match root.get("type").and_then(|t| t.as_str()) {
        Some("FeatureCollection") => root
            .get("features")
            .and_then(|f| f.as_array())
            .ok_or("FeatureCollection has no 'features' array")?
            .iter()
            .collect(),
        Some("Feature") => vec![&root],
        Some(other) => return Err(format!("expected a FeatureCollection, found '{other}'")),
        None => return Err("expected a GeoJSON FeatureCollection".into()),
    };

    let mut columns: Vec<String> = Vec::new();
    for feature in &features {
        if let Some(props) = feature.get("properties").and_then(|p| p.as_object()) {
            for key in props.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let mut table = Table::new(columns);
    let mut geometries = Vec::with_capacity(features.len());
    let mut skipped = 0usize;
    for (i, feature) in features.iter().enumerate() {
        let props = feature.get("properties").and_then(|p| p.as_object());
        let row = table
            .columns
            .iter()
            .map(|c| props.and_then(|p| p.get(c)).map(Value::from_json).unwrap_or(Value::Null))
            .collect();
        table.push_row(row);

        let geometry = match feature.get("geometry") {
            None | Some(serde_json::Value::Null) => None,
            Some(g) => match Geometry::from_geojson(g) {
                Ok(geometry) => Some(geometry),
                Err(e) => {
                    skipped += 1;
                    debug!(feature = i, error = %e, "geometry dropped");
                    None
                }
            },
        };
        geometries.push(geometry);
    }
    if skipped > 0 {
        warn!(skipped, "features with unusable geometry kept without geometry");
    }

    Ok(GeoTable::new(table, geometries))
}
