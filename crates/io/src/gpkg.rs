// GeoPackage primary output (SQLite)

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use geofuse_core::{FusedDataset, Geometry, Value};
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use tracing::debug;

use crate::error::IoError;

/// "GPKG" as a big-endian u32.
pub const APPLICATION_ID: i32 = 0x4750_4B47;
/// GeoPackage 1.4.0.
pub const USER_VERSION: i32 = 10400;
pub const FEATURE_TABLE: &str = "fused_units";
pub const GEOMETRY_COLUMN: &str = "geom";
pub const META_TABLE: &str = "geofuse_meta";
const SRS_ID: i32 = 4326;

const WGS84_WKT: &str = "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",SPHEROID[\"WGS 84\",6378137,298.257223563,\
AUTHORITY[\"EPSG\",\"7030\"]],AUTHORITY[\"EPSG\",\"6326\"]],PRIMEM[\"Greenwich\",0,AUTHORITY[\"EPSG\",\"8901\"]],\
UNIT[\"degree\",0.0174532925199433,AUTHORITY[\"EPSG\",\"9122\"]],AUTHORITY[\"EPSG\",\"4326\"]]";

const SCHEMA: &str = r#"
CREATE TABLE gpkg_spatial_ref_sys (
    srs_name TEXT NOT NULL,
    srs_id INTEGER PRIMARY KEY,
    organization TEXT NOT NULL,
    organization_coordsys_id INTEGER NOT NULL,
    definition TEXT NOT NULL,
    description TEXT
);

CREATE TABLE gpkg_contents (
    table_name TEXT NOT NULL PRIMARY KEY,
    data_type TEXT NOT NULL,
    identifier TEXT UNIQUE,
    description TEXT DEFAULT '',
    last_change DATETIME NOT NULL,
    min_x DOUBLE,
    min_y DOUBLE,
    max_x DOUBLE,
    max_y DOUBLE,
    srs_id INTEGER,
    CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);

CREATE TABLE gpkg_geometry_columns (
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    geometry_type_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL,
    z TINYINT NOT NULL,
    m TINYINT NOT NULL,
    CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
    CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
    CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);

CREATE TABLE geofuse_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

// ---------------------------------------------------------------------------
// Column typing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    /// Narrowest type holding every non-null value of the column.
    fn infer<'a>(values: impl Iterator<Item = &'a Value>) -> Self {
        let mut ty = ColumnType::Integer;
        for v in values {
            ty = match (ty, v) {
                (_, Value::Null) => ty,
                (ColumnType::Integer, Value::Int(_) | Value::Bool(_)) => ColumnType::Integer,
                (ColumnType::Integer | ColumnType::Real, Value::Int(_) | Value::Float(_) | Value::Bool(_)) => {
                    ColumnType::Real
                }
                _ => return ColumnType::Text,
            };
        }
        ty
    }
}

fn to_sql(value: Value, ty: ColumnType) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match (value, ty) {
        (Value::Null, _) => Sql::Null,
        (Value::Bool(b), ColumnType::Integer) => Sql::Integer(b as i64),
        (Value::Int(i), ColumnType::Integer) => Sql::Integer(i),
        (Value::Bool(b), ColumnType::Real) => Sql::Real(if b { 1.0 } else { 0.0 }),
        (Value::Int(i), ColumnType::Real) => Sql::Real(i as f64),
        (Value::Float(f), ColumnType::Real) if f.is_finite() => Sql::Real(f),
        (Value::Float(_), ColumnType::Real) => Sql::Null,
        (other, _) => Sql::Text(other.to_string()),
    }
}

/// Feature-table names for `columns`, unique under SQLite's
/// case-insensitive comparison and clear of `fid` and the geometry column.
fn sql_column_names(columns: &[String]) -> Vec<String> {
    let mut taken: HashSet<String> = ["fid".to_string(), GEOMETRY_COLUMN.to_string()].into();
    columns
        .iter()
        .map(|c| {
            let base = if taken.contains(&c.to_lowercase()) {
                format!("{c}_attr")
            } else {
                c.clone()
            };
            let name = (1..)
                .map(|n| if n == 1 { base.clone() } else { format!("{base}_{n}") })
                .find(|n| !taken.contains(&n.to_lowercase()))
                .unwrap_or(base);
            taken.insert(name.to_lowercase());
            name
        })
        .collect()
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// GeoPackage binary: header with envelope, then little-endian WKB.
pub fn encode_geometry(geometry: &Geometry) -> Vec<u8> {
    let envelope = geometry.envelope();
    let mut out = Vec::with_capacity(40);
    out.extend_from_slice(b"GP");
    out.push(0);
    // bit 0: little-endian; bits 1-3: envelope [minx, maxx, miny, maxy]
    out.push(if envelope.is_some() { 0x03 } else { 0x01 });
    out.extend_from_slice(&SRS_ID.to_le_bytes());
    if let Some(env) = envelope {
        for v in env {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    out.extend_from_slice(&geometry.to_wkb());
    out
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Write `dataset` as a GeoPackage at `path`.
///
/// The file is built under `<name>.tmp` next to the target and renamed into
/// place, so readers never see a half-written package. `meta` rows go to the
/// `geofuse_meta` table; `generated_at` is also used as `last_change`.
pub fn write(dataset: &FusedDataset, path: &Path, meta: &BTreeMap<String, String>) -> Result<(), IoError> {
    let tmp = tmp_path(path);
    if tmp.exists() {
        fs::remove_file(&tmp).map_err(|source| IoError::Write {
            path: tmp.clone(),
            source,
        })?;
    }

    let result = write_package(dataset, &tmp, meta);
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    fs::rename(&tmp, path).map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), records = dataset.len(), "geopackage written");
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_package(dataset: &FusedDataset, path: &Path, meta: &BTreeMap<String, String>) -> Result<(), IoError> {
    let mut conn = Connection::open(path)?;
    conn.pragma_update(None, "application_id", APPLICATION_ID)?;
    conn.pragma_update(None, "user_version", USER_VERSION)?;
    conn.execute_batch(SCHEMA)?;

    let columns = dataset.output_columns();
    let types: Vec<ColumnType> = columns
        .iter()
        .map(|c| ColumnType::infer(dataset.records.iter().map(|r| r.cell(c)).collect::<Vec<_>>().iter()))
        .collect();
    let sql_names = sql_column_names(&columns);

    let geometry_type = geometry_type_name(dataset);
    let extent = dataset
        .records
        .iter()
        .filter_map(|r| r.geometry.as_ref().and_then(Geometry::envelope))
        .reduce(|a, b| [a[0].min(b[0]), a[1].max(b[1]), a[2].min(b[2]), a[3].max(b[3])]);
    let last_change = meta.get("generated_at").cloned().unwrap_or_default();

    let tx = conn.transaction()?;
    {
        let srs = [
            ("Undefined cartesian SRS", -1, "NONE", -1, "undefined", "undefined cartesian coordinate reference system"),
            ("Undefined geographic SRS", 0, "NONE", 0, "undefined", "undefined geographic coordinate reference system"),
            ("WGS 84 geodetic", SRS_ID, "EPSG", SRS_ID, WGS84_WKT, "longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid"),
        ];
        for (name, id, org, org_id, definition, description) in srs {
            tx.execute(
                "INSERT INTO gpkg_spatial_ref_sys (srs_name, srs_id, organization, organization_coordsys_id, definition, description) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![name, id, org, org_id, definition, description],
            )?;
        }

        let mut ddl = format!(
            "CREATE TABLE {} (fid INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, {} {}",
            quote_ident(FEATURE_TABLE),
            quote_ident(GEOMETRY_COLUMN),
            geometry_type
        );
        for (name, ty) in sql_names.iter().zip(&types) {
            ddl.push_str(&format!(", {} {}", quote_ident(name), ty.as_sql()));
        }
        ddl.push(')');
        tx.execute_batch(&ddl)?;

        tx.execute(
            "INSERT INTO gpkg_contents (table_name, data_type, identifier, description, last_change, min_x, min_y, max_x, max_y, srs_id) VALUES (?1, 'features', ?1, 'fused administrative units', ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                FEATURE_TABLE,
                last_change,
                extent.map(|e| e[0]),
                extent.map(|e| e[2]),
                extent.map(|e| e[1]),
                extent.map(|e| e[3]),
                SRS_ID
            ],
        )?;
        tx.execute(
            "INSERT INTO gpkg_geometry_columns (table_name, column_name, geometry_type_name, srs_id, z, m) VALUES (?1, ?2, ?3, ?4, 0, 0)",
            params![FEATURE_TABLE, GEOMETRY_COLUMN, geometry_type, SRS_ID],
        )?;

        let placeholders: Vec<String> = (1..=columns.len() + 1).map(|i| format!("?{i}")).collect();
        let insert = format!(
            "INSERT INTO {} ({}, {}) VALUES ({})",
            quote_ident(FEATURE_TABLE),
            quote_ident(GEOMETRY_COLUMN),
            sql_names.iter().map(|n| quote_ident(n)).collect::<Vec<_>>().join(", "),
            placeholders.join(", ")
        );
        let mut stmt = tx.prepare(&insert)?;
        for record in &dataset.records {
            let mut row = Vec::with_capacity(columns.len() + 1);
            row.push(match &record.geometry {
                Some(g) => rusqlite::types::Value::Blob(encode_geometry(g)),
                None => rusqlite::types::Value::Null,
            });
            for (column, ty) in columns.iter().zip(&types) {
                row.push(to_sql(record.cell(column), *ty));
            }
            stmt.execute(params_from_iter(row))?;
        }

        let mut meta_stmt = tx.prepare("INSERT INTO geofuse_meta (key, value) VALUES (?1, ?2)")?;
        for (key, value) in meta {
            meta_stmt.execute(params![key, value])?;
        }
    }
    tx.commit()?;
    conn.close().map_err(|(_, e)| IoError::Sqlite(e))?;
    Ok(())
}

fn geometry_type_name(dataset: &FusedDataset) -> &'static str {
    let mut kinds = dataset.records.iter().filter_map(|r| r.geometry.as_ref()).map(Geometry::type_name);
    match kinds.next() {
        None => "GEOMETRY",
        Some(first) if kinds.all(|k| k == first) => first,
        Some(_) => "GEOMETRY",
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// What `inspect` reports about a written package.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct GpkgSummary {
    pub application_id: i32,
    pub user_version: i32,
    pub feature_count: usize,
    pub with_geometry: usize,
    pub geometry_type: String,
    pub srs_id: i32,
    /// `(name, declared type)` in table order, `fid` and geometry excluded.
    pub columns: Vec<(String, String)>,
    pub meta: BTreeMap<String, String>,
}

pub fn read_summary(path: &Path) -> Result<GpkgSummary, IoError> {
    if !path.exists() {
        return Err(IoError::Read {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
    }
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let application_id: i32 = conn.query_row("PRAGMA application_id", [], |r| r.get(0))?;
    let user_version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    if application_id != APPLICATION_ID {
        return Err(IoError::format(path, "not a GeoPackage (application_id mismatch)"));
    }

    let (geometry_type, srs_id): (String, i32) = conn.query_row(
        "SELECT geometry_type_name, srs_id FROM gpkg_geometry_columns WHERE table_name = ?1",
        params![FEATURE_TABLE],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;

    let mut columns = Vec::new();
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(FEATURE_TABLE)))?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(1)?, r.get::<_, String>(2)?)))?;
    for row in rows {
        let (name, ty) = row?;
        if name != "fid" && name != GEOMETRY_COLUMN {
            columns.push((name, ty));
        }
    }

    let (feature_count, with_geometry): (i64, i64) = conn.query_row(
        &format!(
            "SELECT COUNT(*), COUNT({}) FROM {}",
            quote_ident(GEOMETRY_COLUMN),
            quote_ident(FEATURE_TABLE)
        ),
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;

    let mut meta = BTreeMap::new();
    let mut stmt = conn.prepare("SELECT key, value FROM geofuse_meta")?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
    for row in rows {
        let (k, v) = row?;
        meta.insert(k, v);
    }

    Ok(GpkgSummary {
        application_id,
        user_version,
        feature_count: feature_count as usize,
        with_geometry: with_geometry as usize,
        geometry_type,
        srs_id,
        columns,
        meta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geofuse_core::{EntityRecord, MatchAnnotation, MatchMethod, Polygon};
    use tempfile::tempdir;

    fn square(x: f64) -> Geometry {
        let ring = vec![[x, 11.0], [x + 0.1, 11.0], [x + 0.1, 11.1], [x, 11.1]];
        Geometry::Polygon(Polygon::new(ring, Vec::new()).unwrap())
    }

    fn dataset() -> FusedDataset {
        let mut kawo = EntityRecord {
            primary_name: "Kawo".into(),
            secondary_code: Some("NIS04".into()),
            geometry: Some(square(8.0)),
            match_info: MatchAnnotation {
                method: MatchMethod::Exact,
                confidence: Some(1.0),
                scorer: None,
            },
            ..Default::default()
        };
        kawo.set("tpr", Value::Float(0.31));
        kawo.set("u5_population", Value::Int(1200));
        kawo.set("geom", Value::Text("clash".into()));
        let mut gwale = EntityRecord {
            primary_name: "Gwale".into(),
            ..Default::default()
        };
        gwale.set("tpr", Value::Int(0));
        gwale.set("u5_population", Value::Null);
        FusedDataset {
            records: vec![kawo, gwale],
            columns: vec!["tpr".into(), "u5_population".into(), "geom".into()],
            ..Default::default()
        }
    }

    fn meta(generated_at: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("generated_at".to_string(), generated_at.to_string()),
            ("session_id".to_string(), "s1".to_string()),
        ])
    }

    #[test]
    fn header_layout() {
        let blob = encode_geometry(&square(8.0));
        assert_eq!(&blob[..4], b"GP\x00\x03");
        assert_eq!(i32::from_le_bytes(blob[4..8].try_into().unwrap()), 4326);
        let minx = f64::from_le_bytes(blob[8..16].try_into().unwrap());
        let maxy = f64::from_le_bytes(blob[32..40].try_into().unwrap());
        assert_eq!(minx, 8.0);
        assert!((maxy - 11.1).abs() < 1e-12);
        // WKB byte order + polygon type
        assert_eq!(blob[40], 1);
        assert_eq!(u32::from_le_bytes(blob[41..45].try_into().unwrap()), 3);
    }

    #[test]
    fn column_types() {
        assert_eq!(ColumnType::infer([Value::Int(1), Value::Null].iter()), ColumnType::Integer);
        assert_eq!(ColumnType::infer([Value::Int(1), Value::Float(0.5)].iter()), ColumnType::Real);
        assert_eq!(ColumnType::infer([Value::Float(0.5), Value::Text("x".into())].iter()), ColumnType::Text);
        assert_eq!(ColumnType::infer(std::iter::empty()), ColumnType::Integer);
    }

    #[test]
    fn write_then_summarize() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fused_dataset.gpkg");
        write(&dataset(), &path, &meta("2026-01-01T00:00:00Z")).unwrap();
        assert!(!tmp_path(&path).exists());

        let s = read_summary(&path).unwrap();
        assert_eq!(s.application_id, APPLICATION_ID);
        assert_eq!(s.user_version, USER_VERSION);
        assert_eq!(s.feature_count, 2);
        assert_eq!(s.with_geometry, 1);
        assert_eq!(s.geometry_type, "POLYGON");
        assert_eq!(s.srs_id, 4326);
        assert_eq!(s.meta["session_id"], "s1");
        let col = |n: &str| s.columns.iter().find(|(c, _)| c == n).map(|(_, t)| t.as_str());
        assert_eq!(col("unit_name"), Some("TEXT"));
        assert_eq!(col("tpr"), Some("REAL"));
        assert_eq!(col("u5_population"), Some("INTEGER"));
        assert_eq!(col("matched"), Some("INTEGER"));
        assert_eq!(col("geom_attr"), Some("TEXT"));
    }

    #[test]
    fn declared_geometry_type_follows_records() {
        let mut ds = dataset();
        assert_eq!(geometry_type_name(&ds), "POLYGON");
        ds.records[0].geometry = Some(Geometry::MultiPolygon(vec![square(8.0).polygons()[0].clone()]));
        assert_eq!(geometry_type_name(&ds), "MULTIPOLYGON");
        ds.records[1].geometry = Some(square(8.2));
        assert_eq!(geometry_type_name(&ds), "GEOMETRY");
        ds.records.iter_mut().for_each(|r| r.geometry = None);
        assert_eq!(geometry_type_name(&ds), "GEOMETRY");
    }

    #[test]
    fn sql_names_unique_ignoring_case() {
        let columns: Vec<String> = ["tpr", "TPR", "Fid", "TPR_attr", "pop"].iter().map(|c| c.to_string()).collect();
        assert_eq!(sql_column_names(&columns), vec!["tpr", "TPR_attr", "Fid_attr", "TPR_attr_attr", "pop"]);
    }

    #[test]
    fn mixed_case_duplicate_columns_still_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fused_dataset.gpkg");
        let mut ds = dataset();
        ds.columns.push("TPR".into());
        ds.records[0].set("TPR", Value::Float(0.9));
        write(&ds, &path, &meta("2026-01-01T00:00:00Z")).unwrap();

        let s = read_summary(&path).unwrap();
        assert_eq!(s.feature_count, 2);
        assert!(s.columns.iter().any(|(c, _)| c == "tpr"));
        assert!(s.columns.iter().any(|(c, _)| c == "TPR_attr"));
    }

    #[test]
    fn identical_inputs_give_identical_bytes() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.gpkg");
        let b = dir.path().join("b.gpkg");
        write(&dataset(), &a, &meta("2026-01-01T00:00:00Z")).unwrap();
        write(&dataset(), &b, &meta("2026-01-01T00:00:00Z")).unwrap();
        assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());

        // Overwriting in place leaves only the new content.
        write(&dataset(), &a, &meta("2026-02-01T00:00:00Z")).unwrap();
        assert_eq!(read_summary(&a).unwrap().meta["generated_at"], "2026-02-01T00:00:00Z");
    }

    #[test]
    fn summary_of_missing_file_fails() {
        let dir = tempdir().unwrap();
        assert!(matches!(read_summary(&dir.path().join("nope.gpkg")), Err(IoError::Read { .. })));
    }
}
