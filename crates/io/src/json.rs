// JSON snapshot backup

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use geofuse_core::FusedDataset;
use serde_json::{json, Map};

use crate::error::IoError;

/// Full dataset as a GeoJSON-shaped FeatureCollection: every output column
/// in `properties`, geometry as GeoJSON, provenance alongside.
pub fn snapshot(dataset: &FusedDataset) -> serde_json::Value {
    let columns = dataset.output_columns();
    let features: Vec<serde_json::Value> = dataset
        .records
        .iter()
        .map(|record| {
            let properties: Map<String, serde_json::Value> = columns
                .iter()
                .map(|c| (c.clone(), record.cell(c).to_json()))
                .collect();
            json!({
                "type": "Feature",
                "properties": properties,
                "geometry": record.geometry.as_ref().map(|g| g.to_geojson()),
                "provenance": record.provenance.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "columns": columns,
        "features": features,
    })
}

pub fn write_snapshot(dataset: &FusedDataset, path: &Path) -> Result<(), IoError> {
    let write_err = |source: std::io::Error| IoError::Write {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &snapshot(dataset)).map_err(|e| write_err(e.into()))?;
    writer.flush().map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geofuse_core::{EntityRecord, Source, Value};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_json_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fused_dataset.json");

        let mut r = EntityRecord {
            primary_name: "Kawo".into(),
            secondary_code: Some("NIS04".into()),
            ..Default::default()
        };
        r.set("tpr", Value::Float(0.31));
        r.provenance.insert(Source::Tabular);
        r.provenance.insert(Source::Result("pca".into()));
        let ds = FusedDataset {
            records: vec![r],
            columns: vec!["tpr".into()],
            ..Default::default()
        };

        write_snapshot(&ds, &path).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let feature = &parsed["features"][0];
        assert_eq!(feature["properties"]["unit_name"], "Kawo");
        assert_eq!(feature["properties"]["unit_code"], "NIS04");
        assert_eq!(feature["properties"]["tpr"], 0.31);
        assert_eq!(feature["properties"]["matched"], false);
        assert!(feature["geometry"].is_null());
        assert_eq!(feature["provenance"], json!(["tabular", "result:pca"]));
        assert_eq!(parsed["columns"][2], "tpr");
    }
}
