// Delimited text: tabular/result input and the CSV backup

use std::io::Read;
use std::path::Path;

use geofuse_core::{FusedDataset, Table, Value};

use crate::error::IoError;

/// Read a delimited file with a header row into a typed table.
///
/// `.tsv` files are always tab-separated; everything else is sniffed.
pub fn read_table(path: &Path) -> Result<Table, IoError> {
    let content = read_file_as_utf8(path)?;
    let is_tsv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("tsv"));
    let delimiter = if is_tsv { b'\t' } else { sniff_delimiter(&content) };
    parse_table(&content, delimiter).map_err(|message| IoError::format(path, message))
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// with the most lines agreeing with the header's field count (>1 field) wins; wider rows
/// break ties.
pub fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).take(10).collect();

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample.iter().map(|line| field_count(line, delim)).collect();

        let target = counts.first().copied().unwrap_or(0);
        if target <= 1 {
            continue;
        }
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

fn field_count(line: &str, delimiter: u8) -> usize {
    ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes())
        .records()
        .next()
        .and_then(|r| r.ok())
        .map(|r| r.len())
        .unwrap_or(1)
}

/// Read file and convert to UTF-8 if needed (Windows-1252 fallback).
pub fn read_file_as_utf8(path: &Path) -> Result<String, IoError> {
    let mut bytes = Vec::new();
    std::fs::File::open(path)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .map_err(|source| IoError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let text = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            decoded.into_owned()
        }
    };
    Ok(match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}

/// Parse delimited text. Blank header cells become `column_<n>`; rows with
/// no non-empty field are skipped.
pub fn parse_table(content: &str, delimiter: u8) -> Result<Table, String> {
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers().map_err(|e| e.to_string())?.clone();
    let columns: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = h.trim();
            if h.is_empty() {
                format!("column_{}", i + 1)
            } else {
                h.to_string()
            }
        })
        .collect();
    if columns.is_empty() {
        return Err("no header row".into());
    }

    let mut table = Table::new(columns);
    for result in reader.records() {
        let record = result.map_err(|e| e.to_string())?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        table.push_row(record.iter().map(Value::infer).collect());
    }
    Ok(table)
}

/// Backup writer: every output column, geometry omitted.
pub fn write_csv(dataset: &FusedDataset, path: &Path) -> Result<(), IoError> {
    let write_err = |e: ::csv::Error| IoError::Write {
        path: path.to_path_buf(),
        source: e.into(),
    };
    let mut writer = ::csv::WriterBuilder::new().from_path(path).map_err(write_err)?;

    let columns = dataset.output_columns();
    writer.write_record(&columns).map_err(write_err)?;
    for record in &dataset.records {
        writer
            .write_record(columns.iter().map(|c| record.cell(c).to_string()))
            .map_err(write_err)?;
    }
    writer.flush().map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })
}
