//! Spatial measures and cross-method rank comparisons.

use geofuse_core::{EntityRecord, FusedDataset, Geometry, Value};
use serde::Serialize;
use tracing::debug;

use crate::config::DerivedConfig;

/// Authalic sphere radius (WGS84), metres.
pub const AUTHALIC_RADIUS_M: f64 = 6_371_007.181;

pub const AREA_COLUMN: &str = "area_km2";
pub const PERIMETER_COLUMN: &str = "perimeter_km";
pub const CENTROID_LON_COLUMN: &str = "centroid_lon";
pub const CENTROID_LAT_COLUMN: &str = "centroid_lat";
pub const MEAN_RANK_COLUMN: &str = "mean_rank";
pub const PRIORITY_COLUMN: &str = "combined_priority";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DerivedSummary {
    pub columns_added: Vec<String>,
    pub records_measured: usize,
    /// Methods whose ranks were compared, in comparison order.
    pub compared_methods: Vec<String>,
}

// ---------------------------------------------------------------------------
// Geometry measures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measures {
    pub area_km2: f64,
    pub perimeter_km: f64,
    pub centroid: [f64; 2],
}

/// Lambert cylindrical equal-area: `x = Rλ`, `y = R sin φ`.
pub fn project(c: [f64; 2]) -> [f64; 2] {
    [
        AUTHALIC_RADIUS_M * c[0].to_radians(),
        AUTHALIC_RADIUS_M * c[1].to_radians().sin(),
    ]
}

pub fn unproject(p: [f64; 2]) -> [f64; 2] {
    [
        (p[0] / AUTHALIC_RADIUS_M).to_degrees(),
        (p[1] / AUTHALIC_RADIUS_M).clamp(-1.0, 1.0).asin().to_degrees(),
    ]
}

/// Signed shoelace area and area centroid of a projected ring.
fn ring_moments(ring: &[[f64; 2]]) -> (f64, [f64; 2]) {
    let mut a2 = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for w in ring.windows(2) {
        let (p, q) = (w[0], w[1]);
        let cross = p[0] * q[1] - q[0] * p[1];
        a2 += cross;
        cx += (p[0] + q[0]) * cross;
        cy += (p[1] + q[1]) * cross;
    }
    let area = a2 / 2.0;
    if area.abs() < f64::EPSILON {
        return (0.0, [0.0, 0.0]);
    }
    (area, [cx / (6.0 * area), cy / (6.0 * area)])
}

fn ring_length(ring: &[[f64; 2]]) -> f64 {
    ring.windows(2)
        .map(|w| ((w[1][0] - w[0][0]).powi(2) + (w[1][1] - w[0][1]).powi(2)).sqrt())
        .sum()
}

/// Area (holes subtracted), perimeter of every ring, and area-weighted
/// centroid; all computed in projected metres.
pub fn measure(geometry: &Geometry) -> Measures {
    let mut area = 0.0;
    let mut perimeter = 0.0;
    let mut moment = [0.0, 0.0];
    let mut vertices = Vec::new();

    for polygon in geometry.polygons() {
        for (i, ring) in polygon.rings().enumerate() {
            let projected: Vec<[f64; 2]> = ring.iter().map(|&c| project(c)).collect();
            let (signed, c) = ring_moments(&projected);
            let weight = if i == 0 { signed.abs() } else { -signed.abs() };
            area += weight;
            moment[0] += weight * c[0];
            moment[1] += weight * c[1];
            perimeter += ring_length(&projected);
            if i == 0 {
                vertices.extend(projected.iter().skip(1).copied());
            }
        }
    }

    let centroid = if area.abs() > f64::EPSILON {
        [moment[0] / area, moment[1] / area]
    } else {
        vertex_mean(&vertices)
    };

    Measures {
        area_km2: area.max(0.0) / 1e6,
        perimeter_km: perimeter / 1e3,
        centroid: unproject(centroid),
    }
}

fn vertex_mean(points: &[[f64; 2]]) -> [f64; 2] {
    if points.is_empty() {
        return [0.0, 0.0];
    }
    let n = points.len() as f64;
    let sum = points.iter().fold([0.0, 0.0], |acc, p| [acc[0] + p[0], acc[1] + p[1]]);
    [sum[0] / n, sum[1] / n]
}

// ---------------------------------------------------------------------------
// Rank comparison
// ---------------------------------------------------------------------------

/// `1 - diff / (n - 1)` clamped to 0..=1; `1.0` when `n <= 1`.
pub fn consensus(diff: f64, n: usize) -> f64 {
    if n <= 1 {
        return 1.0;
    }
    (1.0 - diff / (n - 1) as f64).clamp(0.0, 1.0)
}

pub fn agreement_label(diff: f64, cfg: &DerivedConfig) -> &'static str {
    if diff <= cfg.agreement_high {
        "high"
    } else if diff <= cfg.agreement_moderate {
        "moderate"
    } else {
        "low"
    }
}

pub fn priority_label<'c>(mean_rank: f64, cfg: &'c DerivedConfig) -> &'c str {
    cfg.priority_bands
        .iter()
        .find(|b| mean_rank <= b.max_mean_rank)
        .map(|b| b.label.as_str())
        .unwrap_or(cfg.priority_fallback.as_str())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Add geometry measures and rank-comparison columns.
///
/// `ranks` lists `(method, rank column)` in method order. Geometry columns
/// appear only if some record has geometry; comparison columns only when
/// at least two rank columns exist.
pub fn compute_derived(dataset: &mut FusedDataset, ranks: &[(String, String)], cfg: &DerivedConfig) -> DerivedSummary {
    let mut summary = DerivedSummary::default();
    add_geometry_measures(dataset, &mut summary);
    if ranks.len() >= 2 {
        add_rank_comparisons(dataset, ranks, cfg, &mut summary);
    }
    debug!(columns = summary.columns_added.len(), measured = summary.records_measured, "derived metrics");
    summary
}

fn add_geometry_measures(dataset: &mut FusedDataset, summary: &mut DerivedSummary) {
    if dataset.records_with_geometry() == 0 {
        return;
    }
    let cols: Vec<String> = [AREA_COLUMN, PERIMETER_COLUMN, CENTROID_LON_COLUMN, CENTROID_LAT_COLUMN]
        .iter()
        .map(|c| dataset.add_column(c, "derived"))
        .collect();

    for record in &mut dataset.records {
        let Some(geometry) = &record.geometry else {
            continue;
        };
        let m = measure(geometry);
        let values = [m.area_km2, m.perimeter_km, m.centroid[0], m.centroid[1]];
        for (col, v) in cols.iter().zip(values) {
            record.set(col.clone(), Value::Float(v));
        }
        summary.records_measured += 1;
    }
    summary.columns_added.extend(cols);
}

fn rank_of(record: &EntityRecord, column: &str) -> Option<f64> {
    record.get(column).as_f64()
}

fn add_rank_comparisons(
    dataset: &mut FusedDataset,
    ranks: &[(String, String)],
    cfg: &DerivedConfig,
    summary: &mut DerivedSummary,
) {
    summary.compared_methods = ranks.iter().map(|(m, _)| m.clone()).collect();

    for i in 0..ranks.len() {
        for j in i + 1..ranks.len() {
            let (a, col_a) = &ranks[i];
            let (b, col_b) = &ranks[j];
            let n = dataset
                .records
                .iter()
                .filter(|r| rank_of(r, col_a).is_some() && rank_of(r, col_b).is_some())
                .count();

            let diff_col = dataset.add_column(&format!("rank_diff_{a}_{b}"), "derived");
            let cons_col = dataset.add_column(&format!("consensus_{a}_{b}"), "derived");
            let agree_col = dataset.add_column(&format!("agreement_{a}_{b}"), "derived");

            for record in &mut dataset.records {
                let (Some(ra), Some(rb)) = (rank_of(record, col_a), rank_of(record, col_b)) else {
                    continue;
                };
                let diff = (ra - rb).abs();
                record.set(diff_col.clone(), Value::Float(diff));
                record.set(cons_col.clone(), Value::Float(consensus(diff, n)));
                record.set(agree_col.clone(), Value::Text(agreement_label(diff, cfg).to_string()));
            }
            summary.columns_added.extend([diff_col, cons_col, agree_col]);
        }
    }

    let mean_col = dataset.add_column(MEAN_RANK_COLUMN, "derived");
    let priority_col = dataset.add_column(PRIORITY_COLUMN, "derived");
    for record in &mut dataset.records {
        let available: Vec<f64> = ranks.iter().filter_map(|(_, c)| rank_of(record, c)).collect();
        if available.is_empty() {
            continue;
        }
        let mean = available.iter().sum::<f64>() / available.len() as f64;
        record.set(mean_col.clone(), Value::Float(mean));
        record.set(priority_col.clone(), Value::Text(priority_label(mean, cfg).to_string()));
    }
    summary.columns_added.extend([mean_col, priority_col]);
}
