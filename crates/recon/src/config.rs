use std::collections::HashSet;

use serde::Deserialize;

use crate::error::FusionError;
use crate::scorer::ScorerKind;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Engine tuning. Every field has a default, so an empty document is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FusionConfig {
    pub matching: MatchingConfig,
    pub columns: ColumnCandidates,
    pub results: ResultsConfig,
    pub derived: DerivedConfig,
    pub validation: ValidationConfig,
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchingConfig {
    /// Minimum fuzzy confidence, inclusive.
    pub fuzzy_threshold: f64,
    /// Scorers tried for every fuzzy candidate, in order.
    pub scorers: Vec<ScorerKind>,
    /// A text column whose distinct count exceeds this share of rows may
    /// stand in for a missing name column.
    pub synthetic_id_ratio: f64,
    /// Join on secondary codes before names when both sides carry them.
    pub use_code_join: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.75,
            scorers: vec![
                ScorerKind::TokenSort,
                ScorerKind::Partial,
                ScorerKind::Ratio,
                ScorerKind::JaroWinkler,
            ],
            synthetic_id_ratio: 0.8,
            use_code_join: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Column detection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnCandidates {
    /// Name-column candidates, highest priority first. Compared case-insensitively.
    pub name: Vec<String>,
    pub code: Vec<String>,
}

impl Default for ColumnCandidates {
    fn default() -> Self {
        Self {
            name: strings(&[
                "wardname",
                "ward_name",
                "ward",
                "unit_name",
                "name",
                "admin_name",
                "adm3_en",
                "adm2_en",
                "lganame",
                "lga_name",
                "lga",
                "district",
                "region",
            ]),
            code: strings(&[
                "wardcode",
                "ward_code",
                "unit_code",
                "code",
                "adm3_pcode",
                "adm2_pcode",
                "pcode",
            ]),
        }
    }
}

// ---------------------------------------------------------------------------
// Result tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResultsConfig {
    /// Known analysis methods, in comparison order.
    pub methods: Vec<String>,
    pub synonyms: SynonymConfig,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            methods: strings(&["composite", "pca", "ensemble"]),
            synonyms: SynonymConfig::default(),
        }
    }
}

/// Column names recognised as a score, rank or category, case-insensitive.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SynonymConfig {
    pub score: Vec<String>,
    pub rank: Vec<String>,
    pub category: Vec<String>,
}

impl Default for SynonymConfig {
    fn default() -> Self {
        Self {
            score: strings(&[
                "score",
                "composite_score",
                "pca_score",
                "ensemble_score",
                "final_score",
                "vulnerability_score",
                "risk_score",
            ]),
            rank: strings(&[
                "rank",
                "overall_rank",
                "vulnerability_rank",
                "final_rank",
                "ranking",
                "composite_rank",
                "pca_rank",
                "ensemble_rank",
            ]),
            category: strings(&[
                "category",
                "vulnerability_category",
                "risk_category",
                "class",
                "classification",
                "priority_category",
                "composite_category",
                "pca_category",
                "ensemble_category",
            ]),
        }
    }
}

// ---------------------------------------------------------------------------
// Derived metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DerivedConfig {
    /// Rank differences at or below this are `high` agreement.
    pub agreement_high: f64,
    /// Rank differences at or below this are `moderate` agreement.
    pub agreement_moderate: f64,
    /// Ascending mean-rank bands; the first band a record fits wins.
    pub priority_bands: Vec<PriorityBand>,
    /// Label for mean ranks beyond every band.
    pub priority_fallback: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriorityBand {
    pub label: String,
    pub max_mean_rank: f64,
}

impl Default for DerivedConfig {
    fn default() -> Self {
        Self {
            agreement_high: 10.0,
            agreement_moderate: 25.0,
            priority_bands: vec![
                PriorityBand {
                    label: "high".into(),
                    max_mean_rank: 10.0,
                },
                PriorityBand {
                    label: "medium".into(),
                    max_mean_rank: 25.0,
                },
            ],
            priority_fallback: "low".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    pub min_attribute_columns: usize,
    /// Share of non-null attribute cells, 0..=1.
    pub min_completeness: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_attribute_columns: 5,
            min_completeness: 0.70,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl FusionConfig {
    pub fn from_toml(input: &str) -> Result<Self, FusionError> {
        let config: FusionConfig =
            toml::from_str(input).map_err(|e| FusionError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FusionError> {
        let m = &self.matching;
        if !(0.0..=1.0).contains(&m.fuzzy_threshold) {
            return Err(FusionError::ConfigValidation(format!(
                "matching.fuzzy_threshold must be within 0..=1, got {}",
                m.fuzzy_threshold
            )));
        }

        let distinct: HashSet<_> = m.scorers.iter().collect();
        if distinct.len() < 3 {
            return Err(FusionError::ConfigValidation(format!(
                "matching.scorers needs at least 3 distinct scorers, got {}",
                distinct.len()
            )));
        }

        if !(m.synthetic_id_ratio > 0.0 && m.synthetic_id_ratio <= 1.0) {
            return Err(FusionError::ConfigValidation(format!(
                "matching.synthetic_id_ratio must be within (0, 1], got {}",
                m.synthetic_id_ratio
            )));
        }

        if self.columns.name.is_empty() {
            return Err(FusionError::ConfigValidation(
                "columns.name must list at least one candidate".into(),
            ));
        }

        let mut seen = HashSet::new();
        for method in &self.results.methods {
            if method.trim().is_empty() {
                return Err(FusionError::ConfigValidation(
                    "results.methods contains an empty name".into(),
                ));
            }
            if !seen.insert(method.to_lowercase()) {
                return Err(FusionError::ConfigValidation(format!(
                    "results.methods lists '{method}' twice"
                )));
            }
        }

        let d = &self.derived;
        if d.agreement_high < 0.0 || d.agreement_moderate < d.agreement_high {
            return Err(FusionError::ConfigValidation(format!(
                "derived agreement cut-offs must satisfy 0 <= high <= moderate, got {} / {}",
                d.agreement_high, d.agreement_moderate
            )));
        }
        for pair in d.priority_bands.windows(2) {
            if pair[1].max_mean_rank <= pair[0].max_mean_rank {
                return Err(FusionError::ConfigValidation(format!(
                    "derived.priority_bands must be ascending: '{}' ({}) follows '{}' ({})",
                    pair[1].label, pair[1].max_mean_rank, pair[0].label, pair[0].max_mean_rank
                )));
            }
        }

        let v = &self.validation;
        if !(0.0..=1.0).contains(&v.min_completeness) {
            return Err(FusionError::ConfigValidation(format!(
                "validation.min_completeness must be within 0..=1, got {}",
                v.min_completeness
            )));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
