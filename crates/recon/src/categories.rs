//! Column categorization by case-insensitive substring rules.
//!
//! A column may fall into several categories; one matching none is `other`.

use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;

use crate::error::FusionError;

pub const OTHER_CATEGORY: &str = "other";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryRule {
    pub name: String,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryRules {
    #[serde(rename = "category")]
    pub categories: Vec<CategoryRule>,
}

const BUILTIN: &[(&str, &[&str])] = &[
    (
        "health",
        &[
            "tpr", "malaria", "positivity", "u5", "under5", "under_five", "mortality", "prevalence",
            "incidence", "itn", "bednet", "bed_net", "health", "clinic", "hospital", "anemia",
            "anaemia", "fever", "vaccin", "immuni", "stunting", "wasting", "disease",
        ],
    ),
    (
        "environmental",
        &[
            "rainfall", "precip", "temperature", "ndvi", "ndwi", "elevation", "altitude", "soil",
            "flood", "humidity", "water", "landcover", "land_cover", "climate", "vegetation",
            "aridity", "wetness",
        ],
    ),
    (
        "infrastructure",
        &[
            "road", "housing", "building", "settlement", "electric", "nightlight", "night_light",
            "facilit", "urban", "travel_time", "distance_to",
        ],
    ),
    (
        "demographic",
        &[
            "population", "pop_", "density", "household", "female", "male", "birth", "children",
            "women", "age_group",
        ],
    ),
    (
        "socioeconomic",
        &[
            "income", "poverty", "wealth", "education", "literacy", "employ", "asset",
            "expenditure", "socioeconomic",
        ],
    ),
    (
        "analysis",
        &[
            "score", "rank", "category", "composite", "pca", "ensemble", "consensus", "agreement",
            "priority", "vulnerab", "risk", "cluster",
        ],
    ),
    (
        "spatial",
        &[
            "area_km2", "perimeter", "centroid", "latitude", "longitude", "shape_area",
            "shape_leng", "geometry",
        ],
    ),
    (
        "identity",
        &[
            "unit_name", "unit_code", "ward", "lga", "state", "pcode", "name", "code", "match",
        ],
    ),
];

impl Default for CategoryRules {
    fn default() -> Self {
        Self {
            categories: BUILTIN
                .iter()
                .map(|(name, patterns)| CategoryRule {
                    name: name.to_string(),
                    patterns: patterns.iter().map(|p| p.to_string()).collect(),
                })
                .collect(),
        }
    }
}

impl CategoryRules {
    /// Replace the built-in table with `[[category]]` entries from TOML.
    pub fn from_toml(input: &str) -> Result<Self, FusionError> {
        let rules: CategoryRules =
            toml::from_str(input).map_err(|e| FusionError::ConfigParse(e.to_string()))?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn validate(&self) -> Result<(), FusionError> {
        let mut seen = HashSet::new();
        for rule in &self.categories {
            let name = rule.name.trim();
            if name.is_empty() {
                return Err(FusionError::ConfigValidation("category with empty name".into()));
            }
            if name == OTHER_CATEGORY {
                return Err(FusionError::ConfigValidation(format!(
                    "'{OTHER_CATEGORY}' is reserved for unmatched columns"
                )));
            }
            if !seen.insert(name.to_lowercase()) {
                return Err(FusionError::ConfigValidation(format!(
                    "category '{name}' defined twice"
                )));
            }
            if rule.patterns.iter().all(|p| p.trim().is_empty()) {
                return Err(FusionError::ConfigValidation(format!(
                    "category '{name}' has no patterns"
                )));
            }
        }
        Ok(())
    }

    /// Every category whose patterns occur in `column`, in rule order.
    pub fn categories_of(&self, column: &str) -> Vec<&str> {
        let lower = column.to_lowercase();
        self.categories
            .iter()
            .filter(|rule| {
                rule.patterns
                    .iter()
                    .map(|p| p.trim().to_lowercase())
                    .any(|p| !p.is_empty() && lower.contains(&p))
            })
            .map(|rule| rule.name.as_str())
            .collect()
    }

    /// Group columns by category, preserving column order within each group.
    pub fn categorize(&self, columns: &[String]) -> BTreeMap<String, Vec<String>> {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for column in columns {
            let cats = self.categories_of(column);
            if cats.is_empty() {
                out.entry(OTHER_CATEGORY.to_string()).or_default().push(column.clone());
            }
            for cat in cats {
                out.entry(cat.to_string()).or_default().push(column.clone());
            }
        }
        out
    }
}
