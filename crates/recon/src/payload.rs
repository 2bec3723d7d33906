use geofuse_core::{Table, Value};

use crate::error::FusionError;

/// Shapes an analysis result can arrive in.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultPayload {
    Table(Table),
    /// Unit name → score.
    KeyedScalars(Vec<(String, Value)>),
    /// Unit names ordered best first.
    ScalarList(Vec<Value>),
}

impl ResultPayload {
    /// Normalize every variant into a table.
    ///
    /// `KeyedScalars` becomes `name, score`; `ScalarList` becomes
    /// `name, rank` with rank = position + 1.
    pub fn into_table(self) -> Table {
        match self {
            ResultPayload::Table(t) => t,
            ResultPayload::KeyedScalars(pairs) => {
                let mut t = Table::new(vec!["name".into(), "score".into()]);
                for (key, value) in pairs {
                    t.push_row(vec![Value::Text(key), value]);
                }
                t
            }
            ResultPayload::ScalarList(items) => {
                let mut t = Table::new(vec!["name".into(), "rank".into()]);
                for (i, item) in items.into_iter().enumerate() {
                    t.push_row(vec![item, Value::Int(i as i64 + 1)]);
                }
                t
            }
        }
    }

    /// Interpret a JSON document.
    ///
    /// Object → `KeyedScalars`, array of scalars → `ScalarList`, array of
    /// objects → `Table` (columns in first-seen key order).
    pub fn from_json(value: &serde_json::Value) -> Result<Self, FusionError> {
        match value {
            serde_json::Value::Object(map) => Ok(ResultPayload::KeyedScalars(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            )),
            serde_json::Value::Array(items) if items.iter().all(|v| v.is_object()) && !items.is_empty() => {
                let mut columns: Vec<String> = Vec::new();
                for item in items {
                    if let Some(obj) = item.as_object() {
                        for key in obj.keys() {
                            if !columns.contains(key) {
                                columns.push(key.clone());
                            }
                        }
                    }
                }
                let mut table = Table::new(columns.clone());
                for item in items {
                    let row = columns
                        .iter()
                        .map(|c| item.get(c).map(Value::from_json).unwrap_or(Value::Null))
                        .collect();
                    table.push_row(row);
                }
                Ok(ResultPayload::Table(table))
            }
            serde_json::Value::Array(items) => {
                if items.iter().any(|v| v.is_object() || v.is_array()) {
                    return Err(FusionError::Parse(
                        "result array mixes objects and scalars".into(),
                    ));
                }
                Ok(ResultPayload::ScalarList(items.iter().map(Value::from_json).collect()))
            }
            other => Err(FusionError::Parse(format!(
                "result payload must be an object or array, got {}",
                json_kind(other)
            ))),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// One analysis method's output.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    /// Method name, e.g. `composite`; used for column prefixes and provenance.
    pub method: String,
    pub payload: ResultPayload,
    /// Where it was loaded from, for logs.
    pub origin: Option<String>,
}

impl ResultTable {
    pub fn new(method: impl Into<String>, payload: ResultPayload) -> Self {
        Self {
            method: method.into(),
            payload,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keyed_scalars_to_table() {
        let t = ResultPayload::KeyedScalars(vec![("Kawo".into(), Value::Float(0.8))]).into_table();
        assert_eq!(t.columns, vec!["name", "score"]);
        assert_eq!(t.rows[0], vec![Value::Text("Kawo".into()), Value::Float(0.8)]);
    }

    #[test]
    fn scalar_list_ranks_by_position() {
        let t = ResultPayload::ScalarList(vec![Value::from("Kawo"), Value::from("Gwale")]).into_table();
        assert_eq!(t.columns, vec!["name", "rank"]);
        assert_eq!(t.get(1, 1), &Value::Int(2));
    }

    #[test]
    fn json_shapes() {
        let obj = ResultPayload::from_json(&json!({"Kawo": 0.5, "Gwale": "0.25"})).unwrap();
        assert!(matches!(obj, ResultPayload::KeyedScalars(ref p) if p.len() == 2));

        let list = ResultPayload::from_json(&json!(["Kawo", "Gwale"])).unwrap();
        assert!(matches!(list, ResultPayload::ScalarList(ref v) if v.len() == 2));

        let rows = ResultPayload::from_json(&json!([
            {"ward": "Kawo", "rank": 1},
            {"ward": "Gwale", "score": 0.2}
        ]))
        .unwrap();
        let ResultPayload::Table(t) = rows else {
            panic!("expected table");
        };
        assert_eq!(t.columns, vec!["ward", "rank", "score"]);
        assert_eq!(t.get(1, 1), &Value::Null);
    }

    #[test]
    fn json_rejects_scalars_and_mixed_arrays() {
        assert!(ResultPayload::from_json(&json!(3)).is_err());
        assert!(ResultPayload::from_json(&json!(["a", {"b": 1}])).is_err());
    }
}
