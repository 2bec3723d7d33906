use std::fmt;

use serde::{Deserialize, Serialize};

/// A single typed cell.
///
/// Delimited-text inputs arrive as strings; [`Value::infer`] assigns the
/// narrowest type that round-trips the text without losing information
/// (codes with leading zeros stay text).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Tokens treated as missing data, compared case-insensitively.
const NULL_TOKENS: &[&str] = &["na", "n/a", "nan", "null", "none", "#n/a", "-"];

impl Value {
    /// Infer a typed value from raw delimited-text input.
    pub fn infer(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }

        let lower = trimmed.to_ascii_lowercase();
        if NULL_TOKENS.contains(&lower.as_str()) {
            return Value::Null;
        }
        match lower.as_str() {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }

        if let Some(digits) = strip_grouping(trimmed) {
            if let Some(i) = parse_int(&digits) {
                return Value::Int(i);
            }
            if let Some(f) = parse_float(&digits) {
                return Value::Float(f);
            }
        }

        Value::Text(trimmed.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view. Text is parsed leniently so ranks stored as strings still compare.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if f.is_finite() => Some(*f),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    /// Convert a JSON scalar. Arrays and objects are kept as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::infer(s),
            other => Value::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// ---------------------------------------------------------------------------
// Number parsing
// ---------------------------------------------------------------------------

/// Remove thousands separators when they are well-formed (`1,234,567`).
/// Returns None when commas appear in any other arrangement.
fn strip_grouping(s: &str) -> Option<String> {
    if !s.contains(',') {
        return Some(s.to_string());
    }

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (s, None),
    };
    let unsigned = int_part.strip_prefix(['-', '+']).unwrap_or(int_part);
    let groups: Vec<&str> = unsigned.split(',').collect();
    let first_ok = !groups[0].is_empty() && groups[0].len() <= 3;
    let rest_ok = groups[1..].iter().all(|g| g.len() == 3);
    if !first_ok || !rest_ok || frac_part.is_some_and(|f| f.contains(',')) {
        return None;
    }

    Some(s.replace(',', ""))
}

fn parse_int(s: &str) -> Option<i64> {
    let unsigned = s.strip_prefix(['-', '+']).unwrap_or(s);
    if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Leading zeros mark identifiers ("007"), not quantities.
    if unsigned.len() > 1 && unsigned.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

fn parse_float(s: &str) -> Option<f64> {
    let unsigned = s.strip_prefix(['-', '+']).unwrap_or(s);
    if unsigned.is_empty()
        || !unsigned.bytes().any(|b| b.is_ascii_digit())
        || !unsigned
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'-' | b'+'))
    {
        return None;
    }
    if unsigned.len() > 1 && unsigned.starts_with('0') && !unsigned.starts_with("0.") {
        return None;
    }
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_scalars() {
        assert_eq!(Value::infer("42"), Value::Int(42));
        assert_eq!(Value::infer("-7"), Value::Int(-7));
        assert_eq!(Value::infer("3.25"), Value::Float(3.25));
        assert_eq!(Value::infer("TRUE"), Value::Bool(true));
        assert_eq!(Value::infer(" Kawo "), Value::Text("Kawo".into()));
    }

    #[test]
    fn infer_nulls() {
        assert_eq!(Value::infer(""), Value::Null);
        assert_eq!(Value::infer("   "), Value::Null);
        assert_eq!(Value::infer("NA"), Value::Null);
        assert_eq!(Value::infer("n/a"), Value::Null);
        assert_eq!(Value::infer("NaN"), Value::Null);
    }

    #[test]
    fn infer_keeps_identifiers_as_text() {
        assert_eq!(Value::infer("007"), Value::Text("007".into()));
        assert_eq!(Value::infer("NISKNT04"), Value::Text("NISKNT04".into()));
        assert_eq!(Value::infer("1,2"), Value::Text("1,2".into()));
        assert_eq!(Value::infer("inf"), Value::Text("inf".into()));
    }

    #[test]
    fn infer_grouped_thousands() {
        assert_eq!(Value::infer("12,345"), Value::Int(12345));
        assert_eq!(Value::infer("1,234.5"), Value::Float(1234.5));
    }

    #[test]
    fn as_f64_reads_numeric_text() {
        assert_eq!(Value::Text(" 12 ".into()).as_f64(), Some(12.0));
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::Bool(true).as_f64(), None);
        assert_eq!(Value::Null.as_f64(), None);
    }

    #[test]
    fn json_conversion() {
        assert_eq!(Value::from_json(&serde_json::json!(5)), Value::Int(5));
        assert_eq!(Value::from_json(&serde_json::json!(0.5)), Value::Float(0.5));
        assert_eq!(Value::from_json(&serde_json::json!("x")), Value::Text("x".into()));
        assert_eq!(Value::Float(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(Value::Int(2).to_json(), serde_json::json!(2));
    }

    #[test]
    fn display_is_plain() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Float(0.5).to_string(), "0.5");
        assert_eq!(Value::Text("a b".into()).to_string(), "a b");
    }
}
