//! Scalar cell values and per-column type inference

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Cell contents treated as missing values when reading delimited text.
pub const NULL_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Type of a single column within one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    Integer,
    Float,
    Text,
}

impl ColumnType {
    /// Infer the narrowest type able to hold every non-null cell.
    ///
    /// Columns with no non-null cells are `Text`. Integers mixed with floats
    /// widen to `Float`; any other mix widens to `Text`.
    pub fn infer<'a>(cells: impl IntoIterator<Item = &'a str>) -> Self {
        let mut inferred: Option<ColumnType> = None;

        for cell in cells {
            let cell = cell.trim();
            if is_null_marker(cell) {
                continue;
            }

            let cell_type = classify(cell);
            inferred = Some(match inferred {
                None => cell_type,
                Some(current) => current.widen(cell_type),
            });

            if inferred == Some(ColumnType::Text) {
                break;
            }
        }

        inferred.unwrap_or(ColumnType::Text)
    }

    fn widen(self, other: ColumnType) -> ColumnType {
        use ColumnType::*;

        match (self, other) {
            (a, b) if a == b => a,
            (Integer, Float) | (Float, Integer) => Float,
            _ => Text,
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Boolean => write!(f, "boolean"),
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::Text => write!(f, "text"),
        }
    }
}

/// A scalar cell value
///
/// Equality and hashing are structural so values can be used as
/// deduplication keys: floats compare by bit pattern (with `-0.0` folded
/// into `0.0`) and `Null` equals `Null`.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Parse a raw cell as the given column type.
    ///
    /// The column type must come from [`ColumnType::infer`] over the same
    /// cells; a cell that does not fit falls back to `Text`.
    pub fn parse(raw: &str, column_type: ColumnType) -> Value {
        let trimmed = raw.trim();
        if is_null_marker(trimmed) {
            return Value::Null;
        }

        match column_type {
            ColumnType::Boolean => parse_bool(trimmed)
                .map(Value::Bool)
                .unwrap_or_else(|| Value::Text(raw.to_string())),
            ColumnType::Integer => trimmed
                .parse::<i64>()
                .map(Value::Int)
                .unwrap_or_else(|_| Value::Text(raw.to_string())),
            ColumnType::Float => trimmed
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or_else(|_| Value::Text(raw.to_string())),
            ColumnType::Text => Value::Text(raw.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short type label used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
        }
    }

    /// Convert to a JSON value (for summaries and test assertions)
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    fn float_bits(f: f64) -> u64 {
        if f == 0.0 { 0.0f64.to_bits() } else { f.to_bits() }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => Self::float_bits(*a) == Self::float_bits(*b),
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => Self::float_bits(*f).hash(state),
            Value::Text(s) => s.hash(state),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
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

fn is_null_marker(cell: &str) -> bool {
    NULL_MARKERS.contains(&cell)
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

fn classify(cell: &str) -> ColumnType {
    if parse_bool(cell).is_some() {
        ColumnType::Boolean
    } else if cell.parse::<i64>().is_ok() {
        ColumnType::Integer
    } else if cell.parse::<f64>().is_ok() {
        ColumnType::Float
    } else {
        ColumnType::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_infer_integer_column() {
        assert_eq!(ColumnType::infer(["1", "2", "-3"]), ColumnType::Integer);
    }

    #[test]
    fn test_infer_widens_integer_to_float() {
        assert_eq!(ColumnType::infer(["1", "2.5"]), ColumnType::Float);
    }

    #[test]
    fn test_infer_mixed_falls_back_to_text() {
        assert_eq!(ColumnType::infer(["1", "abc"]), ColumnType::Text);
        assert_eq!(ColumnType::infer(["true", "1"]), ColumnType::Text);
    }

    #[test]
    fn test_infer_ignores_nulls() {
        assert_eq!(ColumnType::infer(["", "NA", "7"]), ColumnType::Integer);
        assert_eq!(ColumnType::infer(["", "NULL"]), ColumnType::Text);
        assert_eq!(ColumnType::infer(Vec::<&str>::new()), ColumnType::Text);
    }

    #[test]
    fn test_parse_keeps_text_verbatim() {
        assert_eq!(Value::parse("007", ColumnType::Text), Value::Text("007".to_string()));
        assert_eq!(Value::parse("007", ColumnType::Integer), Value::Int(7));
    }

    #[test]
    fn test_parse_null_markers() {
        for marker in NULL_MARKERS {
            assert!(Value::parse(marker, ColumnType::Integer).is_null());
        }
        assert!(Value::parse("  ", ColumnType::Text).is_null());
    }

    #[test]
    fn test_spreadsheet_null_tokens() {
        for token in ["<NA>", "n/a", "#NA", "-NaN", "-nan", "1.#IND", "-1.#QNAN", "#N/A N/A"] {
            assert!(Value::parse(token, ColumnType::Text).is_null(), "{}", token);
        }
        assert_eq!(ColumnType::infer(["1.#QNAN", "2.5", "<NA>"]), ColumnType::Float);
        assert!(!Value::parse("n/a/b", ColumnType::Text).is_null());
    }

    #[test]
    fn test_parse_booleans() {
        assert_eq!(Value::parse("True", ColumnType::Boolean), Value::Bool(true));
        assert_eq!(Value::parse("FALSE", ColumnType::Boolean), Value::Bool(false));
    }

    #[test]
    fn test_value_equality_for_keys() {
        assert_eq!(Value::Null, Value::Null);
        assert_eq!(Value::Float(0.0), Value::Float(-0.0));
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(1), Value::Text("1".to_string()));

        let mut set = HashSet::new();
        set.insert(vec![Value::Float(-0.0), Value::Null]);
        assert!(set.contains(&vec![Value::Float(0.0), Value::Null]));
    }
}
