use serde::{Deserialize, Serialize};
use super::data_type::DataType;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// String form written into the row hash and index keys; `None` for NULL.
    #[must_use]
    pub fn to_store_string(&self) -> Option<String> {
        match self {
            Self::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Reads a stored field back according to the column affinity.
    /// Values that do not parse under the affinity stay text.
    #[must_use]
    pub fn from_store(raw: Option<String>, data_type: DataType) -> Self {
        let Some(raw) = raw else {
            return Self::Null;
        };
        match data_type {
            DataType::Integer => raw
                .parse::<i64>()
                .map(Self::Integer)
                .or_else(|_| raw.parse::<f64>().map(Self::Float))
                .unwrap_or(Self::Text(raw)),
            DataType::Float => raw.parse::<f64>().map(Self::Float).unwrap_or(Self::Text(raw)),
            DataType::Text => Self::Text(raw),
        }
    }

    /// Parses a literal typed on a command line: integers, then floats,
    /// then text. `NULL` (any case) is NULL.
    #[must_use]
    pub fn from_literal(literal: &str) -> Self {
        if literal.eq_ignore_ascii_case("null") {
            Self::Null
        } else if let Ok(i) = literal.parse::<i64>() {
            Self::Integer(i)
        } else if let Ok(f) = literal.parse::<f64>() {
            Self::Float(f)
        } else {
            Self::Text(literal.to_string())
        }
    }

    /// Score used in a sorted value index. Text columns score everything 0
    /// so members fall back to lexicographic order.
    #[must_use]
    pub fn index_score(&self, data_type: DataType) -> f64 {
        if !data_type.is_numeric() {
            return 0.0;
        }
        let score = match self {
            Self::Null => 0.0,
            Self::Integer(i) => *i as f64,
            Self::Float(f) => *f,
            Self::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        };
        if score.is_finite() { score } else { 0.0 }
    }
}

impl Value {
    /// Orders two values for predicate evaluation. Numbers compare
    /// numerically, text that parses as a number compares as one against
    /// numbers, other text compares bytewise. NULL is unordered.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<std::cmp::Ordering> {
        let number = |v: &Self| match v {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            Self::Null => None,
        };
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (a, b) => number(a)?.partial_cmp(&number(b)?),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(r) => write!(f, "{r}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}
