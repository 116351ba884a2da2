use serde::{Deserialize, Serialize};

/// Type affinity of a column. Every value is stored as a string in the
/// row hash; the affinity decides how it is read back and how it is scored
/// in a value index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DataType {
    Integer,
    Float,
    #[default]
    Text,
}

impl DataType {
    /// Maps a declared type keyword onto an affinity, case-insensitively.
    ///
    /// `INT*` is Integer, `CHAR*`, `CLOB` and `TEXT` are Text, `REAL`,
    /// `FLOA*` and `DOUB*` are Float. Anything else is `None`.
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let upper = keyword.to_ascii_uppercase();
        if upper.starts_with("INT") {
            Some(Self::Integer)
        } else if upper.starts_with("CHAR") || upper == "CLOB" || upper == "TEXT" {
            Some(Self::Text)
        } else if upper == "REAL" || upper.starts_with("FLOA") || upper.starts_with("DOUB") {
            Some(Self::Float)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::Text => "TEXT",
        }
    }
}
