use serde::{Deserialize, Serialize};
use super::value::Value;

/// A materialized row: its rowid plus one value per declared column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Row {
    pub rowid: i64,
    pub values: Vec<Value>,
}

impl Row {
    #[must_use]
    pub const fn new(rowid: i64, values: Vec<Value>) -> Self {
        Self { rowid, values }
    }

    /// A row whose hash vanished between planning and reading.
    #[must_use]
    pub fn all_null(rowid: i64, width: usize) -> Self {
        Self {
            rowid,
            values: vec![Value::Null; width],
        }
    }

    #[must_use]
    pub fn is_all_null(&self) -> bool {
        self.values.iter().all(Value::is_null)
    }
}
