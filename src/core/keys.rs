/// Key layout of one table inside the store.
///
/// ```text
/// {prefix}.{db}.{table}:{rowid}            row hash (field -> value)
/// {prefix}.{db}.{table}.rowid              integer counter
/// {prefix}.{db}.{table}.index.rowid        sorted set: member=rowid, score=rowid
/// {prefix}.{db}.{table}.indices            set of indexed column names
/// {prefix}.{db}.{table}.index:{col}        sorted set: member=value, score=numeric(value) or 0
/// {prefix}.{db}.{table}.index:{col}:{val}  set of rowids holding that value
/// ```
///
/// Every name is built fresh and returned owned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    base: String,
}

impl KeySpace {
    #[must_use]
    pub fn new(prefix: &str, database: &str, table: &str) -> Self {
        Self {
            base: format!("{prefix}.{database}.{table}"),
        }
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    #[must_use]
    pub fn row(&self, rowid: i64) -> String {
        format!("{}:{rowid}", self.base)
    }

    #[must_use]
    pub fn rowid_sequence(&self) -> String {
        format!("{}.rowid", self.base)
    }

    #[must_use]
    pub fn row_index(&self) -> String {
        format!("{}.index.rowid", self.base)
    }

    #[must_use]
    pub fn index_registry(&self) -> String {
        format!("{}.indices", self.base)
    }

    #[must_use]
    pub fn value_index(&self, column: &str) -> String {
        format!("{}.index:{column}", self.base)
    }

    #[must_use]
    pub fn value_members(&self, column: &str, value: &str) -> String {
        format!("{}.index:{column}:{value}", self.base)
    }
}
