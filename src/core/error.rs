use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Bad format: {0}")]
    BadFormat(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("No sentinel reachable")]
    SentinelUnreachable,
    #[error("Sentinels do not know master name '{0}'")]
    MasterNameUnknown(String),
    #[error("Sentinels do not know the current master for '{0}'")]
    MasterUnknown(String),
    #[error("Sentinel error: {0}")]
    Sentinel(String),
    #[error("Transaction conflict on row {rowid}: row changed concurrently")]
    TransactionConflict { rowid: i64 },
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Wrong number of values: expected {expected}, got {got}")]
    WrongArity { expected: usize, got: usize },
    #[error("Server error: {0}")]
    Server(String),
    #[error("Column '{0}' not found")]
    ColumnNotFound(String),
    #[error("Column '{0}' is not indexed")]
    NotIndexed(String),
    #[error("Row {0} not found")]
    RowNotFound(i64),
    #[error("Refusing to store a row with every value NULL")]
    EmptyRow,
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("JSON Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatabaseError {
    /// Transport-level failures are the only ones worth a reconnect.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Connection(_))
    }
}
