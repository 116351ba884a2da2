// Storage module - table rows and value indexes in the key-value store

pub mod scripts;
mod table_store;
pub mod transaction;

pub use table_store::TableStore;
pub use transaction::{Ack, Outcome, TransactionBatch};

use crate::types::DatabaseError;

/// Parses a rowid member read back from the store.
pub(crate) fn parse_rowid(raw: &str) -> Result<i64, DatabaseError> {
    raw.parse()
        .map_err(|_| DatabaseError::Protocol(format!("invalid rowid '{raw}' in index")))
}
