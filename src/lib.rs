// redtable - relational tables stored in Redis
// Rows are hashes; rowid and value indexes are sets and sorted sets

// Pedantic lints this crate knowingly trips: rowids and scores convert
// between i64 and f64, and error docs would repeat DatabaseError variants
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::type_complexity)]

// Core types (errors, addresses, values, key layout)
pub mod core;

// Flat view of the core types, imported crate-wide as `crate::types::...`
pub mod types {
    pub use crate::core::*;
}

// Parsers (column definitions, connection specs, predicates)
pub mod parser;

// Network (RESP codec, transports, sentinel discovery, reconnecting manager)
pub mod network;

// Storage layer (table rows, index maintenance, transactions)
pub mod storage;

// Query side (access path planning, cursors)
pub mod executor;

// Layered configuration (file, environment)
pub mod config;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types for convenience
pub use crate::core::{Address, ColumnSpec, ConnectionSpec, DataType, DatabaseError, KeySpace, Row, Value};
pub use parser::{parse_column, parse_columns, parse_connection_spec, parse_predicates, Predicate};
pub use network::{ConnectionManager, ConnectionOptions, SentinelClient};
pub use storage::TableStore;
pub use executor::{AccessPath, Constraint, Cursor, Operator, QueryPlan, QueryPlanner, QueryRunner, Target};
pub use crate::config::RedtableConfig;
