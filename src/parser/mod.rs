// Module declarations
mod common;
mod column;
mod connection;
mod predicate;

pub use column::{parse_column, parse_columns};
pub use connection::parse_connection_spec;
pub use predicate::{parse_predicates, Predicate};
