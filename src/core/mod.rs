// Module declarations
pub mod error;
pub mod address;
pub mod value;
pub mod data_type;
pub mod column;
pub mod row;
pub mod keys;
pub mod connection_spec;

// Re-exports for convenience
pub use error::DatabaseError;
pub use address::{Address, DEFAULT_REDIS_PORT, DEFAULT_SENTINEL_PORT};
pub use value::Value;
pub use data_type::DataType;
pub use column::ColumnSpec;
pub use row::Row;
pub use keys::KeySpace;
pub use connection_spec::ConnectionSpec;
