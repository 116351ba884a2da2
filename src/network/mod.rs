// Network module - RESP codec, transports, sentinel discovery and the
// retrying connection manager

pub mod connection;
pub mod resp;
pub mod sentinel;
pub mod transport;

pub use connection::{ConnectionManager, ConnectionOptions, ConnectionState, DEFAULT_MAX_RETRIES};
pub use resp::{Command, Reply};
pub use sentinel::{MasterLookup, SentinelClient, DEFAULT_PROBE_TIMEOUT};
pub use transport::{Connector, TcpConnector, TcpTransport, Transport};
