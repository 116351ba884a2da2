use serde::{Deserialize, Serialize};
use super::error::DatabaseError;

/// Longest host name accepted (DNS names top out at 253 characters)
pub const MAX_HOST_LEN: usize = 255;

/// Default port of a Redis server
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Default port of a Redis sentinel
pub const DEFAULT_SENTINEL_PORT: u16 = 26379;

/// A `host:port` pair. No name resolution happens here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(host: &str, port: u16) -> Result<Self, DatabaseError> {
        if host.len() > MAX_HOST_LEN {
            return Err(DatabaseError::BadFormat(format!(
                "host name longer than {MAX_HOST_LEN} characters"
            )));
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Parses `host` or `host:port`.
    ///
    /// The port is read as base 10 ("080" is 80) and must be a positive
    /// integer within `u16` range with nothing trailing it.
    pub fn parse(spec: &str, default_port: u16) -> Result<Self, DatabaseError> {
        let Some((host, port)) = spec.split_once(':') else {
            return Self::new(spec, default_port);
        };

        if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DatabaseError::BadFormat(format!("invalid port in '{spec}'")));
        }
        let port = match port.parse::<u16>() {
            Ok(0) | Err(_) => {
                return Err(DatabaseError::BadFormat(format!("port out of range in '{spec}'")));
            }
            Ok(p) => p,
        };

        Self::new(host, port)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
