use serde::{Deserialize, Serialize};
use super::address::Address;

/// Where to find the store: a single server, or a sentinel service name plus
/// the sentinel nodes that track it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSpec {
    /// Sentinel service name; present means failover mode
    pub service: Option<String>,
    /// The server address, or the candidate sentinel addresses in order
    pub addresses: Vec<Address>,
}

impl ConnectionSpec {
    #[must_use]
    pub fn direct(address: Address) -> Self {
        Self {
            service: None,
            addresses: vec![address],
        }
    }

    #[must_use]
    pub fn sentinel(service: &str, addresses: Vec<Address>) -> Self {
        Self {
            service: Some(service.to_string()),
            addresses,
        }
    }

    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        self.service.is_some()
    }
}

impl std::fmt::Display for ConnectionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(service) = &self.service {
            write!(f, "sentinel {service}")?;
            for addr in &self.addresses {
                write!(f, " {addr}")?;
            }
            Ok(())
        } else {
            match self.addresses.first() {
                Some(addr) => write!(f, "{addr}"),
                None => Ok(()),
            }
        }
    }
}
