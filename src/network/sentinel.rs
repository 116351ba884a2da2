/// Sentinel discovery
///
/// Walks the candidate sentinels in order, asks each one for the current
/// master of the service, and connects to the first master that answers.
/// A sentinel that answers also reports its sibling sentinels, which are
/// appended to the candidate list so later connects know about nodes added
/// after the table was opened.
use std::time::Duration;
use tracing::{debug, info, warn};
use crate::types::{Address, DatabaseError};
use super::resp::{Command, Reply};
use super::transport::{Connector, Transport};

/// Timeout for each sentinel probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// Error prefix a sentinel uses when it cannot tell who the master is
const IDONTKNOW: &str = "IDONTKNOW";

/// What one sentinel said about the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterLookup {
    Found(Address),
    NameUnknown,
    MasterUnknown,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SentinelClient {
    pub probe_timeout: Duration,
    /// Port assumed for a master address reported without one
    pub redis_port: u16,
    /// Port assumed for a sibling sentinel reported without one
    pub sentinel_port: u16,
    /// Bound on connecting to the reported master
    pub master_connect_timeout: Option<Duration>,
}

impl Default for SentinelClient {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            redis_port: crate::types::DEFAULT_REDIS_PORT,
            sentinel_port: crate::types::DEFAULT_SENTINEL_PORT,
            master_connect_timeout: None,
        }
    }
}

impl SentinelClient {
    /// Connects to the master of `service`.
    ///
    /// Failures are reported in priority order: no sentinel reachable, then
    /// some sentinel not knowing the current master, then the name being
    /// unknown, then a generic error.
    pub fn connect(
        &self,
        connector: &dyn Connector,
        candidates: &mut Vec<Address>,
        service: &str,
    ) -> Result<Box<dyn Transport>, DatabaseError> {
        let mut reached = 0usize;
        let mut name_unknown = 0usize;
        let mut master_unknown = 0usize;
        let mut last_error = None;

        // The list can grow while we walk it; newly learnt sentinels are tried too.
        let mut i = 0;
        while i < candidates.len() {
            let sentinel = candidates[i].clone();
            i += 1;

            let mut probe = match connector.connect(
                &sentinel,
                Some(self.probe_timeout),
                Some(self.probe_timeout),
            ) {
                Ok(t) => t,
                Err(e) => {
                    debug!(sentinel = %sentinel, error = %e, "sentinel unreachable");
                    continue;
                }
            };
            reached += 1;

            let master = match self.master_address(probe.as_mut(), service) {
                MasterLookup::Found(addr) => addr,
                MasterLookup::NameUnknown => {
                    debug!(sentinel = %sentinel, service, "sentinel does not know service");
                    name_unknown += 1;
                    continue;
                }
                MasterLookup::MasterUnknown => {
                    debug!(sentinel = %sentinel, service, "sentinel does not know current master");
                    master_unknown += 1;
                    continue;
                }
                MasterLookup::Failed(e) => {
                    debug!(sentinel = %sentinel, error = %e, "sentinel lookup failed");
                    last_error = Some(e);
                    continue;
                }
            };

            let added = self.refresh_sentinels(probe.as_mut(), service, candidates);
            if added > 0 {
                info!(sentinel = %sentinel, added, "learnt new sentinels");
            }
            drop(probe);

            match connector.connect(&master, self.master_connect_timeout, None) {
                Ok(transport) => {
                    info!(service, master = %master, via = %sentinel, "connected to master");
                    return Ok(transport);
                }
                Err(e) => {
                    warn!(service, master = %master, error = %e, "reported master unreachable");
                    last_error = Some(e.to_string());
                }
            }
        }

        if reached == 0 {
            Err(DatabaseError::SentinelUnreachable)
        } else if master_unknown > 0 {
            Err(DatabaseError::MasterUnknown(service.to_string()))
        } else if name_unknown > 0 {
            Err(DatabaseError::MasterNameUnknown(service.to_string()))
        } else {
            Err(DatabaseError::Sentinel(
                last_error.unwrap_or_else(|| format!("no master found for '{service}'")),
            ))
        }
    }

    /// Asks one sentinel for the master address.
    pub fn master_address(&self, probe: &mut dyn Transport, service: &str) -> MasterLookup {
        let cmd = Command::new("SENTINEL").arg("get-master-addr-by-name").arg(service);
        let reply = match probe.send(std::slice::from_ref(&cmd)).and_then(|()| probe.receive()) {
            Ok(r) => r,
            Err(e) => return MasterLookup::Failed(e.to_string()),
        };
        self.classify_master_reply(reply)
    }

    fn classify_master_reply(&self, reply: Reply) -> MasterLookup {
        match reply {
            // Redis answers [ip, port]
            Reply::Array(parts) => match parts.as_slice() {
                [Reply::Bulk(host), Reply::Bulk(port)] => {
                    match Address::parse(&format!("{host}:{port}"), self.redis_port) {
                        Ok(addr) => MasterLookup::Found(addr),
                        Err(e) => MasterLookup::Failed(e.to_string()),
                    }
                }
                _ => MasterLookup::Failed(format!("unexpected master address reply {parts:?}")),
            },
            Reply::Bulk(spec) | Reply::Status(spec) => match Address::parse(&spec, self.redis_port) {
                Ok(addr) => MasterLookup::Found(addr),
                Err(e) => MasterLookup::Failed(e.to_string()),
            },
            Reply::Nil => MasterLookup::NameUnknown,
            Reply::Error(e) if e.starts_with(IDONTKNOW) => MasterLookup::MasterUnknown,
            other => MasterLookup::Failed(format!("unexpected master address reply {other:?}")),
        }
    }

    /// Appends sentinels the probe knows about that are not yet candidates.
    /// Returns how many were added; failures leave the list unchanged.
    pub fn refresh_sentinels(
        &self,
        probe: &mut dyn Transport,
        service: &str,
        candidates: &mut Vec<Address>,
    ) -> usize {
        let cmd = Command::new("SENTINEL").arg("sentinels").arg(service);
        let Ok(Reply::Array(entries)) =
            probe.send(std::slice::from_ref(&cmd)).and_then(|()| probe.receive())
        else {
            return 0;
        };

        let mut added = 0;
        for entry in entries {
            let Some(addr) = self.sibling_address(&entry) else {
                continue;
            };
            if !candidates.contains(&addr) {
                candidates.push(addr);
                added += 1;
            }
        }
        added
    }

    /// A sibling is either a flat `host:port` string or a field/value list
    /// holding `ip` and `port`.
    fn sibling_address(&self, entry: &Reply) -> Option<Address> {
        match entry {
            Reply::Bulk(spec) => Address::parse(spec, self.sentinel_port).ok(),
            Reply::Array(fields) => {
                let mut host = None;
                let mut port = None;
                for pair in fields.chunks(2) {
                    if let [Reply::Bulk(k), Reply::Bulk(v)] = pair {
                        match k.as_str() {
                            "ip" => host = Some(v.as_str()),
                            "port" => port = Some(v.as_str()),
                            _ => {}
                        }
                    }
                }
                match (host, port) {
                    (Some(h), Some(p)) => Address::parse(&format!("{h}:{p}"), self.sentinel_port).ok(),
                    (Some(h), None) => Address::new(h, self.sentinel_port).ok(),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}
