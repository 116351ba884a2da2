/// Connection management
///
/// Owns the single active transport of a table handle. Commands are sent
/// one at a time with `command`, or pipelined with `enqueue` + `read_queued`.
/// A transport failure drops the connection, reconnects (directly or through
/// the sentinels) and retries, at most `max_retries` times. A pipelined batch
/// is always resent whole: it may carry a MULTI/EXEC unit that must not be
/// split.
use std::time::Duration;
use tracing::{debug, info, warn};
use crate::types::{ConnectionSpec, DatabaseError};
use super::resp::{Command, Reply};
use super::sentinel::SentinelClient;
use super::transport::{Connector, TcpConnector, Transport};

pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Bound on establishing a direct connection
    pub connect_timeout: Option<Duration>,
    /// Retries after the first failed attempt
    pub max_retries: u32,
    pub sentinel: SentinelClient,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(2)),
            max_retries: DEFAULT_MAX_RETRIES,
            sentinel: SentinelClient::default(),
        }
    }
}

pub struct ConnectionManager {
    spec: ConnectionSpec,
    options: ConnectionOptions,
    connector: Box<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    state: ConnectionState,
    last_error: Option<String>,
    queued: Vec<Command>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("spec", &self.spec)
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .field("queued", &self.queued.len())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    #[must_use]
    pub fn new(spec: ConnectionSpec, options: ConnectionOptions) -> Self {
        Self::with_connector(spec, options, Box::new(TcpConnector))
    }

    #[must_use]
    pub fn with_connector(
        spec: ConnectionSpec,
        options: ConnectionOptions,
        connector: Box<dyn Connector>,
    ) -> Self {
        Self {
            spec,
            options,
            connector,
            transport: None,
            state: ConnectionState::Disconnected,
            last_error: None,
            queued: Vec::new(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// The spec in use; in sentinel mode its address list includes any
    /// sentinels learnt during discovery.
    #[must_use]
    pub const fn spec(&self) -> &ConnectionSpec {
        &self.spec
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// Drops the current transport, if any, and opens a new one.
    pub fn connect(&mut self) -> Result<(), DatabaseError> {
        self.transport = None;
        self.state = ConnectionState::Connecting;

        let result = match &mut self.spec {
            ConnectionSpec { service: Some(service), addresses } => {
                debug!(service = %service, candidates = addresses.len(), "connecting via sentinel");
                self.options.sentinel.connect(self.connector.as_ref(), addresses, service)
            }
            ConnectionSpec { service: None, addresses } => match addresses.first() {
                Some(addr) => {
                    debug!(address = %addr, "connecting");
                    self.connector.connect(addr, self.options.connect_timeout, None)
                }
                None => Err(DatabaseError::BadFormat("connection spec has no address".to_string())),
            },
        };

        match result {
            Ok(transport) => {
                self.transport = Some(transport);
                self.state = ConnectionState::Connected;
                self.last_error = None;
                info!(spec = %self.spec, "connected");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                self.last_error = Some(e.to_string());
                warn!(spec = %self.spec, error = %e, "connect failed");
                Err(e)
            }
        }
    }

    pub fn disconnect(&mut self) {
        self.transport = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Sends one command and waits for its reply. Error replies are returned
    /// as `Reply::Error`, not as failures.
    pub fn command(&mut self, cmd: Command) -> Result<Reply, DatabaseError> {
        let mut replies = self.run_with_retry(std::slice::from_ref(&cmd))?;
        replies
            .pop()
            .ok_or_else(|| DatabaseError::Protocol(format!("no reply to {}", cmd.name())))
    }

    /// Adds a command to the pipeline; nothing is sent until `read_queued`.
    pub fn enqueue(&mut self, cmd: Command) {
        self.queued.push(cmd);
    }

    /// Sends every queued command in one write and reads one reply each.
    /// The queue is emptied whether or not this succeeds.
    pub fn read_queued(&mut self) -> Result<Vec<Reply>, DatabaseError> {
        if self.queued.is_empty() {
            return Err(DatabaseError::Protocol("no queued commands to read".to_string()));
        }
        let batch = std::mem::take(&mut self.queued);
        self.run_with_retry(&batch)
    }

    /// Convenience for `enqueue` of each command followed by `read_queued`.
    pub fn pipeline(&mut self, commands: Vec<Command>) -> Result<Vec<Reply>, DatabaseError> {
        self.queued.extend(commands);
        self.read_queued()
    }

    fn run_with_retry(&mut self, batch: &[Command]) -> Result<Vec<Reply>, DatabaseError> {
        let mut last_err = None;

        for attempt in 0..=self.options.max_retries {
            if attempt > 0 {
                warn!(attempt, commands = batch.len(), "resending after transport failure");
            }
            if self.transport.is_none() {
                if let Err(e) = self.connect() {
                    if !e.is_transport() && !Self::is_discovery_failure(&e) {
                        return Err(e);
                    }
                    last_err = Some(e);
                    continue;
                }
            }

            match self.round_trip(batch) {
                Ok(replies) => return Ok(replies),
                Err(e) if e.is_transport() => {
                    self.last_error = Some(e.to_string());
                    self.disconnect();
                    last_err = Some(e);
                }
                Err(e) => {
                    // The stream is out of step with our requests; never reuse it.
                    self.last_error = Some(e.to_string());
                    self.disconnect();
                    return Err(e);
                }
            }
        }

        let reason = last_err.map_or_else(|| "unknown error".to_string(), |e| e.to_string());
        Err(DatabaseError::Connection(format!(
            "giving up after {} attempts: {reason}",
            self.options.max_retries + 1
        )))
    }

    const fn is_discovery_failure(e: &DatabaseError) -> bool {
        matches!(
            e,
            DatabaseError::SentinelUnreachable
                | DatabaseError::MasterUnknown(_)
                | DatabaseError::MasterNameUnknown(_)
                | DatabaseError::Sentinel(_)
        )
    }

    fn round_trip(&mut self, batch: &[Command]) -> Result<Vec<Reply>, DatabaseError> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| DatabaseError::Connection("not connected".to_string()))?;
        transport.send(batch)?;
        let mut replies = Vec::with_capacity(batch.len());
        for _ in batch {
            replies.push(transport.receive()?);
        }
        Ok(replies)
    }
}
