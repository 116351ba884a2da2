use bytes::BytesMut;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use crate::types::{Address, DatabaseError};
use super::resp::{self, Command, Reply};

const READ_CHUNK: usize = 16 * 1024;

/// A live, ordered request/reply channel to one server.
pub trait Transport: Send {
    /// Writes every command in order without waiting for replies.
    fn send(&mut self, commands: &[Command]) -> Result<(), DatabaseError>;

    /// Blocks until the next reply is available.
    fn receive(&mut self) -> Result<Reply, DatabaseError>;
}

/// Opens transports. The TCP implementation is the production one; tests
/// substitute an in-process store.
pub trait Connector: Send {
    /// `connect_timeout` bounds establishing the connection; `io_timeout`,
    /// when set, bounds every later read and write on it.
    fn connect(
        &self,
        address: &Address,
        connect_timeout: Option<Duration>,
        io_timeout: Option<Duration>,
    ) -> Result<Box<dyn Transport>, DatabaseError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(
        &self,
        address: &Address,
        connect_timeout: Option<Duration>,
        io_timeout: Option<Duration>,
    ) -> Result<Box<dyn Transport>, DatabaseError> {
        let candidates = (address.host.as_str(), address.port).to_socket_addrs()?;

        let mut last_err = None;
        for sock_addr in candidates {
            let attempt = match connect_timeout {
                Some(t) => TcpStream::connect_timeout(&sock_addr, t),
                None => TcpStream::connect(sock_addr),
            };
            match attempt {
                Ok(stream) => {
                    let transport = TcpTransport::new(stream)?;
                    transport.set_timeout(io_timeout)?;
                    return Ok(Box::new(transport));
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(DatabaseError::Connection(match last_err {
            Some(e) => format!("{address}: {e}"),
            None => format!("{address}: no addresses resolved"),
        }))
    }
}

pub struct TcpTransport {
    stream: TcpStream,
    inbound: BytesMut,
    outbound: BytesMut,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Result<Self, DatabaseError> {
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            inbound: BytesMut::with_capacity(READ_CHUNK),
            outbound: BytesMut::new(),
        })
    }

    /// Applies a read/write deadline to every subsequent operation.
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<(), DatabaseError> {
        self.stream.set_read_timeout(timeout)?;
        self.stream.set_write_timeout(timeout)?;
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, commands: &[Command]) -> Result<(), DatabaseError> {
        self.outbound.clear();
        for cmd in commands {
            cmd.encode(&mut self.outbound);
        }
        self.stream.write_all(&self.outbound)?;
        self.stream.flush()?;
        Ok(())
    }

    fn receive(&mut self) -> Result<Reply, DatabaseError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(reply) = resp::decode(&mut self.inbound)? {
                return Ok(reply);
            }
            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                return Err(DatabaseError::Connection("connection closed by server".to_string()));
            }
            self.inbound.extend_from_slice(&chunk[..n]);
        }
    }
}
