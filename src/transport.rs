//! Byte-exchange transport seam.
//!
//! The protocol stages operate on complete request and response buffers;
//! this trait is the only place the network is touched. The plain TCP
//! implementation issues one connection per exchange and reads to EOF
//! (requests carry `Connection: close`). TLS, proxies, and authentication
//! belong to wrapping transports supplied by the embedder.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;

/// Errors from the byte transport.
#[derive(Debug)]
pub enum TransportError {
    /// Could not reach the remote endpoint.
    Connect {
        host: String,
        port: u16,
        source: io::Error,
    },
    /// The exchange failed mid-flight.
    Io(io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect { host, port, .. } => write!(f, "cannot connect to {host}:{port}"),
            Self::Io(err) => write!(f, "network I/O error: {err}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connect { source, .. } => Some(source),
            Self::Io(err) => Some(err),
        }
    }
}

/// A request/response byte exchange with the remote.
///
/// Implementations return the complete raw response, headers included;
/// framing is decoded downstream. Tests substitute an in-memory transport.
pub trait Transport {
    /// Sends `request` and returns the full response bytes.
    ///
    /// # Errors
    /// `TransportError` on connection or I/O failure.
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError>;
}

/// Plain TCP transport, one connection per exchange.
#[derive(Debug)]
pub struct TcpTransport {
    host: String,
    port: u16,
}

impl TcpTransport {
    /// Creates a transport for `host:port`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Transport for TcpTransport {
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut stream =
            TcpStream::connect((self.host.as_str(), self.port)).map_err(|source| {
                TransportError::Connect {
                    host: self.host.clone(),
                    port: self.port,
                    source,
                }
            })?;
        stream.write_all(request).map_err(TransportError::Io)?;
        stream
            .shutdown(std::net::Shutdown::Write)
            .map_err(TransportError::Io)?;

        let mut response = Vec::new();
        stream
            .read_to_end(&mut response)
            .map_err(TransportError::Io)?;
        Ok(response)
    }
}
