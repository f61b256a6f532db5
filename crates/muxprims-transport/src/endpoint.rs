use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, TransportError};
use crate::tcp::TcpTransport;
use crate::traits::Link;
#[cfg(unix)]
use crate::uds::UnixDomainSocket;

/// Where a link is bound or connected.
///
/// Parsed from `unix:PATH`, `tcp:HOST:PORT`, or a bare socket path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(TransportError::InvalidEndpoint(s.to_string()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = s.strip_prefix("tcp:") {
            match addr.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                    return Ok(Self::Tcp(addr.to_string()));
                }
                _ => return Err(TransportError::InvalidEndpoint(s.to_string())),
            }
        }
        if s.is_empty() {
            return Err(TransportError::InvalidEndpoint(s.to_string()));
        }
        Ok(Self::Unix(PathBuf::from(s)))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

impl Endpoint {
    /// Connect to this endpoint (blocking).
    pub fn connect(&self) -> Result<Link> {
        match self {
            #[cfg(unix)]
            Self::Unix(path) => UnixDomainSocket::connect(path),
            #[cfg(not(unix))]
            Self::Unix(_) => Err(TransportError::Unsupported("unix-domain-socket")),
            Self::Tcp(addr) => TcpTransport::connect(addr),
        }
    }

    /// Bind a listener on this endpoint.
    pub fn bind(&self) -> Result<Acceptor> {
        match self {
            #[cfg(unix)]
            Self::Unix(path) => Ok(Acceptor::Unix(UnixDomainSocket::bind(path)?)),
            #[cfg(not(unix))]
            Self::Unix(_) => Err(TransportError::Unsupported("unix-domain-socket")),
            Self::Tcp(addr) => Ok(Acceptor::Tcp(TcpTransport::bind(addr)?)),
        }
    }
}

/// A bound listener for any supported endpoint kind.
pub enum Acceptor {
    #[cfg(unix)]
    Unix(UnixDomainSocket),
    Tcp(TcpTransport),
}

impl Acceptor {
    /// Accept the next link (blocking).
    pub fn accept(&self) -> Result<Link> {
        match self {
            #[cfg(unix)]
            Self::Unix(socket) => socket.accept(),
            Self::Tcp(listener) => listener.accept(),
        }
    }

    /// The endpoint actually bound (resolves TCP port 0).
    pub fn local_endpoint(&self) -> Endpoint {
        match self {
            #[cfg(unix)]
            Self::Unix(socket) => Endpoint::Unix(socket.path().to_path_buf()),
            Self::Tcp(listener) => Endpoint::Tcp(listener.local_addr().to_string()),
        }
    }
}
