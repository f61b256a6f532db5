use std::net::{SocketAddr, TcpListener, TcpStream};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::Link;

/// TCP transport.
///
/// Links are created with `TCP_NODELAY` set: frames are small and the
/// multiplexor flushes explicitly, so Nagle's delay only adds latency.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on `addr` (e.g. `127.0.0.1:7000`; port 0 picks a free port).
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|e| TransportError::Bind {
            endpoint: format!("tcp:{addr}"),
            source: e,
        })?;
        let local_addr = listener.local_addr()?;

        info!(%local_addr, "listening on tcp");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming link (blocking).
    pub fn accept(&self) -> Result<Link> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        debug!(%peer, "accepted tcp link");
        Ok(Link::from_tcp(stream))
    }

    /// Connect to a listening TCP endpoint (blocking).
    pub fn connect(addr: &str) -> Result<Link> {
        let stream = TcpStream::connect(addr).map_err(|e| TransportError::Connect {
            endpoint: format!("tcp:{addr}"),
            source: e,
        })?;
        stream.set_nodelay(true)?;
        debug!(addr, "connected over tcp");
        Ok(Link::from_tcp(stream))
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
