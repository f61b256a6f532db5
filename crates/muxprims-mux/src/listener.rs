use std::sync::atomic::{AtomicU64, Ordering};

use muxprims_transport::{Acceptor, Endpoint};
use tracing::info;

use crate::config::MuxConfig;
use crate::connection::Connection;
use crate::error::Result;

/// Accepts links on an endpoint and wraps each in a [`Connection`].
pub struct Listener {
    acceptor: Acceptor,
    config: MuxConfig,
    accepted: AtomicU64,
}

impl Listener {
    /// Bind to `endpoint`. Every accepted connection uses `config`.
    pub fn bind(endpoint: &Endpoint, config: MuxConfig) -> Result<Self> {
        config.validate()?;
        let acceptor = endpoint.bind()?;
        info!(endpoint = %acceptor.local_endpoint(), "listening");
        Ok(Self {
            acceptor,
            config,
            accepted: AtomicU64::new(0),
        })
    }

    /// Accept the next connection (blocking).
    pub fn accept(&self) -> Result<Connection> {
        let link = self.acceptor.accept()?;
        let n = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        info!(connection = n, peer = %link.peer_label(), "accepted connection");
        Connection::new(link, self.config.clone())
    }

    /// The endpoint actually bound; resolves TCP port 0.
    pub fn local_endpoint(&self) -> Endpoint {
        self.acceptor.local_endpoint()
    }

    /// Number of connections accepted so far.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}
