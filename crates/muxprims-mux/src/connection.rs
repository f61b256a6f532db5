use muxprims_transport::Link;
use tracing::{debug, info};

use crate::config::MuxConfig;
use crate::demux::{Demultiplexer, InputChannel};
use crate::error::Result;
use crate::mux::{Multiplexer, OutputChannel};

/// Both directions of one multiplexed link.
///
/// The link is split into a read half feeding a [`Demultiplexer`] and a write
/// half behind a [`Multiplexer`]. Output and input channel ids are
/// independent: output channel 3 and input channel 3 are different streams.
pub struct Connection {
    mux: Multiplexer,
    demux: Demultiplexer,
    link: Link,
    peer: String,
}

impl Connection {
    /// Wrap a connected link.
    pub fn new(link: Link, config: MuxConfig) -> Result<Self> {
        config.validate()?;
        link.set_read_timeout(config.read_timeout)?;
        link.set_write_timeout(config.write_timeout)?;

        let reader = link.try_clone()?;
        let writer = link.try_clone()?;
        let peer = link.peer_label();

        let demux = Demultiplexer::new(reader, &config)?;
        let mux = Multiplexer::new(writer, &config)?;
        debug!(
            peer = %peer,
            transport = link.transport_name(),
            frame_size = config.frame_size,
            "connection established"
        );

        Ok(Self {
            mux,
            demux,
            link,
            peer,
        })
    }

    /// Open (or reuse) output channel `id`, announcing it to the peer.
    pub fn open_output(&self, id: u16) -> Result<OutputChannel> {
        self.mux.open_channel(id)
    }

    /// Open (or reuse) input channel `id`.
    pub fn open_input(&self, id: u16) -> Result<InputChannel> {
        self.demux.open_channel(id)
    }

    pub fn multiplexer(&self) -> &Multiplexer {
        &self.mux
    }

    pub fn demultiplexer(&self) -> &Demultiplexer {
        &self.demux
    }

    /// Description of the remote end.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// A handle that can tear the connection down from another thread,
    /// e.g. a signal handler.
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle> {
        Ok(ShutdownHandle {
            link: self.link.try_clone()?,
            demux: self.demux.clone(),
        })
    }

    /// Flush pending output, then shut the link down.
    ///
    /// Blocked readers wake up with EOF. Output channels that were not closed
    /// are not announced as closed; the peer sees the physical EOF instead.
    pub fn close(&self) -> Result<()> {
        let flushed = self.mux.flush();
        self.link.shutdown()?;
        self.demux.shutdown();
        info!(peer = %self.peer, "connection closed");
        flushed
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("transport", &self.link.transport_name())
            .finish()
    }
}

/// Tears down a [`Connection`] without borrowing it.
#[derive(Debug)]
pub struct ShutdownHandle {
    link: Link,
    demux: Demultiplexer,
}

impl ShutdownHandle {
    /// Shut the link down and end every input channel.
    pub fn shutdown(&self) -> Result<()> {
        self.link.shutdown()?;
        self.demux.shutdown();
        Ok(())
    }
}
