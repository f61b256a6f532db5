//! Physical duplex links for muxprims.
//!
//! Provides a unified interface over the connection-oriented transports a
//! multiplexor can run on:
//! - Unix domain sockets (Linux/macOS)
//! - TCP streams
//!
//! This is the lowest layer of muxprims. Everything else builds on top of
//! the [`Link`] type provided here.

pub mod endpoint;
pub mod error;
pub mod tcp;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use endpoint::{Acceptor, Endpoint};
pub use error::{Result, TransportError};
pub use tcp::TcpTransport;
pub use traits::{Link, ReadReady};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
