//! Many logical byte streams over one duplex link.
//!
//! # Crate Structure
//!
//! - [`transport`]: the physical link (Unix domain sockets, TCP) and endpoints
//! - [`frame`]: the wire format, admin commands and blocking frame I/O
//! - [`mux`]: multiplexer, demultiplexer and the connection façade (behind `mux` feature)

/// Re-export transport types.
pub mod transport {
    pub use muxprims_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use muxprims_frame::*;
}

/// Re-export multiplexing types (requires `mux` feature).
#[cfg(feature = "mux")]
pub mod mux {
    pub use muxprims_mux::*;
}
