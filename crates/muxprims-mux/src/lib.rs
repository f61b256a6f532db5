//! Many logical byte streams over one duplex link.
//!
//! A [`Multiplexer`] turns writes on numbered output channels into frames on
//! the physical output; a [`Demultiplexer`] pumps frames off the physical
//! input into per-channel buffers. [`Connection`] pairs the two over one
//! [`Link`](muxprims_transport::Link).

pub mod config;
pub mod connection;
pub mod connector;
pub mod demux;
pub mod error;
pub mod listener;
pub mod mux;
pub mod ring;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use config::{MuxConfig, DEFAULT_PUMP_WAIT};
pub use connection::{Connection, ShutdownHandle};
pub use connector::connect;
pub use demux::{Demultiplexer, InputChannel, PhysicalInput};
pub use error::{MuxError, Result};
pub use listener::Listener;
pub use mux::{Multiplexer, OutputChannel};
pub use ring::RingBuffer;

/// Lock a mutex, recovering the guard if another thread panicked while
/// holding it. Every critical section here leaves its data consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
