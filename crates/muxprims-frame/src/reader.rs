use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{FrameDecoder, Unit};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete units (admin commands and data frames) from any `Read`
/// stream.
///
/// Handles partial reads internally: callers always get complete units.
/// Bytes read past the current unit stay buffered for the next call.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    decoder: FrameDecoder,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader for the given negotiated frame size.
    pub fn new(inner: T, frame_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            decoder: FrameDecoder::new(frame_size),
        }
    }

    /// Read the next complete unit (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached at a
    /// unit boundary and `Err(FrameError::Truncated)` when EOF cuts a unit.
    pub fn read_unit(&mut self) -> Result<Unit> {
        loop {
            if let Some(unit) = self.decoder.decode(&mut self.buf)? {
                trace!(?unit, "decoded unit");
                return Ok(unit);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if self.buf.is_empty() && self.decoder.pending_length().is_none() {
                    return Err(FrameError::ConnectionClosed);
                }
                return Err(FrameError::Truncated {
                    buffered: self.buf.len(),
                });
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Bytes read from the stream but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Negotiated frame size.
    pub fn frame_size(&self) -> usize {
        self.decoder.frame_size()
    }

    /// Update the negotiated frame size for subsequent data frames.
    pub fn set_frame_size(&mut self, frame_size: usize) {
        self.decoder.set_frame_size(frame_size);
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
