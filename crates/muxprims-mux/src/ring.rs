//! Growable circular byte buffer.
//!
//! The demultiplexer fills one of these per input channel and the channel's
//! reader drains it. A fill never blocks and never drops bytes: when the
//! incoming data does not fit, the backing storage is reallocated to hold
//! exactly the current content plus the new bytes. Capacity never shrinks.
//!
//! The buffer itself is not synchronized; each input channel keeps it behind
//! its own mutex.

/// Initial capacity of a channel's receive buffer.
pub const INITIAL_CAPACITY: usize = 1024;

/// A circular byte buffer that grows instead of overwriting.
///
/// `read` and `write` cursors alone cannot tell an empty ring from a full one
/// (both have `read == write`), so `full` disambiguates.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    data: Vec<u8>,
    read: usize,
    write: usize,
    full: bool,
}

impl RingBuffer {
    /// Create an empty buffer with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            read: 0,
            write: 0,
            full: false,
        }
    }

    /// Bytes stored and not yet read.
    pub fn len(&self) -> usize {
        if self.full {
            self.data.len()
        } else if self.write >= self.read {
            self.write - self.read
        } else {
            self.data.len() - self.read + self.write
        }
    }

    /// True when there is nothing to read.
    pub fn is_empty(&self) -> bool {
        !self.full && self.read == self.write
    }

    /// True when a fill of any size would reallocate.
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Current size of the backing storage.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes that can be filled without reallocating.
    pub fn free_space(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Append `src`, growing the storage if it does not fit.
    pub fn fill(&mut self, src: &[u8]) {
        if src.is_empty() {
            return;
        }
        if src.len() > self.free_space() {
            self.grow(self.len() + src.len());
        }

        let cap = self.data.len();
        let first = src.len().min(cap - self.write);
        self.data[self.write..self.write + first].copy_from_slice(&src[..first]);
        let rest = src.len() - first;
        self.data[..rest].copy_from_slice(&src[first..]);

        self.write = (self.write + src.len()) % cap;
        self.full = self.write == self.read;
    }

    /// Remove and return one byte, or `None` if empty.
    pub fn get(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.data[self.read];
        self.read = (self.read + 1) % self.data.len();
        self.full = false;
        Some(byte)
    }

    /// Remove up to `dst.len()` bytes into `dst`.
    ///
    /// Returns `None` if the buffer is empty, otherwise the number of bytes
    /// copied (zero only when `dst` is empty).
    pub fn get_into(&mut self, dst: &mut [u8]) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let n = self.copy_out(dst);
        self.read = (self.read + n) % self.data.len();
        if n > 0 {
            self.full = false;
        }
        Some(n)
    }

    /// Drop all content, keeping the storage.
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.full = false;
    }

    /// Copy the oldest `min(len, dst.len())` bytes into `dst` without consuming.
    fn copy_out(&self, dst: &mut [u8]) -> usize {
        let n = self.len().min(dst.len());
        let first = n.min(self.data.len() - self.read);
        dst[..first].copy_from_slice(&self.data[self.read..self.read + first]);
        dst[first..n].copy_from_slice(&self.data[..n - first]);
        n
    }

    fn grow(&mut self, capacity: usize) {
        let len = self.len();
        let mut data = vec![0; capacity];
        self.copy_out(&mut data[..len]);
        self.data = data;
        self.read = 0;
        self.write = len;
        self.full = false;
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }
}
