use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use muxprims_frame::{is_data_channel, AdminCommand, FrameWriter};
use tracing::debug;

use crate::config::{check_frame_size, MuxConfig};
use crate::error::{MuxError, Result};
use crate::lock;

type PhysicalOutput = Box<dyn Write + Send>;

/// Write half of a multiplexed connection.
///
/// Hands out numbered [`OutputChannel`]s and serializes their frames onto a
/// single physical output. Cheap to clone; clones share the same output and
/// channel registry.
#[derive(Clone)]
pub struct Multiplexer {
    shared: Arc<MuxShared>,
}

struct MuxShared {
    registry: Mutex<Registry>,
    /// The write critical section: every unit is emitted under this lock.
    output: Mutex<FrameWriter<PhysicalOutput>>,
}

struct Registry {
    channels: HashMap<u16, Arc<OutputSlot>>,
    frame_size: usize,
}

struct OutputSlot {
    id: u16,
    frame_size: usize,
    pending: Mutex<BytesMut>,
    closed: AtomicBool,
}

impl Multiplexer {
    /// Create a multiplexer writing to `output`.
    pub fn new<W: Write + Send + 'static>(output: W, config: &MuxConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(MuxShared {
                registry: Mutex::new(Registry {
                    channels: HashMap::new(),
                    frame_size: config.frame_size,
                }),
                output: Mutex::new(FrameWriter::new(Box::new(output))),
            }),
        })
    }

    /// Open output channel `id`, or return the already-open one.
    ///
    /// The first open emits `OpenChannel(id)` so the peer registers the
    /// channel before any of its data arrives.
    pub fn open_channel(&self, id: u16) -> Result<OutputChannel> {
        if !is_data_channel(id) {
            return Err(MuxError::ReservedChannel);
        }

        let mut registry = lock(&self.shared.registry);
        if let Some(slot) = registry.channels.get(&id) {
            return Ok(self.handle(Arc::clone(slot)));
        }

        lock(&self.shared.output).send_admin(AdminCommand::OpenChannel(id))?;

        let slot = Arc::new(OutputSlot {
            id,
            frame_size: registry.frame_size,
            pending: Mutex::new(BytesMut::with_capacity(registry.frame_size)),
            closed: AtomicBool::new(false),
        });
        registry.channels.insert(id, Arc::clone(&slot));
        debug!(channel = id, "opened output channel");

        Ok(self.handle(slot))
    }

    /// Change the frame size. Only allowed while no channel is open.
    pub fn set_frame_size(&self, frame_size: usize) -> Result<()> {
        check_frame_size(frame_size)?;
        let mut registry = lock(&self.shared.registry);
        if !registry.channels.is_empty() {
            return Err(MuxError::FrameSizeLocked {
                open: registry.channels.len(),
            });
        }
        registry.frame_size = frame_size;
        Ok(())
    }

    /// Current frame size.
    pub fn frame_size(&self) -> usize {
        lock(&self.shared.registry).frame_size
    }

    /// Ids of the open output channels, ascending.
    pub fn open_channels(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = lock(&self.shared.registry)
            .channels
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// True if output channel `id` is open.
    pub fn is_open(&self, id: u16) -> bool {
        lock(&self.shared.registry).channels.contains_key(&id)
    }

    /// Flush the physical output.
    pub fn flush(&self) -> Result<()> {
        lock(&self.shared.output).flush()?;
        Ok(())
    }

    fn handle(&self, slot: Arc<OutputSlot>) -> OutputChannel {
        OutputChannel {
            slot,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("open_channels", &self.open_channels())
            .field("frame_size", &self.frame_size())
            .finish()
    }
}

impl MuxShared {
    fn emit_full(&self, id: u16, payload: &[u8]) -> Result<()> {
        lock(&self.output).send_data(id, payload)?;
        Ok(())
    }

    fn emit_short(&self, id: u16, payload: &[u8]) -> Result<()> {
        lock(&self.output).send_short_data(id, payload)?;
        Ok(())
    }

    fn deregister(&self, slot: &Arc<OutputSlot>) -> Result<()> {
        let mut registry = lock(&self.registry);
        if registry
            .channels
            .get(&slot.id)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            registry.channels.remove(&slot.id);
        }
        lock(&self.output).send_admin(AdminCommand::CloseChannel(slot.id))?;
        debug!(channel = slot.id, "closed output channel");
        Ok(())
    }
}

/// A writable logical stream.
///
/// Bytes accumulate until a full frame is available, which is then emitted
/// immediately; [`OutputChannel::flush`] emits the remainder as a short
/// frame. Clones refer to the same channel.
#[derive(Clone)]
pub struct OutputChannel {
    slot: Arc<OutputSlot>,
    shared: Arc<MuxShared>,
}

impl OutputChannel {
    /// Channel id.
    pub fn id(&self) -> u16 {
        self.slot.id
    }

    /// True once [`close`](Self::close) has been called on any clone.
    pub fn is_closed(&self) -> bool {
        self.slot.closed.load(Ordering::Acquire)
    }

    /// Append one byte.
    pub fn write_byte(&self, byte: u8) -> Result<()> {
        self.write_bytes(&[byte])
    }

    /// Append `data`, emitting every frame that becomes full.
    pub fn write_bytes(&self, data: &[u8]) -> Result<()> {
        let frame_size = self.slot.frame_size;
        let mut pending = lock(&self.slot.pending);
        // Checked under the pending lock: close flushes through it.
        if self.is_closed() {
            return Err(MuxError::ChannelClosed(self.slot.id));
        }
        let mut rest = data;

        while !rest.is_empty() {
            if pending.is_empty() && rest.len() >= frame_size {
                self.shared.emit_full(self.slot.id, &rest[..frame_size])?;
                rest = &rest[frame_size..];
                continue;
            }

            let take = (frame_size - pending.len()).min(rest.len());
            pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if pending.len() == frame_size {
                self.shared.emit_full(self.slot.id, &pending)?;
                pending.clear();
            }
        }

        Ok(())
    }

    /// Emit buffered bytes as a short frame and flush the physical output.
    pub fn flush(&self) -> Result<()> {
        if self.is_closed() {
            return Err(MuxError::ChannelClosed(self.slot.id));
        }
        self.flush_pending()?;
        lock(&self.shared.output).flush()?;
        Ok(())
    }

    /// Flush buffered bytes, then emit `CloseChannel` and deregister.
    ///
    /// The channel is deregistered even if the flush fails; the flush error
    /// is returned. Closing an already-closed channel is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.slot.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let flushed = self.flush_pending();
        let closed = self.shared.deregister(&self.slot);
        flushed.and(closed)
    }

    /// Emit `CloseChannel` and deregister, dropping any bytes not yet flushed.
    pub fn close_discarding(&self) -> Result<()> {
        if self.slot.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let dropped = {
            let mut pending = lock(&self.slot.pending);
            let dropped = pending.len();
            pending.clear();
            dropped
        };
        if dropped > 0 {
            debug!(channel = self.slot.id, dropped, "discarding unflushed bytes");
        }
        self.shared.deregister(&self.slot)
    }

    /// Bytes waiting for a full frame or a flush.
    pub fn pending(&self) -> usize {
        lock(&self.slot.pending).len()
    }

    fn flush_pending(&self) -> Result<()> {
        let mut pending = lock(&self.slot.pending);
        if !pending.is_empty() {
            self.shared.emit_short(self.slot.id, &pending)?;
            pending.clear();
        }
        Ok(())
    }
}

impl Write for OutputChannel {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        OutputChannel::flush(self).map_err(Into::into)
    }
}

impl std::fmt::Debug for OutputChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputChannel")
            .field("id", &self.slot.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
