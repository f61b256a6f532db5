//! Read half of a multiplexed connection.
//!
//! There is no background reader thread. A reader whose channel buffer is
//! empty tries to become the *pump*: the single thread allowed to decode the
//! physical input. The pump keeps decoding units and distributing payloads to
//! channel buffers until its own channel has data or reaches EOF, then hands
//! the role back and wakes every waiter. Readers that lose the race wait on a
//! condition variable with a bounded timeout and re-check their buffer.
//!
//! Fairness is not guaranteed: the pump drains frames until *its* channel is
//! satisfied, so under adversarial interleavings other readers can be
//! starved for as long as that takes.

use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, TryLockError};
use std::time::Duration;

use muxprims_frame::{
    is_data_channel, AdminCommand, FrameError, FrameReader, Unit, ADMIN_CHANNEL,
};
use muxprims_transport::ReadReady;
use tracing::{debug, trace, warn};

use crate::config::{check_frame_size, MuxConfig};
use crate::error::{MuxError, Result};
use crate::lock;
use crate::ring::RingBuffer;

/// A physical input the demultiplexer can pump.
pub trait PhysicalInput: Read + ReadReady + Send {}

impl<T: Read + ReadReady + Send> PhysicalInput for T {}

const OPEN: u8 = 0;
const EOF: u8 = 1;
const FAILED: u8 = 2;

/// Read half of a multiplexed connection.
///
/// Cheap to clone; clones share the same input and channel registry.
#[derive(Clone)]
pub struct Demultiplexer {
    shared: Arc<DemuxShared>,
}

struct DemuxShared {
    state: Mutex<DemuxState>,
    /// Signalled whenever a buffer is filled, a channel changes state, or the
    /// pump role is released.
    wake: Condvar,
    /// Only touched by the thread holding the pump role.
    input: Mutex<FrameReader<Box<dyn PhysicalInput>>>,
    pump_wait: Duration,
    #[cfg(all(test, unix))]
    pumps: tests::PumpGauge,
}

struct DemuxState {
    channels: HashMap<u16, Arc<InputSlot>>,
    frame_size: usize,
    pumping: bool,
    /// The physical input reached EOF or was shut down.
    closed: bool,
    /// A fatal error ended the connection.
    failure: Option<String>,
}

struct InputSlot {
    id: u16,
    buffer: Mutex<RingBuffer>,
    state: AtomicU8,
    interrupted: AtomicBool,
}

impl InputSlot {
    fn new(id: u16, state: u8) -> Self {
        Self {
            id,
            buffer: Mutex::new(RingBuffer::default()),
            state: AtomicU8::new(state),
            interrupted: AtomicBool::new(false),
        }
    }

    fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    fn is_open(&self) -> bool {
        self.state() == OPEN
    }

    /// Moves an open slot to `to`; terminal states are never left, except
    /// FAILED → EOF once the failure has been reported.
    fn finish(&self, to: u8) {
        let _ = self
            .state
            .compare_exchange(OPEN, to, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Nothing more for a waiter to wait for on this slot.
    fn ready(&self) -> bool {
        !self.is_open()
            || self.interrupted.load(Ordering::Acquire)
            || !lock(&self.buffer).is_empty()
    }
}

impl Demultiplexer {
    /// Create a demultiplexer reading from `input`.
    pub fn new<R: PhysicalInput + 'static>(input: R, config: &MuxConfig) -> Result<Self> {
        config.validate()?;
        let input: Box<dyn PhysicalInput> = Box::new(input);
        Ok(Self {
            shared: Arc::new(DemuxShared {
                state: Mutex::new(DemuxState {
                    channels: HashMap::new(),
                    frame_size: config.frame_size,
                    pumping: false,
                    closed: false,
                    failure: None,
                }),
                wake: Condvar::new(),
                input: Mutex::new(FrameReader::new(input, config.frame_size)),
                pump_wait: config.pump_wait,
                #[cfg(all(test, unix))]
                pumps: tests::PumpGauge::default(),
            }),
        })
    }

    /// Open input channel `id`, or return the already-registered one.
    ///
    /// A channel may already be registered because the peer announced it
    /// with `OpenChannel` before the local reader asked for it; any data that
    /// arrived in the meantime is waiting in its buffer.
    pub fn open_channel(&self, id: u16) -> Result<InputChannel> {
        if !is_data_channel(id) {
            return Err(MuxError::ReservedChannel);
        }

        let mut state = lock(&self.shared.state);
        let slot = match state.channels.get(&id) {
            Some(slot) => Arc::clone(slot),
            None => {
                let slot = Arc::new(InputSlot::new(id, state.initial_slot_state()));
                if slot.is_open() {
                    state.channels.insert(id, Arc::clone(&slot));
                }
                debug!(channel = id, "opened input channel");
                slot
            }
        };

        Ok(InputChannel {
            slot,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Change the frame size. Only allowed while no channel is registered.
    pub fn set_frame_size(&self, frame_size: usize) -> Result<()> {
        check_frame_size(frame_size)?;
        let mut state = lock(&self.shared.state);
        if !state.channels.is_empty() {
            return Err(MuxError::FrameSizeLocked {
                open: state.channels.len(),
            });
        }
        state.frame_size = frame_size;
        Ok(())
    }

    /// Current frame size.
    pub fn frame_size(&self) -> usize {
        lock(&self.shared.state).frame_size
    }

    /// Ids of the registered input channels, ascending.
    pub fn open_channels(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = lock(&self.shared.state)
            .channels
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// True if input channel `id` is registered.
    pub fn is_open(&self, id: u16) -> bool {
        lock(&self.shared.state).channels.contains_key(&id)
    }

    /// Mark every channel EOF, as if the physical input had ended.
    ///
    /// Does not touch the physical input itself; a pump blocked in a read
    /// stays blocked until that read returns.
    pub fn shutdown(&self) {
        self.shared.close_all();
    }
}

impl std::fmt::Debug for Demultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Demultiplexer")
            .field("open_channels", &self.open_channels())
            .field("frame_size", &self.frame_size())
            .finish()
    }
}

impl DemuxState {
    fn initial_slot_state(&self) -> u8 {
        if self.failure.is_some() {
            FAILED
        } else if self.closed {
            EOF
        } else {
            OPEN
        }
    }
}

impl DemuxShared {
    /// Wait until `slot` is ready, taking over the pump role if it is free.
    fn wait_or_pump(&self, slot: &Arc<InputSlot>) -> Result<()> {
        let mut state = lock(&self.state);
        loop {
            if slot.ready() {
                return Ok(());
            }

            if !state.pumping {
                state.pumping = true;
                let frame_size = state.frame_size;
                drop(state);
                return self.pump(slot, frame_size);
            }

            let (guard, _timed_out) = self
                .wake
                .wait_timeout(state, self.pump_wait)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Decode units until `target` has data or is no longer open.
    ///
    /// Must only be called by the thread that set `pumping`.
    fn pump(&self, target: &Arc<InputSlot>, frame_size: usize) -> Result<()> {
        let _role = PumpRole::enter(self);
        let mut input = lock(&self.input);
        input.set_frame_size(frame_size);
        trace!(channel = target.id, "pumping");

        while !target.ready() {
            let unit = match input.read_unit() {
                Ok(unit) => unit,
                Err(FrameError::ConnectionClosed) => {
                    debug!("physical input closed");
                    self.close_all();
                    return Ok(());
                }
                Err(err) => {
                    warn!(error = %err, "demultiplexer failed; tearing down all channels");
                    self.fail_all(&err);
                    target.state.store(EOF, Ordering::Release);
                    return Err(err.into());
                }
            };

            match unit {
                Unit::Admin(AdminCommand::OpenChannel(ADMIN_CHANNEL)) => {
                    let err = FrameError::ReservedChannel;
                    warn!("peer opened reserved channel 0; tearing down all channels");
                    self.fail_all(&err);
                    target.state.store(EOF, Ordering::Release);
                    return Err(MuxError::Frame(err));
                }
                Unit::Admin(AdminCommand::OpenChannel(id)) => {
                    let mut state = lock(&self.state);
                    state
                        .channels
                        .entry(id)
                        .or_insert_with(|| Arc::new(InputSlot::new(id, OPEN)));
                    debug!(channel = id, "peer opened channel");
                }
                Unit::Admin(AdminCommand::CloseChannel(id)) => {
                    let mut state = lock(&self.state);
                    if let Some(slot) = state.channels.remove(&id) {
                        slot.finish(EOF);
                    }
                    self.wake.notify_all();
                    debug!(channel = id, "peer closed channel");
                }
                Unit::Admin(AdminCommand::SetNextFrameLength(_)) => {}
                Unit::Data { channel, payload } => {
                    let state = lock(&self.state);
                    match state.channels.get(&channel) {
                        Some(slot) => {
                            lock(&slot.buffer).fill(&payload);
                            if !Arc::ptr_eq(slot, target) {
                                self.wake.notify_all();
                            }
                        }
                        None => {
                            warn!(channel, len = payload.len(), "dropping data for unregistered channel");
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn close_all(&self) {
        let mut state = lock(&self.state);
        state.closed = true;
        for (_, slot) in state.channels.drain() {
            slot.finish(EOF);
        }
        self.wake.notify_all();
    }

    fn fail_all(&self, err: &FrameError) {
        let mut state = lock(&self.state);
        state.failure = Some(err.to_string());
        for (_, slot) in state.channels.drain() {
            slot.finish(FAILED);
        }
        self.wake.notify_all();
    }

    fn failure(&self) -> String {
        lock(&self.state)
            .failure
            .clone()
            .unwrap_or_else(|| "demultiplexer failed".to_string())
    }
}

/// Releases the pump role on every exit path, including errors and panics,
/// so waiters are never left without a pump.
struct PumpRole<'a> {
    shared: &'a DemuxShared,
}

impl<'a> PumpRole<'a> {
    fn enter(shared: &'a DemuxShared) -> Self {
        #[cfg(all(test, unix))]
        shared.pumps.enter();
        Self { shared }
    }
}

impl Drop for PumpRole<'_> {
    fn drop(&mut self) {
        #[cfg(all(test, unix))]
        self.shared.pumps.leave();
        let mut state = lock(&self.shared.state);
        state.pumping = false;
        self.shared.wake.notify_all();
    }
}

/// A readable logical stream.
///
/// Clones refer to the same channel and share its buffer.
#[derive(Clone)]
pub struct InputChannel {
    slot: Arc<InputSlot>,
    shared: Arc<DemuxShared>,
}

impl InputChannel {
    /// Channel id.
    pub fn id(&self) -> u16 {
        self.slot.id
    }

    /// True once the channel has reached end of stream and its buffer is
    /// drained.
    pub fn is_eof(&self) -> bool {
        !self.slot.is_open() && lock(&self.slot.buffer).is_empty()
    }

    /// Read one byte, blocking until one is available. `None` is end of stream.
    pub fn read_byte(&self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read_chunk(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Read up to `buf.len()` bytes, blocking until at least one is available.
    ///
    /// Returns `Ok(0)` at end of stream (or when `buf` is empty). Bytes that
    /// arrived before the channel was closed are returned before EOF.
    pub fn read_chunk(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            // Load the state before draining: the pump fills the buffer
            // before it closes the channel, so an empty buffer observed after
            // a terminal state really is the end.
            let state = self.slot.state();
            if let Some(n) = lock(&self.slot.buffer).get_into(buf) {
                return Ok(n);
            }

            match state {
                EOF => return Ok(0),
                FAILED => {
                    self.slot.state.store(EOF, Ordering::Release);
                    return Err(MuxError::ConnectionFailed(self.shared.failure()));
                }
                _ => {}
            }

            if self.slot.interrupted.swap(false, Ordering::AcqRel) {
                return Err(MuxError::Interrupted(self.slot.id));
            }

            self.shared.wait_or_pump(&self.slot)?;
        }
    }

    /// Bytes readable without blocking, best effort.
    ///
    /// Counts this channel's buffer plus whatever the physical input has
    /// ready, if no pump holds it at the moment. Input bytes may belong to
    /// any channel, so this can over-report; concurrent pumping can make it
    /// stale immediately.
    pub fn available(&self) -> usize {
        let local = lock(&self.slot.buffer).len();
        let input = match self.shared.input.try_lock() {
            Ok(input) => Some(input),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        };
        let transport = input.map_or(0, |input| {
            input.buffered() + input.get_ref().bytes_ready().unwrap_or(0)
        });
        local + transport
    }

    /// Cancel the current or next blocking wait on this channel.
    ///
    /// The waiting reader returns `MuxError::Interrupted`. A reader that is
    /// currently pumping stays blocked in the physical read and returns
    /// `Interrupted` after the next unit is decoded.
    pub fn interrupt(&self) {
        self.slot.interrupted.store(true, Ordering::Release);
        let _state = lock(&self.shared.state);
        self.shared.wake.notify_all();
    }

    /// Close this channel locally.
    ///
    /// Nothing is sent to the peer. The channel is deregistered, its buffered
    /// bytes are dropped and readers see EOF. Data the peer still sends for
    /// this id is discarded until the peer reopens it.
    pub fn close(&self) {
        let mut state = lock(&self.shared.state);
        if state
            .channels
            .get(&self.slot.id)
            .is_some_and(|current| Arc::ptr_eq(current, &self.slot))
        {
            state.channels.remove(&self.slot.id);
        }
        self.slot.state.store(EOF, Ordering::Release);
        lock(&self.slot.buffer).clear();
        self.shared.wake.notify_all();
        debug!(channel = self.slot.id, "closed input channel");
    }
}

impl Read for InputChannel {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.read_chunk(buf).map_err(Into::into)
    }
}

impl std::fmt::Debug for InputChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputChannel")
            .field("id", &self.slot.id)
            .field("state", &self.slot.state())
            .finish()
    }
}
