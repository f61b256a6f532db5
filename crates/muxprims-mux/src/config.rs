use std::time::Duration;

use muxprims_frame::{DEFAULT_FRAME_SIZE, MAX_FRAME_SIZE};

use crate::error::{MuxError, Result};

/// Default bounded wait between pump-arbitration rechecks.
pub const DEFAULT_PUMP_WAIT: Duration = Duration::from_millis(50);

/// Configuration shared by both directions of a connection.
///
/// `frame_size` is not negotiated on the wire: both peers must be configured
/// with the same value.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Data frame size in bytes. Default: 512.
    pub frame_size: usize,
    /// How long a blocked reader waits before re-checking whether it should
    /// take over pumping. Default: 50 ms.
    pub pump_wait: Duration,
    /// Read timeout applied to the physical link. An expired timeout while
    /// pumping fails the connection.
    pub read_timeout: Option<Duration>,
    /// Write timeout applied to the physical link.
    pub write_timeout: Option<Duration>,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            pump_wait: DEFAULT_PUMP_WAIT,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl MuxConfig {
    /// Check that the configuration can be put on the wire.
    pub fn validate(&self) -> Result<()> {
        check_frame_size(self.frame_size)
    }
}

pub(crate) fn check_frame_size(size: usize) -> Result<()> {
    if size == 0 || size > MAX_FRAME_SIZE {
        return Err(MuxError::InvalidFrameSize {
            size,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(())
}
