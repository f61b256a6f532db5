use muxprims_frame::FrameError;
use muxprims_transport::TransportError;

/// Errors that can occur on multiplexed channels.
///
/// End of stream is not an error: reads report it as `Ok(0)` / `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// Channel 0 is reserved for admin commands.
    #[error("channel 0 is reserved for admin commands")]
    ReservedChannel,

    /// The frame size cannot change while channels are open.
    #[error("frame size cannot change while {open} channel(s) are open")]
    FrameSizeLocked { open: usize },

    /// The frame size is outside the encodable range.
    #[error("invalid frame size {size} (must be 1..={max})")]
    InvalidFrameSize { size: usize, max: usize },

    /// The output channel was closed by this side.
    #[error("channel {0} is closed")]
    ChannelClosed(u16),

    /// A wait for input on this channel was interrupted.
    #[error("wait on channel {0} was interrupted")]
    Interrupted(u16),

    /// The physical link failed while reading or writing.
    #[error("transport I/O error: {0}")]
    Transport(#[from] std::io::Error),

    /// Setting up the physical link failed.
    #[error("link error: {0}")]
    Link(#[from] TransportError),

    /// The physical input carried a malformed unit.
    #[error("framing error: {0}")]
    Frame(FrameError),

    /// Another thread's pump hit a fatal error; the connection is unusable.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

impl From<FrameError> for MuxError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(io) => Self::Transport(io),
            other => Self::Frame(other),
        }
    }
}

impl From<MuxError> for std::io::Error {
    fn from(err: MuxError) -> Self {
        use std::io::ErrorKind;

        let other = match err {
            MuxError::Transport(io) => return io,
            other => other,
        };

        let kind = match &other {
            MuxError::ReservedChannel
            | MuxError::FrameSizeLocked { .. }
            | MuxError::InvalidFrameSize { .. } => ErrorKind::InvalidInput,
            MuxError::ChannelClosed(_) => ErrorKind::BrokenPipe,
            MuxError::Frame(FrameError::Truncated { .. }) => ErrorKind::UnexpectedEof,
            MuxError::Frame(FrameError::ConnectionClosed) => ErrorKind::WriteZero,
            MuxError::Frame(_) => ErrorKind::InvalidData,
            MuxError::ConnectionFailed(_) => ErrorKind::ConnectionAborted,
            // Not `Interrupted`: std's read/write helpers retry that kind,
            // which would swallow the cancellation.
            MuxError::Interrupted(_) | MuxError::Link(_) | MuxError::Transport(_) => {
                ErrorKind::Other
            }
        };
        std::io::Error::new(kind, other)
    }
}

pub type Result<T> = std::result::Result<T, MuxError>;
