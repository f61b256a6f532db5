/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Channel 0 is reserved for admin commands and cannot carry data.
    #[error("channel 0 is reserved for admin commands")]
    ReservedChannel,

    /// The payload does not fit a single frame.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// An admin frame carried a command byte this protocol does not define.
    #[error("unknown admin command 0x{0:02x}")]
    UnknownCommand(u8),

    /// The connection ended in the middle of a frame.
    #[error("connection closed mid-frame ({buffered} bytes of an incomplete unit)")]
    Truncated { buffered: usize },

    /// The connection was closed at a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
