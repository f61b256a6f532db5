//! Wire format for muxprims.
//!
//! Every unit on the physical connection starts with a 2-byte big-endian
//! channel id:
//! - channel 0 carries admin commands (one command byte plus a 16-bit
//!   argument)
//! - any other channel carries a data frame of exactly the negotiated frame
//!   size, unless the preceding admin command announced a shorter length
//!
//! There is no per-frame length prefix and no magic number: both sides must
//! agree on the frame size out-of-band.

pub mod channel;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use channel::{is_data_channel, ADMIN_CHANNEL};
pub use codec::{
    encode_admin, encode_data, encode_short_data, AdminCommand, FrameDecoder, Unit,
    ADMIN_FRAME_SIZE, CHANNEL_ID_SIZE, DEFAULT_FRAME_SIZE, MAX_FRAME_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
