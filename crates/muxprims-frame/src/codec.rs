use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::channel::ADMIN_CHANNEL;
use crate::error::{FrameError, Result};

/// Default data frame size in bytes.
pub const DEFAULT_FRAME_SIZE: usize = 512;

/// Largest frame size, bounded by the 16-bit `SetNextFrameLength` argument.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Channel id prefix: 2 bytes, big-endian.
pub const CHANNEL_ID_SIZE: usize = 2;

/// Admin frame: channel id (2) + command (1) + argument (2) = 5 bytes.
pub const ADMIN_FRAME_SIZE: usize = 5;

const CMD_OPEN_CHANNEL: u8 = 0x01;
const CMD_CLOSE_CHANNEL: u8 = 0x02;
const CMD_SET_NEXT_FRAME_LENGTH: u8 = 0x03;

/// A control command carried on [`ADMIN_CHANNEL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// The sender opened an output channel; the receiver should register it.
    OpenChannel(u16),
    /// The sender closed an output channel; the receiver marks it EOF.
    CloseChannel(u16),
    /// The next data frame carries this many bytes instead of the default.
    SetNextFrameLength(u16),
}

impl AdminCommand {
    /// Command byte on the wire.
    pub fn code(self) -> u8 {
        match self {
            Self::OpenChannel(_) => CMD_OPEN_CHANNEL,
            Self::CloseChannel(_) => CMD_CLOSE_CHANNEL,
            Self::SetNextFrameLength(_) => CMD_SET_NEXT_FRAME_LENGTH,
        }
    }

    /// 16-bit argument on the wire.
    pub fn argument(self) -> u16 {
        match self {
            Self::OpenChannel(id) | Self::CloseChannel(id) => id,
            Self::SetNextFrameLength(len) => len,
        }
    }

    /// Rebuild a command from its wire parts.
    pub fn from_parts(code: u8, argument: u16) -> Result<Self> {
        match code {
            CMD_OPEN_CHANNEL => Ok(Self::OpenChannel(argument)),
            CMD_CLOSE_CHANNEL => Ok(Self::CloseChannel(argument)),
            CMD_SET_NEXT_FRAME_LENGTH => Ok(Self::SetNextFrameLength(argument)),
            other => Err(FrameError::UnknownCommand(other)),
        }
    }
}

/// One decoded unit from the physical input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unit {
    Admin(AdminCommand),
    Data { channel: u16, payload: Bytes },
}

/// Encode an admin frame.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬──────────────┐
/// │ Channel (2B) │ Cmd (1B)  │ Arg (2B BE)  │
/// │ 0x00 0x00    │           │              │
/// └──────────────┴───────────┴──────────────┘
/// ```
pub fn encode_admin(cmd: AdminCommand, dst: &mut BytesMut) {
    dst.reserve(ADMIN_FRAME_SIZE);
    dst.put_u16(ADMIN_CHANNEL);
    dst.put_u8(cmd.code());
    dst.put_u16(cmd.argument());
}

/// Encode a data frame.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────────────────────┐
/// │ Channel (2B) │ Payload (frame size bytes,   │
/// │ (BE, != 0)   │ or the announced length)     │
/// └──────────────┴──────────────────────────────┘
/// ```
///
/// The caller is responsible for the payload length matching what the peer
/// expects: the negotiated frame size, or a length announced with
/// [`AdminCommand::SetNextFrameLength`] (see [`encode_short_data`]).
pub fn encode_data(channel: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if channel == ADMIN_CHANNEL {
        return Err(FrameError::ReservedChannel);
    }
    if payload.len() > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    dst.reserve(CHANNEL_ID_SIZE + payload.len());
    dst.put_u16(channel);
    dst.put_slice(payload);
    Ok(())
}

/// Encode a `SetNextFrameLength` admin frame immediately followed by the
/// data frame it announces.
pub fn encode_short_data(channel: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if channel == ADMIN_CHANNEL {
        return Err(FrameError::ReservedChannel);
    }
    let len = u16::try_from(payload.len()).map_err(|_| FrameError::FrameTooLarge {
        size: payload.len(),
        max: MAX_FRAME_SIZE,
    })?;
    encode_admin(AdminCommand::SetNextFrameLength(len), dst);
    encode_data(channel, payload, dst)
}

/// Incremental decoder for the physical input.
///
/// Tracks the negotiated frame size and a pending length override announced
/// by `SetNextFrameLength`, which applies to the next data frame only.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    frame_size: usize,
    next_len: Option<usize>,
}

impl FrameDecoder {
    /// Create a decoder for the given negotiated frame size.
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            next_len: None,
        }
    }

    /// Negotiated frame size.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Change the negotiated frame size for subsequent data frames.
    pub fn set_frame_size(&mut self, frame_size: usize) {
        self.frame_size = frame_size;
    }

    /// Length override waiting for the next data frame, if any.
    pub fn pending_length(&self) -> Option<usize> {
        self.next_len
    }

    /// Decode one unit from `src`.
    ///
    /// Returns `Ok(None)` if `src` does not hold a complete unit yet; nothing
    /// is consumed in that case. On success the unit's bytes are consumed.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Unit>> {
        if src.len() < CHANNEL_ID_SIZE {
            return Ok(None);
        }

        let channel = u16::from_be_bytes([src[0], src[1]]);

        if channel == ADMIN_CHANNEL {
            if src.len() < ADMIN_FRAME_SIZE {
                return Ok(None);
            }
            let cmd = AdminCommand::from_parts(src[2], u16::from_be_bytes([src[3], src[4]]))?;
            src.advance(ADMIN_FRAME_SIZE);
            if let AdminCommand::SetNextFrameLength(len) = cmd {
                self.next_len = Some(usize::from(len));
            }
            return Ok(Some(Unit::Admin(cmd)));
        }

        let len = self.next_len.unwrap_or(self.frame_size);
        if src.len() < CHANNEL_ID_SIZE + len {
            return Ok(None);
        }

        src.advance(CHANNEL_ID_SIZE);
        let payload = src.split_to(len).freeze();
        self.next_len = None;

        Ok(Some(Unit::Data { channel, payload }))
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_frames_are_big_endian() {
        let mut buf = BytesMut::new();
        encode_admin(AdminCommand::OpenChannel(0x0102), &mut buf);
        encode_admin(AdminCommand::CloseChannel(7), &mut buf);
        encode_admin(AdminCommand::SetNextFrameLength(488), &mut buf);

        assert_eq!(
            buf.as_ref(),
            &[
                0x00, 0x00, 0x01, 0x01, 0x02, //
                0x00, 0x00, 0x02, 0x00, 0x07, //
                0x00, 0x00, 0x03, 0x01, 0xE8,
            ]
        );
    }

    #[test]
    fn data_frame_layout() {
        let mut buf = BytesMut::new();
        encode_data(0x0A0B, b"xyz", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0x0A, 0x0B, b'x', b'y', b'z']);
    }

    #[test]
    fn data_on_admin_channel_rejected() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            encode_data(ADMIN_CHANNEL, b"x", &mut buf),
            Err(FrameError::ReservedChannel)
        ));
        assert!(matches!(
            encode_short_data(ADMIN_CHANNEL, b"x", &mut buf),
            Err(FrameError::ReservedChannel)
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_payload_rejected() {
        let mut buf = BytesMut::new();
        let payload = vec![0u8; MAX_FRAME_SIZE + 1];
        assert!(matches!(
            encode_short_data(3, &payload, &mut buf),
            Err(FrameError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn decode_full_size_frame() {
        let mut decoder = FrameDecoder::new(4);
        let mut buf = BytesMut::new();
        encode_data(9, b"abcd", &mut buf).unwrap();

        let unit = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            unit,
            Unit::Data {
                channel: 9,
                payload: Bytes::from_static(b"abcd"),
            }
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn short_frame_override_applies_once() {
        let mut decoder = FrameDecoder::new(4);
        let mut buf = BytesMut::new();
        encode_short_data(2, b"ab", &mut buf).unwrap();
        encode_data(2, b"wxyz", &mut buf).unwrap();

        assert_eq!(
            decoder.decode(&mut buf).unwrap(),
            Some(Unit::Admin(AdminCommand::SetNextFrameLength(2)))
        );
        assert_eq!(decoder.pending_length(), Some(2));

        let short = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            short,
            Unit::Data {
                channel: 2,
                payload: Bytes::from_static(b"ab"),
            }
        );
        assert_eq!(decoder.pending_length(), None);

        let full = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            full,
            Unit::Data {
                channel: 2,
                payload: Bytes::from_static(b"wxyz"),
            }
        );
    }

    #[test]
    fn override_survives_interleaved_admin() {
        let mut decoder = FrameDecoder::new(8);
        let mut buf = BytesMut::new();
        encode_admin(AdminCommand::SetNextFrameLength(1), &mut buf);
        encode_admin(AdminCommand::OpenChannel(5), &mut buf);
        encode_data(5, b"z", &mut buf).unwrap();

        decoder.decode(&mut buf).unwrap();
        decoder.decode(&mut buf).unwrap();
        let unit = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            unit,
            Unit::Data {
                channel: 5,
                payload: Bytes::from_static(b"z"),
            }
        );
    }

    #[test]
    fn zero_length_frame() {
        let mut decoder = FrameDecoder::default();
        let mut buf = BytesMut::new();
        encode_short_data(1, b"", &mut buf).unwrap();

        decoder.decode(&mut buf).unwrap();
        let unit = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            unit,
            Unit::Data {
                channel: 1,
                payload: Bytes::new(),
            }
        );
    }

    #[test]
    fn incomplete_units_consume_nothing() {
        let mut decoder = FrameDecoder::new(4);

        let mut buf = BytesMut::from(&[0x00][..]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 1);

        let mut buf = BytesMut::from(&[0x00, 0x00, 0x01, 0x00][..]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 4);

        let mut buf = BytesMut::from(&[0x00, 0x03, b'a', b'b'][..]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn unknown_command_is_an_error() {
        let mut decoder = FrameDecoder::default();
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x7F, 0x00, 0x01][..]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(FrameError::UnknownCommand(0x7F))
        ));
    }

    #[test]
    fn thousand_bytes_split_into_full_and_short_frame() {
        let payload: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let mut buf = BytesMut::new();
        encode_data(7, &payload[..DEFAULT_FRAME_SIZE], &mut buf).unwrap();
        encode_short_data(7, &payload[DEFAULT_FRAME_SIZE..], &mut buf).unwrap();

        assert_eq!(buf.len(), 2 + 512 + ADMIN_FRAME_SIZE + 2 + 488);

        let mut decoder = FrameDecoder::default();
        let mut received = Vec::new();
        let mut units = Vec::new();
        while let Some(unit) = decoder.decode(&mut buf).unwrap() {
            if let Unit::Data { payload, .. } = &unit {
                received.extend_from_slice(payload);
            }
            units.push(unit);
        }

        assert_eq!(units.len(), 3);
        assert_eq!(
            units[1],
            Unit::Admin(AdminCommand::SetNextFrameLength(488))
        );
        assert_eq!(received, payload);
    }
}
