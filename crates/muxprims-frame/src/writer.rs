use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_admin, encode_data, encode_short_data, AdminCommand};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete units to any `Write` stream.
///
/// Each `send_*` call encodes into an internal buffer and hands it to the
/// stream in one go, so a unit is never split across two callers as long as
/// the writer itself is used under a lock.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Send an admin command and flush it to the peer.
    pub fn send_admin(&mut self, cmd: AdminCommand) -> Result<()> {
        self.buf.clear();
        encode_admin(cmd, &mut self.buf);
        trace!(?cmd, "sending admin command");
        self.write_buffered()?;
        self.flush()
    }

    /// Send a data frame whose length equals the negotiated frame size.
    pub fn send_data(&mut self, channel: u16, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_data(channel, payload, &mut self.buf)?;
        trace!(channel, len = payload.len(), "sending data frame");
        self.write_buffered()
    }

    /// Send `SetNextFrameLength(len)` and the short data frame as one write.
    pub fn send_short_data(&mut self, channel: u16, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_short_data(channel, payload, &mut self.buf)?;
        trace!(channel, len = payload.len(), "sending short data frame");
        self.write_buffered()
    }

    fn write_buffered(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;
    use crate::codec::Unit;
    use crate::reader::FrameReader;

    fn written(writer: FrameWriter<Cursor<Vec<u8>>>) -> Vec<u8> {
        writer.into_inner().into_inner()
    }

    #[test]
    fn admin_command_bytes() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        writer.send_admin(AdminCommand::CloseChannel(9)).unwrap();
        assert_eq!(written(writer), vec![0, 0, 0x02, 0, 9]);
    }

    #[test]
    fn written_units_decode() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        writer.send_admin(AdminCommand::OpenChannel(5)).unwrap();
        writer.send_data(5, b"full").unwrap();
        writer.send_short_data(5, b"ab").unwrap();

        let mut reader = FrameReader::new(Cursor::new(written(writer)), 4);
        assert_eq!(
            reader.read_unit().unwrap(),
            Unit::Admin(AdminCommand::OpenChannel(5))
        );
        assert_eq!(
            reader.read_unit().unwrap(),
            Unit::Data {
                channel: 5,
                payload: Bytes::from_static(b"full"),
            }
        );
        assert_eq!(
            reader.read_unit().unwrap(),
            Unit::Admin(AdminCommand::SetNextFrameLength(2))
        );
        assert_eq!(
            reader.read_unit().unwrap(),
            Unit::Data {
                channel: 5,
                payload: Bytes::from_static(b"ab"),
            }
        );
    }

    #[test]
    fn reserved_channel_rejected() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        assert!(matches!(
            writer.send_data(0, b"x"),
            Err(FrameError::ReservedChannel)
        ));
        assert!(written(writer).is_empty());
    }

    #[test]
    fn admin_flushes_data_does_not() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);

        writer.send_data(1, b"x").unwrap();
        assert!(!flag.load(Ordering::SeqCst));

        writer.send_admin(AdminCommand::OpenChannel(1)).unwrap();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn handles_interrupted_and_would_block() {
        let mut writer = FrameWriter::new(FlakyWriter::default());
        writer.send_short_data(6, b"retry").unwrap();
        writer.flush().unwrap();

        let inner = writer.into_inner();
        assert_eq!(inner.data.len(), 5 + 2 + 5);
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send_data(1, b"x").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let _ = writer.get_ref();
        let _ = writer.get_mut();
        let _inner = writer.into_inner();
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Fails every other call with `Interrupted` or `WouldBlock`, and accepts
    /// at most three bytes per successful write.
    #[derive(Default)]
    struct FlakyWriter {
        calls: usize,
        data: Vec<u8>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.calls += 1;
            match self.calls % 4 {
                1 => Err(std::io::Error::from(ErrorKind::Interrupted)),
                3 => Err(std::io::Error::from(ErrorKind::WouldBlock)),
                _ => {
                    let n = buf.len().min(3);
                    self.data.extend_from_slice(&buf[..n]);
                    Ok(n)
                }
            }
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.calls += 1;
            if self.calls % 2 == 1 {
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
