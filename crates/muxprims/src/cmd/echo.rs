use std::io::ErrorKind;
use std::thread;

use muxprims_frame::FrameError;
use muxprims_mux::{Connection, InputChannel, Listener, MuxConfig, MuxError, OutputChannel};

use crate::cmd::{EchoArgs, StopSignal};
use crate::exit::{mux_error, CliError, CliResult, SUCCESS};

enum SessionErrorDisposition {
    /// The peer went away; move on to the next connection.
    Disconnected,
    Fatal(CliError),
}

pub fn run(args: EchoArgs, config: MuxConfig) -> CliResult<i32> {
    let chunk_size = config.frame_size;
    let listener =
        Listener::bind(&args.endpoint, config).map_err(|err| mux_error("bind failed", err))?;
    let stop = StopSignal::install()?;

    while !stop.stopped() {
        let conn = listener
            .accept()
            .map_err(|err| mux_error("accept failed", err))?;
        stop.arm(
            conn.shutdown_handle()
                .map_err(|err| mux_error("accept failed", err))?,
        );

        let result = serve(&conn, &args.channels, chunk_size);
        stop.disarm();
        if let Err(err) = conn.close() {
            tracing::debug!(error = %err, "close after echo session failed");
        }

        if let Err(err) = result {
            match classify_session_error(err) {
                SessionErrorDisposition::Disconnected => {
                    tracing::info!(peer = conn.peer(), "peer disconnected");
                }
                SessionErrorDisposition::Fatal(err) => return Err(err),
            }
        }
    }

    Ok(SUCCESS)
}

/// Echo every channel in `channels` on its own thread until each input
/// reaches EOF. Returns the error that ended the session, preferring the
/// pumping channel's concrete error over the `ConnectionFailed` the other
/// channels see.
fn serve(conn: &Connection, channels: &[u16], chunk_size: usize) -> Result<(), MuxError> {
    let mut workers = Vec::with_capacity(channels.len());
    for &id in channels {
        let input = conn.open_input(id)?;
        let output = conn.open_output(id)?;
        let worker = thread::Builder::new()
            .name(format!("echo-{id}"))
            .spawn(move || echo_channel(&input, &output, chunk_size))?;
        workers.push(worker);
    }

    let mut session_error: Option<MuxError> = None;
    for worker in workers {
        let outcome = worker
            .join()
            .unwrap_or_else(|_| Err(MuxError::ConnectionFailed("echo worker panicked".into())));
        if let Err(err) = outcome {
            let replace = match &session_error {
                None => true,
                Some(MuxError::ConnectionFailed(_)) => {
                    !matches!(err, MuxError::ConnectionFailed(_))
                }
                Some(_) => false,
            };
            if replace {
                session_error = Some(err);
            }
        }
    }
    session_error.map_or(Ok(()), Err)
}

fn echo_channel(
    input: &InputChannel,
    output: &OutputChannel,
    chunk_size: usize,
) -> Result<(), MuxError> {
    let mut buf = vec![0u8; chunk_size];
    let mut echoed = 0u64;
    loop {
        let n = input.read_chunk(&mut buf)?;
        if n == 0 {
            break;
        }
        output.write_bytes(&buf[..n])?;
        output.flush()?;
        echoed += n as u64;
    }
    tracing::info!(channel = input.id(), bytes = echoed, "echoed channel");
    output.close()
}

fn classify_session_error(err: MuxError) -> SessionErrorDisposition {
    match &err {
        MuxError::Transport(io)
            if matches!(
                io.kind(),
                ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
            ) =>
        {
            SessionErrorDisposition::Disconnected
        }
        MuxError::Frame(FrameError::ConnectionClosed | FrameError::Truncated { .. }) => {
            SessionErrorDisposition::Disconnected
        }
        _ => SessionErrorDisposition::Fatal(mux_error("echo failed", err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broken_pipe_is_a_disconnect() {
        let disposition = classify_session_error(MuxError::Transport(std::io::Error::from(
            ErrorKind::BrokenPipe,
        )));
        assert!(matches!(disposition, SessionErrorDisposition::Disconnected));
    }

    #[test]
    fn truncated_input_is_a_disconnect() {
        let disposition =
            classify_session_error(MuxError::Frame(FrameError::Truncated { buffered: 3 }));
        assert!(matches!(disposition, SessionErrorDisposition::Disconnected));
    }

    #[test]
    fn malformed_input_is_fatal() {
        let disposition = classify_session_error(MuxError::Frame(FrameError::UnknownCommand(9)));
        assert!(matches!(disposition, SessionErrorDisposition::Fatal(_)));
    }

    #[cfg(unix)]
    #[test]
    fn echoes_until_eof_then_closes() {
        use std::io::Read;

        use muxprims_transport::Link;

        let (left, right) = Link::pair().unwrap();
        let server = Connection::new(left, MuxConfig::default()).unwrap();
        let client = Connection::new(right, MuxConfig::default()).unwrap();

        let mut reply = client.open_input(4).unwrap();
        let out = client.open_output(4).unwrap();
        out.write_bytes(b"bounce").unwrap();
        out.close().unwrap();

        serve(&server, &[4], 16).unwrap();

        let mut got = Vec::new();
        reply.read_to_end(&mut got).unwrap();
        assert_eq!(got, b"bounce");
    }

    #[cfg(unix)]
    #[test]
    fn peer_dropping_mid_frame_is_a_disconnect_on_every_channel() {
        use std::io::Write;

        use bytes::BytesMut;
        use muxprims_frame::{encode_admin, AdminCommand};
        use muxprims_transport::Link;

        let (left, mut right) = Link::pair().unwrap();
        let server = Connection::new(left, MuxConfig::default()).unwrap();

        let mut wire = BytesMut::new();
        encode_admin(AdminCommand::OpenChannel(1), &mut wire);
        encode_admin(AdminCommand::OpenChannel(2), &mut wire);
        wire.extend_from_slice(&[0x00, 0x02, b'p', b'a', b'r']);
        right.write_all(&wire).unwrap();
        drop(right);

        let err = serve(&server, &[1, 2], 16).unwrap_err();
        assert!(
            matches!(err, MuxError::Frame(FrameError::Truncated { .. })),
            "{err:?}"
        );
        assert!(matches!(
            classify_session_error(err),
            SessionErrorDisposition::Disconnected
        ));
    }
}
