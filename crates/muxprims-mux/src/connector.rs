use muxprims_transport::Endpoint;
use tracing::debug;

use crate::config::MuxConfig;
use crate::connection::Connection;
use crate::error::Result;

/// Connect to a listening endpoint.
///
/// No handshake is exchanged; both sides must agree on `config.frame_size`
/// out of band.
pub fn connect(endpoint: &Endpoint, config: MuxConfig) -> Result<Connection> {
    config.validate()?;
    let link = endpoint.connect()?;
    debug!(%endpoint, "connected");
    Connection::new(link, config)
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Read;
    use std::thread;

    use super::*;
    use crate::listener::Listener;

    #[test]
    fn connect_over_unix_socket() {
        let dir = std::env::temp_dir().join(format!(
            "muxc-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        let endpoint = Endpoint::Unix(dir.join("mux.sock"));

        let listener =
            Listener::bind(&endpoint, MuxConfig::default()).expect("listener should bind");

        let server = thread::spawn(move || {
            let conn = listener.accept().expect("listener should accept");
            let mut input = conn.open_input(4).expect("input should open");
            let mut got = Vec::new();
            input.read_to_end(&mut got).expect("read should succeed");
            got
        });

        let client = connect(&endpoint, MuxConfig::default()).expect("client should connect");
        let out = client.open_output(4).expect("output should open");
        out.write_bytes(b"over the socket").expect("write should succeed");
        out.close().expect("close should succeed");

        assert_eq!(server.join().expect("server thread"), b"over the socket");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn invalid_frame_size_rejected_before_connecting() {
        let endpoint = Endpoint::Tcp("127.0.0.1:1".to_string());
        let config = MuxConfig {
            frame_size: 0,
            ..MuxConfig::default()
        };
        assert!(matches!(
            connect(&endpoint, config),
            Err(crate::MuxError::InvalidFrameSize { size: 0, .. })
        ));
    }
}
