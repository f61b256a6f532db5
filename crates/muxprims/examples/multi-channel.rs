//! Multi-channel example: two logical streams over one TCP connection.
//!
//! Run with:
//!   cargo run --example multi-channel

use std::io::Read;
use std::thread;

use muxprims::mux::{connect, Listener, MuxConfig, MuxError};
use muxprims::transport::Endpoint;

const LOG: u16 = 1;
const BULK: u16 = 2;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = Listener::bind(&"tcp:127.0.0.1:0".parse::<Endpoint>()?, MuxConfig::default())?;
    let endpoint = listener.local_endpoint();
    eprintln!("[server] listening on {endpoint}");

    let server = thread::spawn(
        move || -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let conn = listener.accept()?;
            eprintln!("[server] peer connected: {}", conn.peer());

            let readers: Vec<_> = [LOG, BULK]
                .into_iter()
                .map(|id| -> Result<_, MuxError> {
                    let mut input = conn.open_input(id)?;
                    Ok(thread::spawn(move || {
                        let mut got = Vec::new();
                        input.read_to_end(&mut got).map(|_| (id, got))
                    }))
                })
                .collect::<Result<_, MuxError>>()?;

            for reader in readers {
                let (id, got) = reader.join().map_err(|_| "reader panicked")??;
                eprintln!("[server] channel {id}: {} bytes", got.len());
            }
            Ok(())
        },
    );

    let client = connect(&endpoint, MuxConfig::default())?;
    let log = client.open_output(LOG)?;
    let bulk = client.open_output(BULK)?;

    // Interleave a chatty stream with a large one; neither blocks the other.
    for i in 0..4 {
        log.write_bytes(format!("step {i}\n").as_bytes())?;
        log.flush()?;
        bulk.write_bytes(&vec![i as u8; 10_000])?;
    }
    log.close()?;
    bulk.close()?;

    server
        .join()
        .map_err(|_| "server panicked")?
        .map_err(|err| err.to_string())?;
    client.close()?;
    Ok(())
}
