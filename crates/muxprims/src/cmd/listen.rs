use std::sync::mpsc;
use std::thread;

use muxprims_mux::{InputChannel, Listener, MuxConfig, MuxError};

use crate::cmd::{ListenArgs, StopSignal};
use crate::exit::{io_error, mux_error, CliResult, SUCCESS};
use crate::output::{print_chunk, Chunk, OutputFormat};

type Event = Result<Chunk, MuxError>;

pub fn run(args: ListenArgs, format: OutputFormat, config: MuxConfig) -> CliResult<i32> {
    let chunk_size = config.frame_size;
    let listener =
        Listener::bind(&args.endpoint, config).map_err(|err| mux_error("bind failed", err))?;
    let stop = StopSignal::install()?;

    let conn = listener
        .accept()
        .map_err(|err| mux_error("accept failed", err))?;
    stop.arm(
        conn.shutdown_handle()
            .map_err(|err| mux_error("accept failed", err))?,
    );

    let (tx, rx) = mpsc::channel::<Event>();
    let mut readers = Vec::with_capacity(args.channels.len());
    for &id in &args.channels {
        let input = conn
            .open_input(id)
            .map_err(|err| mux_error("open failed", err))?;
        let tx = tx.clone();
        let reader = thread::Builder::new()
            .name(format!("listen-{id}"))
            .spawn(move || forward_chunks(input, chunk_size, tx))
            .map_err(|err| io_error("spawn failed", err))?;
        readers.push(reader);
    }
    drop(tx);

    let mut printed = 0usize;
    let mut failure = None;
    for event in rx {
        match event {
            Ok(chunk) => {
                print_chunk(&chunk, conn.peer(), format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }

    stop.disarm();
    if let Err(err) = conn.close() {
        tracing::debug!(error = %err, "close after listen failed");
    }
    for reader in readers {
        let _ = reader.join();
    }

    match failure {
        Some(err) => Err(mux_error("receive failed", err)),
        None => Ok(SUCCESS),
    }
}

/// Read `input` until EOF, forwarding each chunk. Stops early once the
/// receiving side has gone away.
fn forward_chunks(input: InputChannel, chunk_size: usize, tx: mpsc::Sender<Event>) {
    let mut buf = vec![0u8; chunk_size];
    loop {
        let event = match input.read_chunk(&mut buf) {
            Ok(0) => return,
            Ok(n) => Ok(Chunk {
                channel: input.id(),
                data: buf[..n].to_vec(),
            }),
            Err(err) => Err(err),
        };
        let failed = event.is_err();
        if tx.send(event).is_err() || failed {
            return;
        }
    }
}
