use std::fs::File;
use std::io;
use std::time::Duration;

use muxprims_mux::{connect, Connection, MuxConfig, OutputChannel};

use crate::cmd::SendArgs;
use crate::exit::{io_error, mux_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_chunk, Chunk, OutputFormat};

const REPLY_CHUNK: usize = 64 * 1024;

pub fn run(args: SendArgs, format: OutputFormat, mut config: MuxConfig) -> CliResult<i32> {
    if args.wait {
        config.read_timeout = Some(parse_duration(&args.wait_timeout)?);
    }

    let conn = connect(&args.endpoint, config).map_err(|err| mux_error("connect failed", err))?;
    let result = send_and_wait(&conn, &args, format);
    if let Err(err) = conn.close() {
        tracing::debug!(error = %err, "close after send failed");
    }
    result
}

fn send_and_wait(conn: &Connection, args: &SendArgs, format: OutputFormat) -> CliResult<i32> {
    // Registered before sending so a fast reply is buffered, not dropped.
    let reply = if args.wait {
        Some(
            conn.open_input(args.channel)
                .map_err(|err| mux_error("open failed", err))?,
        )
    } else {
        None
    };

    let output = conn
        .open_output(args.channel)
        .map_err(|err| mux_error("open failed", err))?;
    let sent = stream_payload(args, &output)?;
    output
        .close()
        .map_err(|err| mux_error("send failed", err))?;
    tracing::info!(channel = args.channel, bytes = sent, "sent payload");

    if let Some(reply) = reply {
        let mut buf = vec![0u8; REPLY_CHUNK];
        loop {
            let n = reply
                .read_chunk(&mut buf)
                .map_err(|err| mux_error("receive failed", err))?;
            if n == 0 {
                break;
            }
            let chunk = Chunk {
                channel: args.channel,
                data: buf[..n].to_vec(),
            };
            print_chunk(&chunk, conn.peer(), format);
        }
    }

    Ok(SUCCESS)
}

fn stream_payload(args: &SendArgs, output: &OutputChannel) -> CliResult<u64> {
    let mut writer = output.clone();
    if let Some(data) = &args.data {
        output
            .write_bytes(data.as_bytes())
            .map_err(|err| mux_error("send failed", err))?;
        return Ok(data.len() as u64);
    }
    if let Some(path) = &args.file {
        let mut file = File::open(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        return io::copy(&mut file, &mut writer).map_err(|err| io_error("send failed", err));
    }
    io::copy(&mut io::stdin().lock(), &mut writer).map_err(|err| io_error("send failed", err))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }
}
