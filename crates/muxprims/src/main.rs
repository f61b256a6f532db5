mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;
use muxprims_frame::DEFAULT_FRAME_SIZE;
use muxprims_mux::MuxConfig;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "muxprims", version, about = "Multiplexed byte streams CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Data frame size in bytes. Both peers must use the same value.
    #[arg(
        long,
        value_name = "BYTES",
        env = "MUXPRIMS_FRAME_SIZE",
        default_value_t = DEFAULT_FRAME_SIZE,
        global = true
    )]
    frame_size: usize,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let config = MuxConfig {
        frame_size: cli.frame_size,
        ..MuxConfig::default()
    };
    let result = cmd::run(cli.command, format, config);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "muxprims",
            "send",
            "tcp:127.0.0.1:7000",
            "--channel",
            "3",
            "--data",
            "hello",
        ])
        .expect("send args should parse");

        assert!(matches!(cli.command, Command::Send(_)));
        assert_eq!(cli.frame_size, DEFAULT_FRAME_SIZE);
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "muxprims",
            "send",
            "/tmp/test.sock",
            "--file",
            "payload.bin",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_malformed_endpoint() {
        let err = Cli::try_parse_from(["muxprims", "listen", "tcp:no-port"])
            .expect_err("bad endpoint should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn frame_size_is_global() {
        let cli = Cli::try_parse_from([
            "muxprims",
            "echo",
            "unix:/tmp/echo.sock",
            "--channels",
            "1,2",
            "--frame-size",
            "64",
        ])
        .expect("echo args should parse");
        assert_eq!(cli.frame_size, 64);
    }
}
