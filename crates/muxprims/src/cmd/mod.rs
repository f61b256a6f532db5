use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use clap::{Args, Subcommand};
use muxprims_mux::{MuxConfig, ShutdownHandle};
use muxprims_transport::Endpoint;

use crate::exit::{CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections and echo every listed channel back to its sender.
    Echo(EchoArgs),
    /// Stream a payload on one channel.
    Send(SendArgs),
    /// Accept one connection and print what arrives on the listed channels.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, config: MuxConfig) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, config),
        Command::Send(args) => send::run(args, format, config),
        Command::Listen(args) => listen::run(args, format, config),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Endpoint to bind (unix:PATH, tcp:HOST:PORT or a socket path).
    pub endpoint: Endpoint,
    /// Channels to echo (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "1")]
    pub channels: Vec<u16>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Endpoint to connect to (unix:PATH, tcp:HOST:PORT or a socket path).
    pub endpoint: Endpoint,
    /// Channel to send on.
    #[arg(long, short = 'c', default_value = "1")]
    pub channel: u16,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file. Without --data or --file, stdin is sent.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// After sending, read the same channel until the peer closes it and
    /// print what arrives.
    #[arg(long)]
    pub wait: bool,
    /// Maximum silence while waiting for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Endpoint to bind (unix:PATH, tcp:HOST:PORT or a socket path).
    pub endpoint: Endpoint,
    /// Channels to read (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "1")]
    pub channels: Vec<u16>,
    /// Exit after printing N chunks.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Ctrl-C wiring shared by the long-running commands.
///
/// The handler flips `stopped` and shuts down whichever connection is
/// currently armed, so blocked channel readers see EOF.
#[derive(Clone)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
    current: Arc<Mutex<Option<ShutdownHandle>>>,
}

impl StopSignal {
    pub fn install() -> CliResult<Self> {
        let signal = Self {
            stopped: Arc::new(AtomicBool::new(false)),
            current: Arc::new(Mutex::new(None)),
        };
        let handler = signal.clone();
        ctrlc::set_handler(move || handler.trigger()).map_err(|err| {
            CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
        })?;
        Ok(signal)
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Make `handle` the connection torn down on Ctrl-C.
    pub fn arm(&self, handle: ShutdownHandle) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if self.stopped() {
            let _ = handle.shutdown();
        }
        *current = Some(handle);
    }

    pub fn disarm(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn trigger(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = current.as_ref() {
            if let Err(err) = handle.shutdown() {
                tracing::warn!(error = %err, "shutdown on interrupt failed");
            }
        }
    }
}
