use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One read from one input channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub channel: u16,
    pub data: Vec<u8>,
}

#[derive(Serialize)]
struct ChunkOutput<'a> {
    channel: u16,
    size: usize,
    payload: String,
    peer: &'a str,
    timestamp: String,
}

pub fn print_chunk(chunk: &Chunk, peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", chunk_json(chunk, peer));
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "SIZE", "PEER", "PAYLOAD"])
                .add_row(vec![
                    chunk.channel.to_string(),
                    chunk.data.len().to_string(),
                    peer.to_string(),
                    payload_preview(&chunk.data),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "channel={} size={} peer={} payload={}",
                chunk.channel,
                chunk.data.len(),
                peer,
                payload_preview(&chunk.data)
            );
        }
        OutputFormat::Raw => {
            print_raw(&chunk.data);
        }
    }
}

fn chunk_json(chunk: &Chunk, peer: &str) -> String {
    let out = ChunkOutput {
        channel: chunk.channel,
        size: chunk.data.len(),
        payload: payload_preview(&chunk.data),
        peer,
        timestamp: now_unix_seconds(),
    };
    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
