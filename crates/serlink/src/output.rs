use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serlink_frame::Reply;
use serlink_peer::TelemetryEvent;

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

#[derive(Serialize)]
struct ReplyOutput<'a> {
    command: &'a str,
    status: &'a str,
    data: Option<&'a str>,
    timestamp: String,
}

pub fn print_reply(command: &str, reply: &Reply, format: OutputFormat) {
    let status = if reply.is_ack() { "ack" } else { "nack" };
    match format {
        OutputFormat::Json => {
            let out = ReplyOutput {
                command,
                status,
                data: reply.field(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "STATUS", "DATA"])
                .add_row(vec![
                    command.to_string(),
                    status.to_uppercase(),
                    reply.field().unwrap_or("-").to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{command} -> {reply}");
        }
        OutputFormat::Raw => {
            print_raw(reply.field().unwrap_or_default().as_bytes());
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    kind: &'a str,
    text: &'a str,
}

pub fn print_event(event: &TelemetryEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let (kind, text) = match event {
                TelemetryEvent::Line(text) => ("telemetry", text.as_str()),
                TelemetryEvent::Frame(text) => ("frame", text.as_str()),
            };
            let out = EventOutput { kind, text };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        // Monitor output is a stream; tables add nothing over plain lines.
        OutputFormat::Table | OutputFormat::Pretty | OutputFormat::Raw => {
            println!("{event}");
        }
    }
}

#[derive(Serialize)]
struct WatchdogOutput {
    connected: bool,
    timestamp: String,
}

pub fn print_watchdog(connected: bool, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = WatchdogOutput {
                connected,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty | OutputFormat::Raw => {
            if connected {
                println!("watchdog: device responsive");
            } else {
                println!("watchdog: no response");
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
