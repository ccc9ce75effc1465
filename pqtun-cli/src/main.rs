#![forbid(unsafe_code)]

//! Thin client for a running daemon's process control endpoint (spec
//! §6.3): connects over TCP, sends one line-delimited JSON command, and
//! prints the reply.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(name = "pqtun-cli", about = "Control client for a running pqtun daemon")]
struct Cli {
    /// Control endpoint port (the daemon's `control_endpoint_port`).
    #[arg(long, default_value_t = 4700)]
    port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the daemon is alive.
    Ping,
    /// Print session id, current suite, and counters.
    Status,
    /// Request a rekey to a new suite (coordinator side only).
    Rekey {
        /// Suite id, e.g. cs-mlkem768-aesgcm-mldsa65.
        suite: String,
    },
    /// Request an orderly shutdown.
    Stop,
}

#[derive(Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Request {
    Ping,
    Status,
    Rekey { suite: String },
    Stop,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let request = match cli.command {
        Command::Ping => Request::Ping,
        Command::Status => Request::Status,
        Command::Rekey { suite } => Request::Rekey { suite },
        Command::Stop => Request::Stop,
    };

    let reply = send(cli.port, &request).await?;
    print_reply(&reply);
    Ok(())
}

async fn send(port: u16, request: &Request) -> Result<Value> {
    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .with_context(|| format!("connecting to control endpoint on port {port}"))?;

    let mut line = serde_json::to_vec(request)?;
    line.push(b'\n');
    stream.write_all(&line).await.context("writing command")?;

    let (read_half, _write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut response = String::new();
    reader.read_line(&mut response).await.context("reading reply")?;
    if response.is_empty() {
        bail!("control endpoint closed the connection without a reply");
    }

    serde_json::from_str(response.trim_end()).context("parsing reply as JSON")
}

fn print_reply(reply: &Value) {
    let ok = reply.get("ok").and_then(Value::as_bool).unwrap_or(false);
    if !ok {
        let error = reply.get("error").and_then(Value::as_str).unwrap_or("unknown error");
        eprintln!("error: {error}");
        return;
    }

    match reply.get("status") {
        Some(status) => print_status_table(status),
        None => println!("ok"),
    }
}

fn print_status_table(status: &Value) {
    let mut table = Table::new();
    table.set_header(vec!["field", "value"]);
    if let Some(session_id) = status.get("session_id").and_then(Value::as_str) {
        table.add_row(vec!["session_id", session_id]);
    }
    if let Some(suite_id) = status.get("suite_id").and_then(Value::as_str) {
        table.add_row(vec!["suite_id", suite_id]);
    }
    if let Some(counters) = status.get("counters") {
        for key in [
            "plaintext_in_packets",
            "plaintext_out_packets",
            "encrypted_in_packets",
            "encrypted_out_packets",
            "drop_replay",
            "drop_auth",
            "drop_session_epoch",
            "drop_src_addr",
            "drop_other",
            "rekeys_ok",
            "rekeys_fail",
        ] {
            if let Some(value) = counters.get(key) {
                table.add_row(vec![key.to_string(), value.to_string()]);
            }
        }
    }
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_tagged_cmd_field() {
        let v = serde_json::to_value(Request::Ping).unwrap();
        assert_eq!(v["cmd"], "ping");

        let v = serde_json::to_value(Request::Rekey { suite: "cs-mlkem768-aesgcm-mldsa65".to_string() }).unwrap();
        assert_eq!(v["cmd"], "rekey");
        assert_eq!(v["suite"], "cs-mlkem768-aesgcm-mldsa65");
    }
}
