//! Optional line-delimited JSON process control endpoint (spec §6.3).
//! Commands: `ping`, `status`, `rekey`, `stop`. Grounded in the teacher
//! daemon's session/proof HTTP APIs (`session_api.rs`, `proof_api.rs`):
//! one task accepted per connection, request parsed into a typed value,
//! response serialized back as a single JSON line.

use crate::relay::{request_rekey, RelayShared};
use pqtun_core::types::{Role, SuiteId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Command {
    Ping,
    Status,
    Rekey { suite: String },
    Stop,
}

#[derive(Debug, Serialize)]
struct Reply {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<pqtun_telemetry::StatusSnapshot>,
}

impl Reply {
    fn ok() -> Self {
        Self { ok: true, error: None, status: None }
    }
    fn err(msg: impl Into<String>) -> Self {
        Self { ok: false, error: Some(msg.into()), status: None }
    }
    fn status(snapshot: pqtun_telemetry::StatusSnapshot) -> Self {
        Self { ok: true, error: None, status: Some(snapshot) }
    }
}

/// Bind the control listener and serve connections until the process
/// exits. Errors binding the port are fatal to the daemon (local
/// misconfiguration, spec §7's "only local misconfiguration... terminate
/// the process").
pub async fn serve(shared: Arc<RelayShared>, port: u16, full_session_id: bool) -> std::io::Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!(port, "control endpoint listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        let shared = shared.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(shared, stream, full_session_id).await {
                warn!(error = %e, %peer, "control connection ended with an error");
            }
        });
    }
}

async fn handle_connection(
    shared: Arc<RelayShared>,
    stream: tokio::net::TcpStream,
    full_session_id: bool,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<Command>(&line) {
            Ok(cmd) => handle_command(&shared, cmd, full_session_id).await,
            Err(e) => Reply::err(format!("invalid command: {e}")),
        };
        let mut out = serde_json::to_vec(&reply).unwrap_or_else(|_| b"{\"ok\":false}".to_vec());
        out.push(b'\n');
        write_half.write_all(&out).await?;
    }
    Ok(())
}

async fn handle_command(shared: &Arc<RelayShared>, cmd: Command, full_session_id: bool) -> Reply {
    match cmd {
        Command::Ping => Reply::ok(),
        Command::Status => Reply::status(shared.status_snapshot(full_session_id).await),
        Command::Rekey { suite } => {
            if !is_coordinator(shared).await {
                return Reply::err("coordinator_only");
            }
            match request_rekey(shared, SuiteId::from(suite)).await {
                Ok(()) => Reply::ok(),
                Err(e) => Reply::err(e.to_string()),
            }
        }
        Command::Stop => {
            shared.request_stop();
            Reply::ok()
        }
    }
}

async fn is_coordinator(shared: &Arc<RelayShared>) -> bool {
    let coordinator_role: Role = shared.control.lock().await.snapshot().coordinator_role;
    coordinator_role == shared.role
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_command_variant() {
        assert!(matches!(
            serde_json::from_str::<Command>(r#"{"cmd":"ping"}"#).unwrap(),
            Command::Ping
        ));
        assert!(matches!(
            serde_json::from_str::<Command>(r#"{"cmd":"status"}"#).unwrap(),
            Command::Status
        ));
        assert!(matches!(
            serde_json::from_str::<Command>(r#"{"cmd":"stop"}"#).unwrap(),
            Command::Stop
        ));
        match serde_json::from_str::<Command>(r#"{"cmd":"rekey","suite":"cs-mlkem768-aesgcm-mldsa65"}"#).unwrap() {
            Command::Rekey { suite } => assert_eq!(suite, "cs-mlkem768-aesgcm-mldsa65"),
            _ => panic!("expected Rekey"),
        }
    }

    #[test]
    fn rejects_unknown_command() {
        assert!(serde_json::from_str::<Command>(r#"{"cmd":"frobnicate"}"#).is_err());
    }
}
