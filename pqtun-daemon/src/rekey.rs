//! Background rekey handshake execution (spec §4.3.3/§4.3.4, §5's
//! "Rekey workers prepare the new context outside the lock"). Every
//! function here runs a fresh TCP handshake to completion and returns
//! the resulting [`HandshakeOutcome`]; none of them touch the active
//! context or the control state machine directly — `relay::run` does
//! the atomic swap once a handshake finishes.

use crate::errors::{DaemonError, Result};
use pqtun_core::suites::Suite;
use pqtun_crypto::handshake::{run_drone_handshake, run_gcs_handshake, HandshakeOutcome};
use pqtun_crypto::identity::SigningIdentity;
use pqtun_transport::HandshakeListener;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

/// GCS side: accept the drone's next handshake connection and run the
/// server half of the protocol. Shared via `Arc<AsyncMutex<_>>` because
/// the same listener also serves the very first (non-rekey) handshake.
pub async fn gcs_accept_and_handshake(
    listener: Arc<AsyncMutex<HandshakeListener>>,
    wire_version: u8,
    suite: &Suite,
    signing_identity: Arc<SigningIdentity>,
    psk: Vec<u8>,
    io_timeout: Duration,
) -> Result<HandshakeOutcome> {
    let (mut stream, peer) = {
        let mut guard = listener.lock().await;
        guard.accept().await.map_err(DaemonError::Io)?
    };
    tracing::info!(%peer, "accepted handshake connection");
    run_gcs_handshake(&mut stream, wire_version, suite, &signing_identity, &psk, io_timeout)
        .await
        .map_err(DaemonError::from)
}

/// Drone side: connect to the GCS handshake port and run the client half.
pub async fn drone_connect_and_handshake(
    gcs_addr: SocketAddr,
    connect_timeout: Duration,
    wire_version: u8,
    suite: &Suite,
    gcs_verifying_key: Vec<u8>,
    psk: Vec<u8>,
    io_timeout: Duration,
) -> Result<HandshakeOutcome> {
    let mut stream = pqtun_transport::connect_with_timeout(gcs_addr, connect_timeout)
        .await
        .map_err(DaemonError::Io)?;
    run_drone_handshake(&mut stream, wire_version, suite, &gcs_verifying_key, &psk, io_timeout)
        .await
        .map_err(DaemonError::from)
}
