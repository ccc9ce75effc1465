//! The per-role relay event loop (spec §4.4): binds the encrypted and
//! plaintext UDP endpoints, ferries datagrams between them through the
//! active AEAD context, and drives the rekey control state machine.
//!
//! The original proxy's design (spec §4.4.2) describes a single-threaded
//! readiness poll with a <=100ms timeout; this is the idiomatic tokio
//! equivalent, `tokio::select!` over the same four readiness sources
//! (stop signal, outbound control queue, plaintext ingress, encrypted
//! ingress) instead of a manual poll-and-dispatch loop.

use crate::context::{ActiveContext, SharedContext};
use crate::errors::{DaemonError, Result};
use crate::rekey;
use pqtun_core::counters::Counters;
use pqtun_core::error::DropReason;
use pqtun_core::suites::get_suite;
use pqtun_core::types::{Role, SuiteId};
use pqtun_core::config::TunnelConfig;
use pqtun_crypto::aead::AeadCipher;
use pqtun_crypto::identity::SigningIdentity;
use pqtun_crypto::kdf::fit_to_aead_key_len;
use pqtun_stream::{control::ControlAction, ControlFrame, ControlState, Receiver, Sender};
use pqtun_stream::control::PACKET_TYPE_CONTROL;
use pqtun_stream::control::PACKET_TYPE_DATA;
use pqtun_telemetry::{format_session_id, write_status_file, StatusSnapshot};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tracing::{info, warn};

const PLAINTEXT_BUF_LEN: usize = 16 * 1024;
const ENCRYPTED_BUF_LEN: usize = 65 * 1024;

/// Proactive-rekey headroom for `Sender::seq_remaining` (spec §4.1.3's
/// "forbidden past epoch 255" plus a sender that never silently overruns
/// its sequence space). Not a spec-mandated number; chosen high enough
/// that a coordinator has ample time to complete a rekey before
/// `SequenceOverflow` actually triggers.
const DEFAULT_REKEY_THRESHOLD: u64 = 1_000_000_000;

struct SessionInfo {
    session_id: [u8; 8],
    suite_id: SuiteId,
}

/// Handshake material needed to run a GCS-side (server) handshake,
/// shared between the initial handshake and every subsequent rekey.
pub struct GcsHandshakeMaterial {
    pub listener: Arc<AsyncMutex<pqtun_transport::HandshakeListener>>,
    pub signing_identity: Arc<SigningIdentity>,
}

/// Handshake material needed to run a drone-side (client) handshake.
pub struct DroneHandshakeMaterial {
    pub gcs_addr: SocketAddr,
    pub gcs_verifying_key: Vec<u8>,
}

/// Everything the relay loop and its spawned rekey tasks share.
pub struct RelayShared {
    pub role: Role,
    pub ctx: SharedContext,
    pub counters: Arc<Counters>,
    pub control: Arc<AsyncMutex<ControlState>>,
    pub outbox_tx: mpsc::UnboundedSender<ControlFrame>,
    pub stop_tx: watch::Sender<bool>,
    session_info: Arc<StdMutex<SessionInfo>>,
    rid_counter: AtomicU64,

    pub wire_version: u8,
    pub enable_packet_type: bool,
    pub strict_udp_peer_match: bool,
    pub io_timeout: Duration,
    pub rekey_handshake_timeout: Duration,
    pub replay_window: usize,
    pub psk: Vec<u8>,
    pub gcs: Option<GcsHandshakeMaterial>,
    pub drone: Option<DroneHandshakeMaterial>,
}

impl RelayShared {
    fn next_rid(&self) -> String {
        format!("rk-{}", self.rid_counter.fetch_add(1, Ordering::Relaxed))
    }

    async fn update_session_info(&self, session_id: [u8; 8], suite_id: SuiteId) {
        let mut guard = self.session_info.lock().unwrap();
        guard.session_id = session_id;
        guard.suite_id = suite_id;
    }

    pub async fn status_snapshot(&self, full_session_id: bool) -> StatusSnapshot {
        let guard = self.session_info.lock().unwrap();
        StatusSnapshot {
            session_id: format_session_id(&guard.session_id, full_session_id),
            suite_id: guard.suite_id.as_str().to_string(),
            counters: self.counters.snapshot(),
        }
    }

    pub fn request_stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

/// Build the initial [`ActiveContext`] and [`RelayShared`] from a
/// completed handshake outcome.
pub fn context_from_outcome(
    wire_version: u8,
    suite: &pqtun_core::suites::Suite,
    enc_peer: SocketAddr,
    outcome: pqtun_crypto::handshake::HandshakeOutcome,
    replay_window: usize,
) -> Result<ActiveContext> {
    let send_key = fit_to_aead_key_len(&outcome.key_send, suite.aead_token.key_len())
        .map_err(DaemonError::from)?;
    let recv_key = fit_to_aead_key_len(&outcome.key_recv, suite.aead_token.key_len())
        .map_err(DaemonError::from)?;
    let send_cipher = AeadCipher::new(suite.aead_token, send_key).map_err(DaemonError::from)?;
    let recv_cipher = AeadCipher::new(suite.aead_token, recv_key).map_err(DaemonError::from)?;

    let sender = Sender::new(wire_version, suite.header_ids, outcome.session_id, send_cipher, DEFAULT_REKEY_THRESHOLD);
    let receiver = Receiver::new(wire_version, suite.header_ids, outcome.session_id, recv_cipher, replay_window);

    Ok(ActiveContext {
        sender,
        receiver,
        session_id: outcome.session_id,
        enc_peer,
        suite: suite.clone(),
    })
}

#[allow(clippy::too_many_arguments)]
pub fn new_shared(
    role: Role,
    ctx: SharedContext,
    control: ControlState,
    wire_version: u8,
    enable_packet_type: bool,
    strict_udp_peer_match: bool,
    io_timeout: Duration,
    rekey_handshake_timeout: Duration,
    replay_window: usize,
    psk: Vec<u8>,
    initial_session_id: [u8; 8],
    initial_suite_id: SuiteId,
    gcs: Option<GcsHandshakeMaterial>,
    drone: Option<DroneHandshakeMaterial>,
) -> (Arc<RelayShared>, mpsc::UnboundedReceiver<ControlFrame>, watch::Receiver<bool>) {
    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = watch::channel(false);
    let shared = Arc::new(RelayShared {
        role,
        ctx,
        counters: Arc::new(Counters::new()),
        control: Arc::new(AsyncMutex::new(control)),
        outbox_tx,
        stop_tx,
        session_info: Arc::new(StdMutex::new(SessionInfo {
            session_id: initial_session_id,
            suite_id: initial_suite_id,
        })),
        rid_counter: AtomicU64::new(1),
        wire_version,
        enable_packet_type,
        strict_udp_peer_match,
        io_timeout,
        rekey_handshake_timeout,
        replay_window,
        psk,
        gcs,
        drone,
    });
    (shared, outbox_rx, stop_rx)
}

/// Dispatch a [`ControlAction`] produced by the control state machine:
/// queue frames for the outbox, or kick off a background rekey attempt.
async fn dispatch_action(shared: &Arc<RelayShared>, action: ControlAction) {
    match action {
        ControlAction::Send(frames) => {
            for frame in frames {
                let _ = shared.outbox_tx.send(frame);
            }
        }
        ControlAction::BeginCoordinatorHandshake(suite_id) => {
            spawn_rekey(shared.clone(), suite_id);
        }
        ControlAction::BeginFollowerHandshake => {
            let pending = shared.control.lock().await.snapshot().pending_suite;
            if let Some(suite_id) = pending {
                spawn_rekey(shared.clone(), suite_id);
            } else {
                warn!("follower asked to begin a rekey handshake with no pending suite recorded");
            }
        }
        ControlAction::None => {}
    }
}

/// Run a full rekey handshake in the background and, on completion,
/// atomically swap the active context and notify the control state
/// machine (spec §4.3.3/§4.3.4, §5's "prepare outside the lock").
fn spawn_rekey(shared: Arc<RelayShared>, suite_id: SuiteId) {
    tokio::spawn(async move {
        let outcome = run_rekey_handshake(&shared, &suite_id).await;
        let follow_up = match outcome {
            Ok((new_suite, handshake)) => {
                let old_suite_id = shared.ctx.suite_id().await;
                let enc_peer = shared.ctx.lock().await.enc_peer;
                match context_from_outcome(shared.wire_version, &new_suite, enc_peer, handshake, shared.replay_window) {
                    Ok(new_ctx) => {
                        let suite_changed = old_suite_id != new_suite.suite_id;
                        shared.ctx.swap(new_ctx).await;
                        shared
                            .update_session_info(shared.ctx.session_id().await, new_suite.suite_id.clone())
                            .await;
                        shared.counters.record_rekey_ok(suite_changed);
                        info!(suite = %new_suite.suite_id, "rekey completed");
                        shared.control.lock().await.record_rekey_success(new_suite.suite_id)
                    }
                    Err(e) => {
                        warn!(error = %e, "rekey handshake succeeded but context rebuild failed");
                        shared.counters.record_rekey_fail();
                        shared.control.lock().await.record_rekey_failure()
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "rekey handshake failed");
                shared.counters.record_rekey_fail();
                shared.control.lock().await.record_rekey_failure()
            }
        };
        dispatch_action(&shared, follow_up).await;
    });
}

async fn run_rekey_handshake(
    shared: &Arc<RelayShared>,
    suite_id: &SuiteId,
) -> Result<(pqtun_core::suites::Suite, pqtun_crypto::handshake::HandshakeOutcome)> {
    let suite = get_suite(suite_id.as_str()).map_err(DaemonError::from)?;
    let outcome = tokio::time::timeout(shared.rekey_handshake_timeout, async {
        match shared.role {
            Role::Gcs => {
                let gcs = shared.gcs.as_ref().expect("gcs handshake material missing on gcs role");
                rekey::gcs_accept_and_handshake(
                    gcs.listener.clone(),
                    shared.wire_version,
                    &suite,
                    gcs.signing_identity.clone(),
                    shared.psk.clone(),
                    shared.io_timeout,
                )
                .await
            }
            Role::Drone => {
                let drone = shared.drone.as_ref().expect("drone handshake material missing on drone role");
                rekey::drone_connect_and_handshake(
                    drone.gcs_addr,
                    shared.io_timeout,
                    shared.wire_version,
                    &suite,
                    drone.gcs_verifying_key.clone(),
                    shared.psk.clone(),
                    shared.io_timeout,
                )
                .await
            }
        }
    })
    .await
    .map_err(|_| DaemonError::rekey("rekey handshake timed out"))??;
    Ok((suite, outcome))
}

/// Initiate a coordinator-side rekey to `suite_id` (spec §4.3.1). Used by
/// both the process control endpoint's `rekey` command and any future
/// sequence-threshold trigger.
pub async fn request_rekey(shared: &Arc<RelayShared>, suite_id: SuiteId) -> Result<()> {
    let action = {
        let mut control = shared.control.lock().await;
        let rid = shared.next_rid();
        control.request_rekey(rid, suite_id).map_err(DaemonError::from)?
    };
    dispatch_action(shared, action).await;
    Ok(())
}

fn control_payload(enable_packet_type: bool, frame: &ControlFrame) -> Result<Vec<u8>> {
    let mut payload = if enable_packet_type { vec![PACKET_TYPE_CONTROL] } else { Vec::new() };
    payload.extend_from_slice(&frame.encode().map_err(DaemonError::from)?);
    Ok(payload)
}

/// Run the relay loop until a stop is requested. Binds nothing itself —
/// `enc_rx` and `pt_local` are owned by the caller so tests can swap in
/// sockets bound to ephemeral ports.
pub async fn run_loop(
    shared: Arc<RelayShared>,
    enc_rx: UdpSocket,
    pt_local: UdpSocket,
    mut pt_peer: SocketAddr,
    mut outbox_rx: mpsc::UnboundedReceiver<ControlFrame>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut pt_buf = vec![0u8; PLAINTEXT_BUF_LEN];
    let mut enc_buf = vec![0u8; ENCRYPTED_BUF_LEN];

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            Some(frame) = outbox_rx.recv() => {
                let enc_peer = shared.ctx.lock().await.enc_peer;
                match control_payload(shared.enable_packet_type, &frame) {
                    Ok(payload) => {
                        let mut ctx = shared.ctx.lock().await;
                        match ctx.sender.encrypt(&payload) {
                            Ok(wire) => {
                                drop(ctx);
                                if let Err(e) = enc_rx.send_to(&wire, enc_peer).await {
                                    warn!(error = %e, "failed to send control frame");
                                } else {
                                    shared.counters.record_encrypted_out(wire.len());
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "failed to encrypt outbound control frame");
                                shared.counters.record_drop(DropReason::Other);
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to encode outbound control frame"),
                }
            }
            Ok((n, src)) = pt_local.recv_from(&mut pt_buf) => {
                if n == 0 {
                    continue;
                }
                pt_peer = src;
                shared.counters.record_plaintext_in(n);
                let mut payload = if shared.enable_packet_type { vec![PACKET_TYPE_DATA] } else { Vec::new() };
                payload.extend_from_slice(&pt_buf[..n]);

                let enc_peer = shared.ctx.lock().await.enc_peer;
                let mut ctx = shared.ctx.lock().await;
                match ctx.sender.encrypt(&payload) {
                    Ok(wire) => {
                        drop(ctx);
                        if let Err(e) = enc_rx.send_to(&wire, enc_peer).await {
                            warn!(error = %e, "failed to send encrypted datagram");
                        } else {
                            shared.counters.record_encrypted_out(wire.len());
                        }
                    }
                    Err(pqtun_core::error::Error::SequenceOverflow) => {
                        drop(ctx);
                        shared.counters.record_drop(DropReason::Other);
                        if shared.control.lock().await.is_coordinator() {
                            let current_suite = shared.ctx.suite_id().await;
                            if let Err(e) = request_rekey(&shared, current_suite).await {
                                warn!(error = %e, "failed to originate sequence-overflow rekey");
                            }
                        }
                    }
                    Err(e) => {
                        drop(ctx);
                        warn!(error = %e, "failed to encrypt plaintext ingress");
                        shared.counters.record_drop(DropReason::Other);
                    }
                }
            }
            Ok((n, src)) = enc_rx.recv_from(&mut enc_buf) => {
                if n == 0 {
                    continue;
                }
                let expected_peer = shared.ctx.lock().await.enc_peer;
                if !pqtun_transport::matches_peer(shared.strict_udp_peer_match, src, expected_peer) {
                    shared.counters.record_drop(DropReason::SrcAddr);
                    continue;
                }

                let plaintext = {
                    let mut ctx = shared.ctx.lock().await;
                    ctx.receiver.decrypt_silent(&enc_buf[..n])
                };
                let Some(plaintext) = plaintext else {
                    let reason = shared.ctx.lock().await.receiver.last_error_reason().unwrap_or(DropReason::Other);
                    shared.counters.record_drop(reason);
                    continue;
                };
                shared.counters.record_encrypted_in(n);

                if shared.enable_packet_type {
                    match plaintext.first() {
                        Some(&PACKET_TYPE_CONTROL) => {
                            match ControlFrame::decode(&plaintext[1..]) {
                                Ok(frame) => {
                                    let action = shared.control.lock().await.handle_frame(frame);
                                    dispatch_action(&shared, action).await;
                                }
                                Err(e) => {
                                    warn!(error = %e, "failed to decode control frame");
                                    shared.counters.record_drop(DropReason::Other);
                                }
                            }
                        }
                        Some(&PACKET_TYPE_DATA) => {
                            if let Err(e) = pt_local.send_to(&plaintext[1..], pt_peer).await {
                                warn!(error = %e, "failed to deliver plaintext datagram");
                            } else {
                                shared.counters.record_plaintext_out(plaintext.len() - 1);
                            }
                        }
                        _ => shared.counters.record_drop(DropReason::Other),
                    }
                } else if let Err(e) = pt_local.send_to(&plaintext, pt_peer).await {
                    warn!(error = %e, "failed to deliver plaintext datagram");
                } else {
                    shared.counters.record_plaintext_out(plaintext.len());
                }
            }
        }
    }
    info!("relay loop stopped");
}

/// Spawn the periodic status-file writer (spec §6.4), if configured.
/// Written as its own interval loop rather than
/// `pqtun_telemetry::spawn_periodic_writer`: that helper's snapshot
/// callback is synchronous, but building a snapshot here needs the
/// async active-context lock.
pub fn maybe_spawn_status_writer(
    shared: Arc<RelayShared>,
    config: &TunnelConfig,
) -> Option<tokio::task::JoinHandle<()>> {
    let path = config.status_file_path.clone()?;
    let full = config.status_file_full_session_id;
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            let snapshot = shared.status_snapshot(full).await;
            if let Err(e) = write_status_file(&path, &snapshot).await {
                warn!(error = %e, path = %path.display(), "failed to write status file");
            }
        }
    }))
}

/// Write the status file once, outside the periodic schedule (handshake
/// and rekey events, per spec §6.4).
pub async fn write_status_now(shared: &Arc<RelayShared>, config: &TunnelConfig) {
    let Some(path) = &config.status_file_path else { return };
    let snapshot = shared.status_snapshot(config.status_file_full_session_id).await;
    if let Err(e) = write_status_file(path, &snapshot).await {
        warn!(error = %e, "failed to write status file");
    }
}
