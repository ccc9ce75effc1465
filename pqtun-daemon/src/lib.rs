//! Daemon entry point: wires identity stores, runs the initial handshake,
//! binds the relay's UDP endpoints (spec §4.4.1), and drives the relay
//! loop until shutdown. Grounded in the teacher daemon's `run()` in
//! `main.rs`, which performs the analogous bind-then-select sequence for
//! its own transport/control stack.

#![forbid(unsafe_code)]

pub mod context;
pub mod control_endpoint;
pub mod errors;
pub mod logging;
pub mod relay;
pub mod rekey;

use crate::context::SharedContext;
use crate::errors::{DaemonError, Result};
use pqtun_core::config::TunnelConfig;
use pqtun_core::suites::{get_suite, DEFAULT_SUITE_ID};
use pqtun_core::types::Role;
use pqtun_crypto::identity::{FileIdentityStore, GeneratedSigningKeyStore, PeerPublicKeyStore, SigningKeyStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

/// Run the daemon for `role` until a stop is requested (via the process
/// control endpoint's `stop` command, or an external signal the caller
/// wires into `shared.request_stop()`).
pub async fn run(role: Role, config: TunnelConfig, identity_dir: PathBuf) -> Result<()> {
    let suite = get_suite(DEFAULT_SUITE_ID).map_err(DaemonError::from)?;
    let psk = config.drone_psk().map_err(DaemonError::from)?;

    let peer_store = FileIdentityStore::new(&identity_dir);
    let signing_store = GeneratedSigningKeyStore::new(Some(identity_dir.clone()));

    let io_timeout = Duration::from_secs_f64(config.handshake_io_timeout_s);
    let rekey_timeout = Duration::from_secs_f64(config.rekey_handshake_timeout_s);

    let allowlist = if config.strict_handshake_ip && !config.handshake_ip_allowlist.is_empty() {
        Some(config.handshake_ip_allowlist.iter().copied().collect())
    } else {
        None
    };

    let (ctx, enc_peer, gcs_material, drone_material) = match role {
        Role::Gcs => {
            let bind_addr = SocketAddr::new(config.gcs_host, config.tcp_handshake_port);
            let listener = pqtun_transport::HandshakeListener::bind(
                bind_addr,
                config.handshake_rl_burst,
                config.handshake_rl_refill_per_s,
                Duration::from_secs(config.handshake_rl_prune_interval_s),
                Duration::from_secs(config.handshake_rl_idle_ttl_s),
                allowlist,
            )
            .await
            .map_err(DaemonError::Io)?;
            let listener = Arc::new(AsyncMutex::new(listener));
            let signing_identity = signing_store
                .load_signing_secret(suite.sig_name)
                .map_err(DaemonError::from)?;

            let outcome = rekey::gcs_accept_and_handshake(
                listener.clone(),
                config.wire_version,
                &suite,
                signing_identity.clone(),
                psk.clone(),
                io_timeout,
            )
            .await?;

            let enc_peer = SocketAddr::new(config.drone_host, config.udp_drone_rx);
            let ctx = relay::context_from_outcome(
                config.wire_version,
                &suite,
                enc_peer,
                outcome,
                config.replay_window as usize,
            )?;
            (
                ctx,
                enc_peer,
                Some(relay::GcsHandshakeMaterial { listener, signing_identity }),
                None,
            )
        }
        Role::Drone => {
            let gcs_addr = SocketAddr::new(config.gcs_host, config.tcp_handshake_port);
            let gcs_verifying_key = peer_store.load_peer_public("gcs").map_err(DaemonError::from)?;

            let outcome = rekey::drone_connect_and_handshake(
                gcs_addr,
                io_timeout,
                config.wire_version,
                &suite,
                gcs_verifying_key.clone(),
                psk.clone(),
                io_timeout,
            )
            .await?;

            let enc_peer = SocketAddr::new(config.gcs_host, config.udp_gcs_rx);
            let ctx = relay::context_from_outcome(
                config.wire_version,
                &suite,
                enc_peer,
                outcome,
                config.replay_window as usize,
            )?;
            (
                ctx,
                enc_peer,
                None,
                Some(relay::DroneHandshakeMaterial { gcs_addr, gcs_verifying_key }),
            )
        }
    };

    let session_id = ctx.session_id;
    let shared_ctx = SharedContext::new(ctx);
    let control = pqtun_stream::ControlState::new(role, config.control_coordinator_role, suite.suite_id.clone());

    let (shared, outbox_rx, stop_rx) = relay::new_shared(
        role,
        shared_ctx,
        control,
        config.wire_version,
        config.enable_packet_type,
        config.strict_udp_peer_match,
        io_timeout,
        rekey_timeout,
        config.replay_window as usize,
        psk,
        session_id,
        suite.suite_id.clone(),
        gcs_material,
        drone_material,
    );

    relay::write_status_now(&shared, &config).await;
    let _status_writer = relay::maybe_spawn_status_writer(shared.clone(), &config);

    if let Some(port) = config.control_endpoint_port {
        let shared = shared.clone();
        let full = config.status_file_full_session_id;
        tokio::spawn(async move {
            if let Err(e) = control_endpoint::serve(shared, port, full).await {
                tracing::error!(error = %e, "control endpoint stopped");
            }
        });
    }

    let (enc_rx, pt_local, pt_peer) = match role {
        Role::Drone => {
            let enc_rx = pqtun_transport::bind_udp(
                SocketAddr::new("0.0.0.0".parse().unwrap(), config.udp_drone_rx),
                config.encrypted_dscp,
            )
            .map_err(DaemonError::Io)?;
            let pt_local = pqtun_transport::bind_udp(
                SocketAddr::new(config.drone_plaintext_host, config.drone_plaintext_tx),
                None,
            )
            .map_err(DaemonError::Io)?;
            let pt_peer = SocketAddr::new(config.drone_plaintext_host, config.drone_plaintext_rx);
            (enc_rx, pt_local, pt_peer)
        }
        Role::Gcs => {
            let enc_rx = pqtun_transport::bind_udp(
                SocketAddr::new("0.0.0.0".parse().unwrap(), config.udp_gcs_rx),
                config.encrypted_dscp,
            )
            .map_err(DaemonError::Io)?;
            let pt_local = pqtun_transport::bind_udp(
                SocketAddr::new(config.gcs_plaintext_host, config.gcs_plaintext_tx),
                None,
            )
            .map_err(DaemonError::Io)?;
            let pt_peer = SocketAddr::new(config.gcs_plaintext_host, config.gcs_plaintext_rx);
            (enc_rx, pt_local, pt_peer)
        }
    };

    info!(?role, %enc_peer, "initial handshake complete, entering relay loop");
    relay::run_loop(shared, enc_rx, pt_local, pt_peer, outbox_rx, stop_rx).await;
    Ok(())
}
