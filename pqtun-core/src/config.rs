#![forbid(unsafe_code)]

//! Tunnel configuration (spec §6.1). Parses a TOML file into a strongly
//! typed structure and validates it once at startup — a validated
//! `TunnelConfig` is an immutable value type for the rest of the process'
//! lifetime. Unlike the teacher's `NyxConfig`, this does not support
//! file hot-reload: the data plane must not silently swap bound ports or
//! peer hosts under live traffic. The only thing allowed to change after
//! startup is the active suite, and that goes through the rekey control
//! path (`pqtun-stream::control`), never a file watch.

use crate::error::{Error, Result};
use crate::types::Role;
use serde::Deserialize;
use std::net::IpAddr;

fn default_wire_version() -> u8 {
    1
}
fn default_replay_window() -> u32 {
    1024
}
fn default_rekey_timeout_s() -> f64 {
    45.0
}
fn default_handshake_io_timeout_s() -> f64 {
    20.0
}
fn default_rl_burst() -> u32 {
    5
}
fn default_rl_refill_per_s() -> f64 {
    1.0
}
fn default_prune_interval_s() -> u64 {
    60
}
fn default_idle_ttl_s() -> u64 {
    600
}

/// Deployment mode gates a handful of checks (e.g. empty PSK) that are
/// only acceptable off of a production network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    #[default]
    Production,
    Development,
}

/// Top-level validated configuration record (spec §6.1's table).
#[derive(Debug, Clone, Deserialize)]
pub struct TunnelConfig {
    #[serde(default = "default_wire_version")]
    pub wire_version: u8,

    pub tcp_handshake_port: u16,
    pub udp_drone_rx: u16,
    pub udp_gcs_rx: u16,
    pub drone_plaintext_tx: u16,
    pub drone_plaintext_rx: u16,
    pub gcs_plaintext_tx: u16,
    pub gcs_plaintext_rx: u16,

    pub drone_host: IpAddr,
    pub gcs_host: IpAddr,

    #[serde(default = "default_loopback")]
    pub drone_plaintext_host: IpAddr,
    #[serde(default = "default_loopback")]
    pub gcs_plaintext_host: IpAddr,
    #[serde(default)]
    pub allow_non_loopback_plaintext: bool,

    /// 32-byte pre-shared key, hex-encoded (spec: "32-byte hex").
    #[serde(default)]
    pub drone_psk_hex: String,

    #[serde(default = "default_replay_window")]
    pub replay_window: u32,

    #[serde(default = "default_rekey_timeout_s")]
    pub rekey_handshake_timeout_s: f64,

    #[serde(default = "default_handshake_io_timeout_s")]
    pub handshake_io_timeout_s: f64,

    #[serde(default)]
    pub enable_packet_type: bool,
    #[serde(default)]
    pub strict_udp_peer_match: bool,
    #[serde(default)]
    pub strict_handshake_ip: bool,
    #[serde(default)]
    pub handshake_ip_allowlist: Vec<IpAddr>,

    pub control_coordinator_role: Role,

    /// DSCP/TOS value for the encrypted socket, 0-63. `None` leaves the
    /// socket's default TOS untouched.
    #[serde(default)]
    pub encrypted_dscp: Option<u8>,

    #[serde(default = "default_rl_burst")]
    pub handshake_rl_burst: u32,
    #[serde(default = "default_rl_refill_per_s")]
    pub handshake_rl_refill_per_s: f64,
    #[serde(default = "default_prune_interval_s")]
    pub handshake_rl_prune_interval_s: u64,
    #[serde(default = "default_idle_ttl_s")]
    pub handshake_rl_idle_ttl_s: u64,

    #[serde(default)]
    pub deployment_mode: DeploymentMode,

    /// Optional line-delimited JSON control endpoint (spec §6.3).
    pub control_endpoint_port: Option<u16>,

    /// Optional JSON status file path (spec §6.4).
    pub status_file_path: Option<std::path::PathBuf>,
    #[serde(default)]
    pub status_file_full_session_id: bool,

    #[serde(default)]
    pub log_level: Option<String>,
}

fn default_loopback() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

impl TunnelConfig {
    /// Load and validate a configuration file.
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(&path).map_err(Error::from)?;
        let cfg: TunnelConfig = toml::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Decoded pre-shared key bytes. Empty only when
    /// `deployment_mode = development` (checked by [`Self::validate`]).
    pub fn drone_psk(&self) -> Result<Vec<u8>> {
        if self.drone_psk_hex.is_empty() {
            return Ok(Vec::new());
        }
        hex::decode(&self.drone_psk_hex)
            .map_err(|e| Error::config(format!("DRONE_PSK is not valid hex: {e}")))
    }

    /// Enforce every rule spec §6.1 lists. Called once at startup; a
    /// `TunnelConfig` that survives this is treated as immutable for the
    /// rest of the process lifetime.
    pub fn validate(&self) -> Result<()> {
        if self.wire_version != 1 {
            return Err(Error::config(format!(
                "WIRE_VERSION must be 1, got {}",
                self.wire_version
            )));
        }

        for (name, port) in [
            ("TCP_HANDSHAKE_PORT", self.tcp_handshake_port),
            ("UDP_DRONE_RX", self.udp_drone_rx),
            ("UDP_GCS_RX", self.udp_gcs_rx),
            ("DRONE_PLAINTEXT_TX", self.drone_plaintext_tx),
            ("DRONE_PLAINTEXT_RX", self.drone_plaintext_rx),
            ("GCS_PLAINTEXT_TX", self.gcs_plaintext_tx),
            ("GCS_PLAINTEXT_RX", self.gcs_plaintext_rx),
        ] {
            if port == 0 {
                return Err(Error::config(format!("{name} must be a non-zero port")));
            }
        }

        if !(64..=8192).contains(&self.replay_window) {
            return Err(Error::config(format!(
                "REPLAY_WINDOW must be in [64, 8192], got {}",
                self.replay_window
            )));
        }

        if self.rekey_handshake_timeout_s < 10.0 {
            return Err(Error::config(format!(
                "REKEY_HANDSHAKE_TIMEOUT must be >= 10s, got {}",
                self.rekey_handshake_timeout_s
            )));
        }
        if self.handshake_io_timeout_s < 10.0 {
            return Err(Error::config(format!(
                "handshake io timeout must be >= 10s (floor), got {}",
                self.handshake_io_timeout_s
            )));
        }

        if !self.allow_non_loopback_plaintext {
            for (name, host) in [
                ("DRONE_PLAINTEXT_HOST", self.drone_plaintext_host),
                ("GCS_PLAINTEXT_HOST", self.gcs_plaintext_host),
            ] {
                if !host.is_loopback() {
                    return Err(Error::config(format!(
                        "{name} must be loopback unless allow_non_loopback_plaintext is set, got {host}"
                    )));
                }
            }
        }

        if self.drone_psk_hex.is_empty() && self.deployment_mode != DeploymentMode::Development {
            return Err(Error::config(
                "DRONE_PSK must not be empty outside deployment_mode = development",
            ));
        }
        if !self.drone_psk_hex.is_empty() {
            let bytes = self.drone_psk()?;
            if bytes.len() != 32 {
                return Err(Error::config(format!(
                    "DRONE_PSK must decode to 32 bytes, got {}",
                    bytes.len()
                )));
            }
        }

        if let Some(dscp) = self.encrypted_dscp {
            if dscp > 63 {
                return Err(Error::config(format!(
                    "ENCRYPTED_DSCP must be in [0, 63], got {dscp}"
                )));
            }
        }

        if self.handshake_rl_burst == 0 {
            return Err(Error::config("HANDSHAKE_RL_BURST must be > 0"));
        }
        if self.handshake_rl_refill_per_s <= 0.0 {
            return Err(Error::config("HANDSHAKE_RL_REFILL must be > 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_toml() -> String {
        r#"
            tcp_handshake_port = 46000
            udp_drone_rx = 47000
            udp_gcs_rx = 47001
            drone_plaintext_tx = 14550
            drone_plaintext_rx = 14551
            gcs_plaintext_tx = 14552
            gcs_plaintext_rx = 14553
            drone_host = "192.168.0.105"
            gcs_host = "192.168.0.100"
            drone_psk_hex = "0000000000000000000000000000000000000000000000000000000000000000"
            control_coordinator_role = "gcs"
        "#
        .to_string()
    }

    #[test]
    fn rejects_wrong_wire_version() {
        let toml_str = format!("{}\nwire_version = 2\n", base_toml());
        let cfg: TunnelConfig = toml::from_str(&toml_str).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_psk_of_wrong_length() {
        // 33 hex chars decodes to non-32 bytes once fixed to valid hex length.
        let toml_str = base_toml().replace(
            "drone_psk_hex = \"0000000000000000000000000000000000000000000000000000000000000000\"",
            "drone_psk_hex = \"00\"",
        );
        let cfg: TunnelConfig = toml::from_str(&toml_str).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_replay_window() {
        let toml_str = format!("{}\nreplay_window = 32\n", base_toml());
        let cfg: TunnelConfig = toml::from_str(&toml_str).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_non_loopback_plaintext_host_by_default() {
        let toml_str = format!(
            "{}\ndrone_plaintext_host = \"10.0.0.5\"\n",
            base_toml()
        );
        let cfg: TunnelConfig = toml::from_str(&toml_str).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn allows_non_loopback_plaintext_when_opted_in() {
        let toml_str = format!(
            "{}\ndrone_plaintext_host = \"10.0.0.5\"\nallow_non_loopback_plaintext = true\n",
            base_toml()
        );
        let cfg: TunnelConfig = toml::from_str(&toml_str).unwrap();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn allows_empty_psk_only_in_development() {
        let toml_str = base_toml().replace(
            "drone_psk_hex = \"0000000000000000000000000000000000000000000000000000000000000000\"",
            "",
        );
        let cfg: TunnelConfig = toml::from_str(&toml_str).unwrap();
        assert!(cfg.validate().is_err());

        let toml_str = format!("{toml_str}\ndeployment_mode = \"development\"\n");
        let cfg: TunnelConfig = toml::from_str(&toml_str).unwrap();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn valid_config_passes() {
        let cfg: TunnelConfig = toml::from_str(&base_toml()).unwrap();
        assert!(cfg.validate().is_ok());
    }
}
