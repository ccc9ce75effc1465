//! Shared value types used across the tunnel workspace.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Which side of the drone/GCS link this process is acting as.
///
/// The wire protocol and the control state machine are symmetric modulo
/// this tag: it decides who listens for the TCP handshake, which half of
/// the HKDF output each side selects, and who may originate a rekey when
/// `coordinator_role` names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Drone,
    Gcs,
}

impl Role {
    /// The other side of the link.
    pub fn peer(self) -> Role {
        match self {
            Role::Drone => Role::Gcs,
            Role::Gcs => Role::Drone,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Drone => write!(f, "drone"),
            Role::Gcs => write!(f, "gcs"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drone" => Ok(Role::Drone),
            "gcs" => Ok(Role::Gcs),
            other => Err(crate::error::Error::config(format!(
                "unknown role '{other}', expected 'drone' or 'gcs'"
            ))),
        }
    }
}

/// Stable string identifier for a cryptographic suite, e.g.
/// `"cs-mlkem768-aesgcm-mldsa65"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuiteId(pub String);

impl SuiteId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SuiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SuiteId {
    fn from(s: &str) -> Self {
        SuiteId(s.to_string())
    }
}

impl From<String> for SuiteId {
    fn from(s: String) -> Self {
        SuiteId(s)
    }
}

/// The four header identifier bytes derived from a suite's KEM and
/// signature algorithm names (spec §3.1, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderIds {
    pub kem_id: u8,
    pub kem_param: u8,
    pub sig_id: u8,
    pub sig_param: u8,
}

/// Millisecond-precision wall clock timestamp, used for the status file
/// and for the counters' `last_rekey` / `started_at` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimestampMs(pub u64);

impl TimestampMs {
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(now.as_millis() as u64)
    }
}

impl fmt::Display for TimestampMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_roundtrips_through_display_and_parse() {
        assert_eq!("drone".parse::<Role>().unwrap(), Role::Drone);
        assert_eq!("gcs".parse::<Role>().unwrap(), Role::Gcs);
        assert!("bogus".parse::<Role>().is_err());
        assert_eq!(Role::Drone.peer(), Role::Gcs);
        assert_eq!(Role::Drone.to_string(), "drone");
    }

    #[test]
    fn timestamp_now_is_nonzero() {
        assert!(TimestampMs::now().0 > 0);
    }
}
