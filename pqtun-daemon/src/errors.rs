//! Error taxonomy for the daemon binary: everything that aborts process
//! startup or a single rekey attempt. Per-packet failures never reach
//! here — those stay typed [`pqtun_core::DropReason`] and are handled by
//! the relay loop's counters (spec §7).

use thiserror::Error;

pub type Result<T, E = DaemonError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(#[from] pqtun_core::Error),

    #[error("crypto: {0}")]
    Crypto(#[from] pqtun_crypto::Error),

    #[error("rekey attempt failed: {0}")]
    Rekey(String),
}

impl DaemonError {
    pub fn rekey(msg: impl Into<String>) -> Self {
        Self::Rekey(msg.into())
    }
}
