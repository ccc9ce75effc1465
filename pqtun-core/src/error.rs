//! Error taxonomy for the tunnel core (spec §7).
//!
//! The data plane never panics on remote input: [`DropReason`] covers every
//! outcome attributable to the network or an attacker and is handled by
//! silently dropping the packet and incrementing a counter. [`Error`]
//! covers everything else: startup and handshake failures that abort a
//! connection, or for configuration, refuse to start at all.

use std::fmt;
use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde: {0}")]
    Json(#[from] serde_json::Error),

    /// Startup misconfiguration. Fatal; the process refuses to start.
    #[error("config: {0}")]
    Config(String),

    /// Malformed handshake wire data, truncated frame, or wrong version.
    #[error("format: {0}")]
    Format(String),

    /// Signature/HMAC mismatch or suite downgrade detected during handshake.
    #[error("verify: {0}")]
    Verify(String),

    /// AEAD construction or internal cipher failure (not an auth failure).
    #[error("aead internal: {0}")]
    AeadInternal(String),

    /// Sender's sequence counter reached `rekey_threshold`.
    #[error("sequence overflow")]
    SequenceOverflow,

    /// `Sender::bump_epoch` called when `epoch == 255`.
    #[error("epoch wrap")]
    EpochWrap,

    /// Generic protocol-level violation not covered by a more specific variant.
    #[error("protocol: {0}")]
    Protocol(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }
    pub fn verify(msg: impl Into<String>) -> Self {
        Self::Verify(msg.into())
    }
    pub fn aead_internal(msg: impl Into<String>) -> Self {
        Self::AeadInternal(msg.into())
    }
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

// Map TOML deserialization errors into the config error domain without adding a new variant.
impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

/// Reasons a receiver (or the relay's peer-address check) drops a packet
/// silently, one per spec §7 drop counter. Carries no backtrace and is
/// cheap to construct on the hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Wire too short, or (version, kem_id, kem_param, sig_id, sig_param) mismatch.
    Header,
    /// `session_id` or `epoch` does not match the active session.
    SessionEpoch,
    /// Sliding-window replay check rejected the sequence number.
    Replay,
    /// AEAD authentication failed.
    Auth,
    /// Source (ip[, port]) did not match the enforced peer address.
    SrcAddr,
    /// Anything else: AEAD internal failure, sequence overflow on send, etc.
    Other,
}

impl DropReason {
    /// The counter field name this reason increments (spec §3.6).
    pub fn counter_name(self) -> &'static str {
        match self {
            DropReason::Header => "drop_header",
            DropReason::SessionEpoch => "drop_session_epoch",
            DropReason::Replay => "drop_replay",
            DropReason::Auth => "drop_auth",
            DropReason::SrcAddr => "drop_src_addr",
            DropReason::Other => "drop_other",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.counter_name())
    }
}
