use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Error taxonomy for the cryptographic layer. Every variant here is fatal
/// to the handshake or rekey attempt in progress — nothing in this crate
/// decides to silently drop a packet; that policy lives in `pqtun-stream`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("protocol: {0}")]
    Protocol(String),

    /// Malformed wire data: wrong length, bad tag, truncated frame.
    #[error("format: {0}")]
    Format(String),

    /// KEM/signature primitive failure that does not fit a more specific variant.
    #[error("crypto: {0}")]
    Crypto(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Signature verification or HMAC binder check failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// AEAD internal failure (not an authentication failure).
    #[error("aead internal: {0}")]
    AeadInternal(String),
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }
    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::AuthenticationFailed(msg.into())
    }
    pub fn aead_internal(msg: impl Into<String>) -> Self {
        Self::AeadInternal(msg.into())
    }
}
