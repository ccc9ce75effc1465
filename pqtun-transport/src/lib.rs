#![forbid(unsafe_code)]

//! UDP socket pool and the TCP handshake transport (listener + connector)
//! for the pqtun data plane: binding with DSCP marking, per-IP rate
//! limiting on inbound handshake connects, IP allowlisting, and
//! peer-address enforcement for the encrypted UDP ingress path.

pub mod handshake_listener;
pub mod peer;
pub mod rate_limiter;
pub mod udp;

pub use handshake_listener::{connect_with_timeout, HandshakeListener};
pub use peer::matches_peer;
pub use rate_limiter::HandshakeRateLimiter;
pub use udp::bind_udp;
