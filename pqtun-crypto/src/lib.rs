//! Post-quantum cryptographic primitives for the pqtun handshake (spec
//! §4.2, §4.1): ML-KEM encapsulation, ML-DSA signatures, the three AEAD
//! suites, HKDF transport-key derivation, identity key loading, and the
//! end-to-end handshake driver that ties them together over a TCP stream.

#![forbid(unsafe_code)]

pub mod aead;
pub mod error;
pub mod handshake;
pub mod identity;
pub mod kdf;
pub mod kem;
pub mod sig;

pub use error::{Error, Result};
pub use handshake::{run_drone_handshake, run_gcs_handshake, HandshakeOutcome};
pub use identity::{FileIdentityStore, GeneratedSigningKeyStore, PeerPublicKeyStore, SigningKeyStore};
