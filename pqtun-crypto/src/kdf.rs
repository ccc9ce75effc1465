//! HKDF-SHA256 transport key derivation (spec §4.2).
//!
//! Follows the original proxy's `derive_transport_keys`: a fixed salt, an
//! info string that binds the session id and the negotiated algorithm
//! names, and a single 64-byte HKDF-SHA256 expansion split into two
//! 32-byte halves — one per direction. A suite whose AEAD needs fewer
//! bytes (Ascon-128a wants 16) truncates its half rather than deriving a
//! shorter key outright, so the traffic-key derivation never depends on
//! which AEAD ended up negotiated.

#![forbid(unsafe_code)]

use crate::error::{Error, Result};
use hkdf::Hkdf;
use sha2::Sha256;

const HKDF_SALT: &[u8] = b"pq-drone-gcs|hkdf|v1";

fn kdf_info(session_id: &[u8; 8], kem_name: &str, sig_name: &str) -> Vec<u8> {
    let mut info = Vec::with_capacity(32 + kem_name.len() + sig_name.len());
    info.extend_from_slice(b"pq-drone-gcs:kdf:v1|");
    info.extend_from_slice(session_id);
    info.push(b'|');
    info.extend_from_slice(kem_name.as_bytes());
    info.push(b'|');
    info.extend_from_slice(sig_name.as_bytes());
    info
}

/// Derive the two 32-byte directional traffic keys for a handshake.
/// Returns `(key_drone_to_gcs, key_gcs_to_drone)`; callers select which
/// half is their send key and which is their receive key based on role.
pub fn derive_transport_keys(
    session_id: &[u8; 8],
    kem_name: &str,
    sig_name: &str,
    shared_secret: &[u8],
) -> Result<(Vec<u8>, Vec<u8>)> {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), shared_secret);
    let info = kdf_info(session_id, kem_name, sig_name);
    let mut okm = [0u8; 64];
    hk.expand(&info, &mut okm)
        .map_err(|_| Error::crypto("HKDF expand failed deriving transport keys"))?;
    let key_d2g = okm[..32].to_vec();
    let key_g2d = okm[32..].to_vec();
    Ok((key_d2g, key_g2d))
}

/// `pqtun_core::Role::Drone`'s (send, recv) pair given the shared halves.
pub fn drone_send_recv(key_d2g: &[u8], key_g2d: &[u8]) -> (Vec<u8>, Vec<u8>) {
    (key_d2g.to_vec(), key_g2d.to_vec())
}

/// `pqtun_core::Role::Gcs`'s (send, recv) pair given the shared halves.
pub fn gcs_send_recv(key_d2g: &[u8], key_g2d: &[u8]) -> (Vec<u8>, Vec<u8>) {
    (key_g2d.to_vec(), key_d2g.to_vec())
}

/// Truncate a derived 32-byte half to the AEAD suite's required key
/// length. Every suite this registry ships needs <= 32 bytes, so this is
/// never asked to pad.
pub fn fit_to_aead_key_len(key: &[u8], key_len: usize) -> Result<Vec<u8>> {
    if key_len > key.len() {
        return Err(Error::crypto(format!(
            "AEAD key length {key_len} exceeds derived key material ({} bytes)",
            key.len()
        )));
    }
    Ok(key[..key_len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_keys_differ_by_direction() {
        let (a, b) = derive_transport_keys(&[0u8; 8], "ML-KEM-768", "ML-DSA-65", b"shared secret").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert_eq!(b.len(), 32);
    }

    #[test]
    fn different_session_ids_give_different_keys() {
        let (a1, _) = derive_transport_keys(&[0u8; 8], "ML-KEM-768", "ML-DSA-65", b"same secret").unwrap();
        let (a2, _) = derive_transport_keys(&[1u8; 8], "ML-KEM-768", "ML-DSA-65", b"same secret").unwrap();
        assert_ne!(a1, a2);
    }

    #[test]
    fn drone_and_gcs_see_mirrored_send_recv_pairs() {
        let (d2g, g2d) = derive_transport_keys(&[7u8; 8], "ML-KEM-512", "ML-DSA-44", b"secret").unwrap();
        let (drone_send, drone_recv) = drone_send_recv(&d2g, &g2d);
        let (gcs_send, gcs_recv) = gcs_send_recv(&d2g, &g2d);
        assert_eq!(drone_send, gcs_recv);
        assert_eq!(drone_recv, gcs_send);
    }

    #[test]
    fn truncates_for_shorter_aead_keys() {
        let (d2g, _) = derive_transport_keys(&[0u8; 8], "ML-KEM-768", "ML-DSA-65", b"secret").unwrap();
        let ascon_key = fit_to_aead_key_len(&d2g, 16).unwrap();
        assert_eq!(ascon_key.len(), 16);
        assert_eq!(&ascon_key[..], &d2g[..16]);
    }
}
