//! AEAD primitives behind one small dispatch surface (spec §3.1, §4.1).
//!
//! Grounded in the AEAD token dispatch in `pqtun_core::suites::AeadToken`
//! and the instantiation logic the original proxy's `_instantiate_aead`
//! implements: the suite negotiated at handshake time picks exactly one
//! of AES-256-GCM, ChaCha20-Poly1305, or Ascon-128a, and every packet
//! after that uses the same cipher object.
//!
//! Nonce construction (epoch || seq, zero-padded for Ascon's 16-byte
//! nonce) lives in `pqtun-stream`, which owns the header fields this
//! module's caller derives a nonce from.

#![forbid(unsafe_code)]

use crate::error::{Error, Result};
use aead::{Aead, AeadCore, KeyInit, Payload};
use aes_gcm::Aes256Gcm;
use ascon_aead::Ascon128a;
use chacha20poly1305::ChaCha20Poly1305;
use pqtun_core::suites::AeadToken;
use zeroize::Zeroize;

enum Inner {
    AesGcm(Box<Aes256Gcm>),
    ChaCha20Poly1305(Box<ChaCha20Poly1305>),
    Ascon128a(Box<Ascon128a>),
}

/// One instantiated AEAD cipher, bound to a single direction's key for
/// the lifetime of a suite epoch. Dropping it zeroizes nothing on its
/// own — the key bytes it was built from are the caller's responsibility
/// to zeroize once consumed.
pub struct AeadCipher {
    inner: Inner,
    token: AeadToken,
}

impl AeadCipher {
    /// Build a cipher from `key`, which must be exactly `token.key_len()`
    /// bytes (callers derive keys via HKDF sized to the negotiated suite,
    /// so a mismatch here means a programming error upstream, not
    /// attacker-controlled input).
    pub fn new(token: AeadToken, mut key: Vec<u8>) -> Result<Self> {
        if key.len() != token.key_len() {
            let len = key.len();
            key.zeroize();
            return Err(Error::invalid_key(format!(
                "{} requires a {}-byte key, got {len}",
                token.token_str(),
                token.key_len()
            )));
        }
        let inner = match token {
            AeadToken::AesGcm => Inner::AesGcm(Box::new(Aes256Gcm::new_from_slice(&key).map_err(
                |e| Error::invalid_key(format!("AES-256-GCM key rejected: {e}")),
            )?)),
            AeadToken::ChaCha20Poly1305 => Inner::ChaCha20Poly1305(Box::new(
                ChaCha20Poly1305::new_from_slice(&key)
                    .map_err(|e| Error::invalid_key(format!("ChaCha20-Poly1305 key rejected: {e}")))?,
            )),
            AeadToken::Ascon128a => Inner::Ascon128a(Box::new(
                Ascon128a::new_from_slice(&key)
                    .map_err(|e| Error::invalid_key(format!("Ascon-128a key rejected: {e}")))?,
            )),
        };
        key.zeroize();
        Ok(Self { inner, token })
    }

    pub fn nonce_len(&self) -> usize {
        self.token.nonce_len()
    }

    pub fn seal(&self, nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        if nonce.len() != self.nonce_len() {
            return Err(Error::format(format!(
                "nonce must be {} bytes for {}, got {}",
                self.nonce_len(),
                self.token.token_str(),
                nonce.len()
            )));
        }
        let payload = Payload { msg: plaintext, aad };
        match &self.inner {
            Inner::AesGcm(c) => c
                .encrypt(nonce.into(), payload)
                .map_err(|e| Error::aead_internal(format!("AES-256-GCM seal failed: {e}"))),
            Inner::ChaCha20Poly1305(c) => c
                .encrypt(nonce.into(), payload)
                .map_err(|e| Error::aead_internal(format!("ChaCha20-Poly1305 seal failed: {e}"))),
            Inner::Ascon128a(c) => c
                .encrypt(nonce.into(), payload)
                .map_err(|e| Error::aead_internal(format!("Ascon-128a seal failed: {e}"))),
        }
    }

    pub fn open(&self, nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if nonce.len() != self.nonce_len() {
            return Err(Error::format(format!(
                "nonce must be {} bytes for {}, got {}",
                self.nonce_len(),
                self.token.token_str(),
                nonce.len()
            )));
        }
        let payload = Payload { msg: ciphertext, aad };
        match &self.inner {
            Inner::AesGcm(c) => c
                .decrypt(nonce.into(), payload)
                .map_err(|_| Error::auth("AEAD authentication failed")),
            Inner::ChaCha20Poly1305(c) => c
                .decrypt(nonce.into(), payload)
                .map_err(|_| Error::auth("AEAD authentication failed")),
            Inner::Ascon128a(c) => c
                .decrypt(nonce.into(), payload)
                .map_err(|_| Error::auth("AEAD authentication failed")),
        }
    }
}

/// `AeadCore::NonceSize` for every suite this workspace ships happens to
/// be representable as a plain byte length (12 or 16); this helper keeps
/// call sites from reaching for the trait directly.
pub fn nonce_len_for(token: AeadToken) -> usize {
    token.nonce_len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_for_every_suite() {
        for token in [AeadToken::AesGcm, AeadToken::ChaCha20Poly1305, AeadToken::Ascon128a] {
            let key = vec![0x42u8; token.key_len()];
            let cipher = AeadCipher::new(token, key).unwrap();
            let nonce = vec![0u8; token.nonce_len()];
            let aad = b"header-bytes";
            let pt = b"drone telemetry payload";
            let ct = cipher.seal(&nonce, aad, pt).unwrap();
            let rt = cipher.open(&nonce, aad, &ct).unwrap();
            assert_eq!(rt, pt);
        }
    }

    #[test]
    fn tampered_aad_is_rejected() {
        let key = vec![0x11u8; 32];
        let cipher = AeadCipher::new(AeadToken::AesGcm, key).unwrap();
        let nonce = vec![0u8; 12];
        let ct = cipher.seal(&nonce, b"aad-a", b"msg").unwrap();
        assert!(cipher.open(&nonce, b"aad-b", &ct).is_err());
    }

    #[test]
    fn same_plaintext_different_nonce_yields_different_ciphertext() {
        let key = vec![0x22u8; 32];
        let cipher = AeadCipher::new(AeadToken::ChaCha20Poly1305, key).unwrap();
        let ct1 = cipher.seal(&[0u8; 12], b"aad", b"identical payload").unwrap();
        let ct2 = cipher.seal(&[1u8; 12], b"aad", b"identical payload").unwrap();
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn wrong_key_length_is_rejected() {
        assert!(AeadCipher::new(AeadToken::AesGcm, vec![0u8; 10]).is_err());
    }
}
