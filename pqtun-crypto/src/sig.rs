//! ML-DSA signatures (spec §4.2: transcript signing / verification).
//!
//! Mirrors the enum-dispatch shape of [`crate::kem`]: one arm per
//! parameter set, looked up by the name the suite registry already
//! carries (`Suite::sig_name`), so the handshake driver never names a
//! concrete `ml-dsa` generic itself.

#![forbid(unsafe_code)]

use crate::error::{Error, Result};
use ml_dsa::{KeyGen, MlDsa44, MlDsa65, MlDsa87, Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use signature::{Signer, Verifier};

enum SigningInner {
    MlDsa44(SigningKey<MlDsa44>),
    MlDsa65(SigningKey<MlDsa65>),
    MlDsa87(SigningKey<MlDsa87>),
}

/// A long-lived (or per-process) ML-DSA signing key.
pub struct SigningIdentity {
    inner: SigningInner,
}

impl SigningIdentity {
    pub fn generate(sig_name: &str) -> Result<Self> {
        let mut rng = OsRng;
        let inner = match sig_name {
            "ML-DSA-44" => SigningInner::MlDsa44(MlDsa44::key_gen(&mut rng).signing_key().clone()),
            "ML-DSA-65" => SigningInner::MlDsa65(MlDsa65::key_gen(&mut rng).signing_key().clone()),
            "ML-DSA-87" => SigningInner::MlDsa87(MlDsa87::key_gen(&mut rng).signing_key().clone()),
            other => return Err(Error::protocol(format!("unknown signature algorithm: {other}"))),
        };
        Ok(Self { inner })
    }

    pub fn verifying_key_bytes(&self) -> Vec<u8> {
        match &self.inner {
            SigningInner::MlDsa44(sk) => sk.verifying_key().encode().to_vec(),
            SigningInner::MlDsa65(sk) => sk.verifying_key().encode().to_vec(),
            SigningInner::MlDsa87(sk) => sk.verifying_key().encode().to_vec(),
        }
    }

    pub fn sign(&self, transcript: &[u8]) -> Vec<u8> {
        match &self.inner {
            SigningInner::MlDsa44(sk) => sk.sign(transcript).encode().to_vec(),
            SigningInner::MlDsa65(sk) => sk.sign(transcript).encode().to_vec(),
            SigningInner::MlDsa87(sk) => sk.sign(transcript).encode().to_vec(),
        }
    }
}

fn verifying_key_len(sig_name: &str) -> Result<usize> {
    match sig_name {
        "ML-DSA-44" => Ok(1312),
        "ML-DSA-65" => Ok(1952),
        "ML-DSA-87" => Ok(2592),
        other => Err(Error::protocol(format!("unknown signature algorithm: {other}"))),
    }
}

fn signature_len(sig_name: &str) -> Result<usize> {
    match sig_name {
        "ML-DSA-44" => Ok(2420),
        "ML-DSA-65" => Ok(3309),
        "ML-DSA-87" => Ok(4627),
        other => Err(Error::protocol(format!("unknown signature algorithm: {other}"))),
    }
}

/// Verify a transcript signature against a peer's verifying key bytes
/// (loaded from the configured identity store, spec §4.2's
/// `load_peer_public` callback).
pub fn verify(sig_name: &str, verifying_key: &[u8], transcript: &[u8], sig_bytes: &[u8]) -> Result<()> {
    let expected_vk_len = verifying_key_len(sig_name)?;
    if verifying_key.len() != expected_vk_len {
        return Err(Error::format(format!(
            "{sig_name} verifying key must be {expected_vk_len} bytes, got {}",
            verifying_key.len()
        )));
    }
    let expected_sig_len = signature_len(sig_name)?;
    if sig_bytes.len() != expected_sig_len {
        return Err(Error::format(format!(
            "{sig_name} signature must be {expected_sig_len} bytes, got {}",
            sig_bytes.len()
        )));
    }

    match sig_name {
        "ML-DSA-44" => {
            let vk = VerifyingKey::<MlDsa44>::decode(verifying_key)
                .map_err(|_| Error::format("malformed ML-DSA-44 verifying key"))?;
            let sig = Signature::<MlDsa44>::decode(sig_bytes)
                .ok_or_else(|| Error::format("malformed ML-DSA-44 signature"))?;
            vk.verify(transcript, &sig)
                .map_err(|_| Error::auth("ML-DSA-44 signature verification failed"))
        }
        "ML-DSA-65" => {
            let vk = VerifyingKey::<MlDsa65>::decode(verifying_key)
                .map_err(|_| Error::format("malformed ML-DSA-65 verifying key"))?;
            let sig = Signature::<MlDsa65>::decode(sig_bytes)
                .ok_or_else(|| Error::format("malformed ML-DSA-65 signature"))?;
            vk.verify(transcript, &sig)
                .map_err(|_| Error::auth("ML-DSA-65 signature verification failed"))
        }
        "ML-DSA-87" => {
            let vk = VerifyingKey::<MlDsa87>::decode(verifying_key)
                .map_err(|_| Error::format("malformed ML-DSA-87 verifying key"))?;
            let sig = Signature::<MlDsa87>::decode(sig_bytes)
                .ok_or_else(|| Error::format("malformed ML-DSA-87 signature"))?;
            vk.verify(transcript, &sig)
                .map_err(|_| Error::auth("ML-DSA-87 signature verification failed"))
        }
        other => Err(Error::protocol(format!("unknown signature algorithm: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrips_for_every_parameter_set() {
        for sig_name in ["ML-DSA-44", "ML-DSA-65", "ML-DSA-87"] {
            let id = SigningIdentity::generate(sig_name).unwrap();
            let vk = id.verifying_key_bytes();
            let transcript = b"handshake transcript bytes";
            let sig = id.sign(transcript);
            verify(sig_name, &vk, transcript, &sig).unwrap();
        }
    }

    #[test]
    fn verification_fails_for_a_tampered_transcript() {
        let id = SigningIdentity::generate("ML-DSA-65").unwrap();
        let vk = id.verifying_key_bytes();
        let sig = id.sign(b"original");
        assert!(verify("ML-DSA-65", &vk, b"tampered", &sig).is_err());
    }

    #[test]
    fn verification_fails_for_a_foreign_key() {
        let a = SigningIdentity::generate("ML-DSA-65").unwrap();
        let b = SigningIdentity::generate("ML-DSA-65").unwrap();
        let sig = a.sign(b"transcript");
        assert!(verify("ML-DSA-65", &b.verifying_key_bytes(), b"transcript", &sig).is_err());
    }
}
