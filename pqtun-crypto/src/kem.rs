//! ML-KEM key encapsulation (spec §4.2). One enum arm per parameter set;
//! the handshake looks the parameter set up by name from the negotiated
//! suite (`pqtun_core::suites::Suite::kem_name`) and never touches the
//! underlying `ml-kem` generics directly — grounded in the same pattern
//! `HybridKeyPair` used for ML-KEM-768 alone, generalized to all three
//! security levels the suite registry advertises.

#![forbid(unsafe_code)]

use crate::error::{Error, Result};
use generic_array::GenericArray;
use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{Ciphertext, EncodedSizeUser, KemCore, MlKem1024, MlKem512, MlKem768};
use rand::rngs::OsRng;

/// Fixed NIST ML-KEM byte sizes, used to validate peer-supplied bytes
/// before handing them to the generic-array constructors (which panic on
/// length mismatch rather than returning an error).
struct KemSizes {
    encaps_key: usize,
    ciphertext: usize,
}

fn sizes_for(kem_name: &str) -> Result<KemSizes> {
    match kem_name {
        "ML-KEM-512" => Ok(KemSizes { encaps_key: 800, ciphertext: 768 }),
        "ML-KEM-768" => Ok(KemSizes { encaps_key: 1184, ciphertext: 1088 }),
        "ML-KEM-1024" => Ok(KemSizes { encaps_key: 1568, ciphertext: 1568 }),
        other => Err(Error::protocol(format!("unknown KEM: {other}"))),
    }
}

enum Inner {
    MlKem512(
        ml_kem::kem::DecapsulationKey<ml_kem::MlKem512Params>,
        ml_kem::kem::EncapsulationKey<ml_kem::MlKem512Params>,
    ),
    MlKem768(
        ml_kem::kem::DecapsulationKey<ml_kem::MlKem768Params>,
        ml_kem::kem::EncapsulationKey<ml_kem::MlKem768Params>,
    ),
    MlKem1024(
        ml_kem::kem::DecapsulationKey<ml_kem::MlKem1024Params>,
        ml_kem::kem::EncapsulationKey<ml_kem::MlKem1024Params>,
    ),
}

/// An ephemeral ML-KEM key pair generated for one handshake attempt.
pub struct KemKeypair {
    inner: Inner,
}

impl KemKeypair {
    pub fn generate(kem_name: &str) -> Result<Self> {
        let mut rng = OsRng;
        let inner = match kem_name {
            "ML-KEM-512" => {
                let (dk, ek) = MlKem512::generate(&mut rng);
                Inner::MlKem512(dk, ek)
            }
            "ML-KEM-768" => {
                let (dk, ek) = MlKem768::generate(&mut rng);
                Inner::MlKem768(dk, ek)
            }
            "ML-KEM-1024" => {
                let (dk, ek) = MlKem1024::generate(&mut rng);
                Inner::MlKem1024(dk, ek)
            }
            other => return Err(Error::protocol(format!("unknown KEM: {other}"))),
        };
        Ok(Self { inner })
    }

    /// The encapsulation (public) key, sent to the peer in the hello message.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        match &self.inner {
            Inner::MlKem512(_, ek) => ek.as_bytes().to_vec(),
            Inner::MlKem768(_, ek) => ek.as_bytes().to_vec(),
            Inner::MlKem1024(_, ek) => ek.as_bytes().to_vec(),
        }
    }

    /// Decapsulate a ciphertext produced by [`encapsulate`] against this
    /// key pair's public key, returning the 32-byte shared secret.
    pub fn decapsulate(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        match &self.inner {
            Inner::MlKem512(dk, _) => {
                let ct = Ciphertext::<MlKem512>::try_from(ciphertext)
                    .map_err(|_| Error::format("ML-KEM-512 ciphertext has the wrong length"))?;
                let ss = dk
                    .decapsulate(&ct)
                    .map_err(|_| Error::crypto("ML-KEM-512 decapsulation failed"))?;
                Ok(ss.as_slice().to_vec())
            }
            Inner::MlKem768(dk, _) => {
                let ct = Ciphertext::<MlKem768>::try_from(ciphertext)
                    .map_err(|_| Error::format("ML-KEM-768 ciphertext has the wrong length"))?;
                let ss = dk
                    .decapsulate(&ct)
                    .map_err(|_| Error::crypto("ML-KEM-768 decapsulation failed"))?;
                Ok(ss.as_slice().to_vec())
            }
            Inner::MlKem1024(dk, _) => {
                let ct = Ciphertext::<MlKem1024>::try_from(ciphertext)
                    .map_err(|_| Error::format("ML-KEM-1024 ciphertext has the wrong length"))?;
                let ss = dk
                    .decapsulate(&ct)
                    .map_err(|_| Error::crypto("ML-KEM-1024 decapsulation failed"))?;
                Ok(ss.as_slice().to_vec())
            }
        }
    }
}

/// Encapsulate against a peer's public key bytes (responder side of the
/// handshake). Returns `(ciphertext, shared_secret)`.
pub fn encapsulate(kem_name: &str, peer_public_key: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let sizes = sizes_for(kem_name)?;
    if peer_public_key.len() != sizes.encaps_key {
        return Err(Error::format(format!(
            "{kem_name} public key must be {} bytes, got {}",
            sizes.encaps_key,
            peer_public_key.len()
        )));
    }
    let mut rng = OsRng;
    match kem_name {
        "ML-KEM-512" => {
            let ek = ml_kem::kem::EncapsulationKey::<ml_kem::MlKem512Params>::from_bytes(
                GenericArray::from_slice(peer_public_key),
            );
            let (ct, ss) = ek
                .encapsulate(&mut rng)
                .map_err(|_| Error::crypto("ML-KEM-512 encapsulation failed"))?;
            Ok((ct.as_slice().to_vec(), ss.as_slice().to_vec()))
        }
        "ML-KEM-768" => {
            let ek = ml_kem::kem::EncapsulationKey::<ml_kem::MlKem768Params>::from_bytes(
                GenericArray::from_slice(peer_public_key),
            );
            let (ct, ss) = ek
                .encapsulate(&mut rng)
                .map_err(|_| Error::crypto("ML-KEM-768 encapsulation failed"))?;
            Ok((ct.as_slice().to_vec(), ss.as_slice().to_vec()))
        }
        "ML-KEM-1024" => {
            let ek = ml_kem::kem::EncapsulationKey::<ml_kem::MlKem1024Params>::from_bytes(
                GenericArray::from_slice(peer_public_key),
            );
            let (ct, ss) = ek
                .encapsulate(&mut rng)
                .map_err(|_| Error::crypto("ML-KEM-1024 encapsulation failed"))?;
            Ok((ct.as_slice().to_vec(), ss.as_slice().to_vec()))
        }
        other => Err(Error::protocol(format!("unknown KEM: {other}"))),
    }
}

/// Validate a ciphertext's length for `kem_name` without decapsulating it.
/// Used by the handshake driver to reject malformed messages before
/// touching the generic-array constructors.
pub fn ciphertext_len(kem_name: &str) -> Result<usize> {
    Ok(sizes_for(kem_name)?.ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_for_every_parameter_set() {
        for kem_name in ["ML-KEM-512", "ML-KEM-768", "ML-KEM-1024"] {
            let kp = KemKeypair::generate(kem_name).unwrap();
            let pk = kp.public_key_bytes();
            let (ct, ss_enc) = encapsulate(kem_name, &pk).unwrap();
            assert_eq!(ct.len(), ciphertext_len(kem_name).unwrap());
            let ss_dec = kp.decapsulate(&ct).unwrap();
            assert_eq!(ss_enc, ss_dec);
        }
    }

    #[test]
    fn rejects_wrong_length_public_key() {
        let err = encapsulate("ML-KEM-768", &[0u8; 10]).unwrap_err();
        assert!(err.to_string().contains("1184"));
    }

    #[test]
    fn decapsulating_a_foreign_ciphertext_does_not_match() {
        let a = KemKeypair::generate("ML-KEM-768").unwrap();
        let b = KemKeypair::generate("ML-KEM-768").unwrap();
        let (ct, ss_a) = encapsulate("ML-KEM-768", &a.public_key_bytes()).unwrap();
        let ss_b = b.decapsulate(&ct).unwrap();
        assert_ne!(ss_a, ss_b);
    }
}
