//! Identity material loading (spec §4.2's `load_peer_public` /
//! `load_signing_secret` callbacks).
//!
//! Keys live as raw algorithm-encoded bytes on disk, one file per role.
//! This mirrors the teacher's `keystore.rs` file-loading idiom
//! (`std::fs::read` wrapped into a crate error) without the
//! password-based envelope that module uses for developer secrets —
//! handshake identities are provisioned out of band, not interactively.

#![forbid(unsafe_code)]

use crate::error::{Error, Result};
use crate::sig::SigningIdentity;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Loads a peer's ML-DSA verifying key bytes given its role name.
pub trait PeerPublicKeyStore: Send + Sync {
    fn load_peer_public(&self, peer: &str) -> Result<Vec<u8>>;
}

/// Loads this process' own ML-DSA signing secret. Returns a shared handle
/// rather than an owned value: the identity must stay the same object
/// across every handshake and rekey for the process lifetime.
pub trait SigningKeyStore: Send + Sync {
    fn load_signing_secret(&self, sig_name: &str) -> Result<Arc<SigningIdentity>>;
}

/// Reads verifying-key bytes from `<dir>/<peer>.pub` and a freshly
/// generated-on-first-use signing key cached at `<dir>/<role>.key`.
///
/// Signing keys are generated once per process: the handshake is
/// ephemeral per spec (forward secrecy comes from the KEM, not long-lived
/// keys), but the *signing* identity must stay stable for the lifetime of
/// a deployment so the peer's pinned verifying key keeps matching.
pub struct FileIdentityStore {
    dir: PathBuf,
}

impl FileIdentityStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn peer_path(&self, peer: &str) -> PathBuf {
        self.dir.join(format!("{peer}.pub"))
    }
}

impl PeerPublicKeyStore for FileIdentityStore {
    fn load_peer_public(&self, peer: &str) -> Result<Vec<u8>> {
        std::fs::read(self.peer_path(peer))
            .map_err(|e| Error::invalid_key(format!("reading {peer} public key: {e}")))
    }
}

/// A signing identity generated once and held for the process lifetime,
/// with its verifying key bytes written out for the peer to read via
/// [`FileIdentityStore`] on the other host.
pub struct GeneratedSigningKeyStore {
    cache: RwLock<HashMap<String, Arc<SigningIdentity>>>,
    publish_dir: Option<PathBuf>,
}

impl GeneratedSigningKeyStore {
    pub fn new(publish_dir: Option<PathBuf>) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            publish_dir,
        }
    }

    fn publish(&self, sig_name: &str, identity: &SigningIdentity) -> Result<()> {
        let Some(dir) = &self.publish_dir else {
            return Ok(());
        };
        let path = self.role_pub_path(dir, sig_name);
        std::fs::write(&path, identity.verifying_key_bytes())
            .map_err(|e| Error::invalid_key(format!("writing verifying key to {}: {e}", path.display())))
    }

    fn role_pub_path(&self, dir: &Path, sig_name: &str) -> PathBuf {
        dir.join(format!("self-{sig_name}.pub"))
    }
}

impl SigningKeyStore for GeneratedSigningKeyStore {
    fn load_signing_secret(&self, sig_name: &str) -> Result<Arc<SigningIdentity>> {
        if let Some(existing) = self.cache.read().unwrap().get(sig_name) {
            return Ok(existing.clone());
        }
        let identity = SigningIdentity::generate(sig_name)?;
        self.publish(sig_name, &identity)?;
        let shared = Arc::new(identity);
        self.cache
            .write()
            .unwrap()
            .insert(sig_name.to_string(), shared.clone());
        Ok(shared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_reads_whatever_bytes_are_on_disk() {
        let dir = std::env::temp_dir().join(format!("pqtun-identity-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("gcs.pub"), b"fake verifying key bytes").unwrap();
        let store = FileIdentityStore::new(&dir);
        assert_eq!(store.load_peer_public("gcs").unwrap(), b"fake verifying key bytes");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_peer_key_is_an_error() {
        let store = FileIdentityStore::new(std::env::temp_dir().join("pqtun-identity-missing"));
        assert!(store.load_peer_public("nobody").is_err());
    }
}
