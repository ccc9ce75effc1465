//! Suite registry (spec §4.5): the static table of `{KEM, Signature, AEAD}`
//! triples, their stable string identifiers, and the four header bytes
//! each algorithm pairing maps to on the wire.
//!
//! The mapping from algorithm name to header byte is fixed and must never
//! change once shipped — both endpoints derive the same bytes independently
//! from `(kem_name, sig_name)`, so a drift here is a silent interop break.

use crate::error::{Error, Result};
use crate::types::{HeaderIds, SuiteId};
use serde::{Deserialize, Serialize};

/// AEAD primitive backing a suite, per spec §3.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AeadToken {
    /// AES-256-GCM: 32-byte key, 12-byte nonce.
    AesGcm,
    /// ChaCha20-Poly1305: 32-byte key, 12-byte nonce.
    ChaCha20Poly1305,
    /// Ascon-128a: 16-byte key, 16-byte nonce. Experimental (spec §9, Open Question).
    Ascon128a,
}

impl AeadToken {
    pub fn key_len(self) -> usize {
        match self {
            AeadToken::AesGcm | AeadToken::ChaCha20Poly1305 => 32,
            AeadToken::Ascon128a => 16,
        }
    }

    pub fn nonce_len(self) -> usize {
        match self {
            AeadToken::AesGcm | AeadToken::ChaCha20Poly1305 => 12,
            AeadToken::Ascon128a => 16,
        }
    }

    pub fn token_str(self) -> &'static str {
        match self {
            AeadToken::AesGcm => "aesgcm",
            AeadToken::ChaCha20Poly1305 => "chacha20poly1305",
            AeadToken::Ascon128a => "ascon128a",
        }
    }

    fn parse(token: &str) -> Result<Self> {
        match token {
            "aesgcm" => Ok(AeadToken::AesGcm),
            "chacha20poly1305" => Ok(AeadToken::ChaCha20Poly1305),
            "ascon128a" => Ok(AeadToken::Ascon128a),
            "aes128gcm" => Err(Error::config(
                "AEAD token 'aes128gcm' is retired: use aesgcm (AES-256-GCM) for final deployments",
            )),
            "ascon128" => Err(Error::config(
                "AEAD token 'ascon128' is retired: use ascon128a for MTU-scale support",
            )),
            other => Err(Error::config(format!("unknown AEAD token: {other}"))),
        }
    }
}

/// Immutable suite descriptor (spec §3.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suite {
    pub suite_id: SuiteId,
    pub kem_name: &'static str,
    pub sig_name: &'static str,
    pub aead_token: AeadToken,
    pub header_ids: HeaderIds,
    /// Whether the AEAD key must be exactly [`AeadToken::key_len`] bytes
    /// rather than accepting (and truncating) a longer key. Only meaningful
    /// for `Ascon128a`; mirrors the original `ASCON_STRICT_KEY_SIZE` knob.
    pub aead_strict_key_size: bool,
}

/// One-to-one mapping from (kem_name, sig_name) to the four header id
/// bytes, kept as a flat table so both endpoints can derive it without any
/// runtime negotiation (spec §4.5: "must be stable across endpoints").
struct HeaderMapEntry {
    kem_name: &'static str,
    kem_id: u8,
    kem_param: u8,
    sig_name: &'static str,
    sig_id: u8,
    sig_param: u8,
}

const HEADER_MAP: &[HeaderMapEntry] = &[
    HeaderMapEntry { kem_name: "ML-KEM-512", kem_id: 1, kem_param: 1, sig_name: "ML-DSA-44", sig_id: 2, sig_param: 1 },
    HeaderMapEntry { kem_name: "ML-KEM-768", kem_id: 1, kem_param: 2, sig_name: "ML-DSA-65", sig_id: 2, sig_param: 2 },
    HeaderMapEntry { kem_name: "ML-KEM-1024", kem_id: 1, kem_param: 3, sig_name: "ML-DSA-87", sig_id: 2, sig_param: 3 },
];

fn header_ids_for(kem_name: &str, sig_name: &str) -> Result<HeaderIds> {
    HEADER_MAP
        .iter()
        .find(|e| e.kem_name == kem_name && e.sig_name == sig_name)
        .map(|e| HeaderIds {
            kem_id: e.kem_id,
            kem_param: e.kem_param,
            sig_id: e.sig_id,
            sig_param: e.sig_param,
        })
        .ok_or_else(|| {
            Error::config(format!(
                "no header id mapping for kem={kem_name} sig={sig_name}"
            ))
        })
}

/// Default bootstrap suite used when a caller does not specify one.
pub const DEFAULT_SUITE_ID: &str = "cs-mlkem768-aesgcm-mldsa65";

fn build_suite(
    suite_id: String,
    kem_name: &'static str,
    sig_name: &'static str,
    aead_token: AeadToken,
) -> Suite {
    // Header ids are part of the fixed, compiled-in table; a mismatch here
    // is a programming error in this module, not a runtime condition.
    let header_ids = header_ids_for(kem_name, sig_name)
        .unwrap_or_else(|e| unreachable!("suite table references unmapped algorithm pair: {e}"));
    Suite {
        suite_id: SuiteId::from(suite_id),
        kem_name,
        sig_name,
        aead_token,
        header_ids,
        aead_strict_key_size: false,
    }
}

fn all_suites() -> Vec<Suite> {
    use AeadToken::*;
    let kems = [
        ("mlkem512", "ML-KEM-512"),
        ("mlkem768", "ML-KEM-768"),
        ("mlkem1024", "ML-KEM-1024"),
    ];
    let sigs = [
        ("mldsa44", "ML-DSA-44"),
        ("mldsa65", "ML-DSA-65"),
        ("mldsa87", "ML-DSA-87"),
    ];
    let aeads = [
        ("aesgcm", AesGcm),
        ("chacha20poly1305", ChaCha20Poly1305),
        ("ascon128a", Ascon128a),
    ];

    // Only the level-matched pairings are offered (L1/L1, L3/L3, L5/L5):
    // the spec forbids downgrade negotiation entirely, so there is no value
    // in advertising mixed-strength suites that could only ever be
    // misconfigured, never negotiated down to at runtime.
    let mut out = Vec::with_capacity(kems.len() * aeads.len());
    for (idx, (kem_slug, kem_name)) in kems.iter().enumerate() {
        let (sig_slug, sig_name) = sigs[idx];
        for (aead_slug, aead_token) in aeads.iter().copied() {
            let suite_id = format!("cs-{kem_slug}-{aead_slug}-{sig_slug}");
            out.push(build_suite(suite_id, kem_name, sig_name, aead_token));
        }
    }
    out
}

/// Look up a suite by its stable string id.
pub fn get_suite(id: &str) -> Result<Suite> {
    all_suites()
        .into_iter()
        .find(|s| s.suite_id.as_str() == id)
        .ok_or_else(|| Error::config(format!("unknown suite id: {id}")))
}

/// All suite ids this registry knows about, independent of host availability.
pub fn list_suite_ids() -> Vec<SuiteId> {
    all_suites().into_iter().map(|s| s.suite_id).collect()
}

/// Reason a suite is unavailable on the current host (spec §4.5's
/// "runtime availability probe").
#[derive(Debug, Clone)]
pub struct UnavailableReason {
    pub suite_id: SuiteId,
    pub reason: String,
}

/// Backend capability probe: which KEM, signature, and AEAD primitives this
/// build was compiled with support for. The pure-Rust primitives this
/// workspace depends on (`ml-kem`, `ml-dsa`, `aes-gcm`,
/// `chacha20poly1305`, `ascon-aead`) are always available once linked, so
/// in practice every suite in the static table is runnable; this probe
/// exists as the seam a deployment with optional backends (e.g. a
/// hardware KEM accelerator) would plug availability gaps into.
pub struct BackendCapabilities {
    pub enabled_kems: Vec<&'static str>,
    pub enabled_sigs: Vec<&'static str>,
    pub enabled_aeads: Vec<AeadToken>,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self {
            enabled_kems: vec!["ML-KEM-512", "ML-KEM-768", "ML-KEM-1024"],
            enabled_sigs: vec!["ML-DSA-44", "ML-DSA-65", "ML-DSA-87"],
            enabled_aeads: vec![
                AeadToken::AesGcm,
                AeadToken::ChaCha20Poly1305,
                AeadToken::Ascon128a,
            ],
        }
    }
}

/// Returns the subset of suites runnable given `caps`, plus machine-readable
/// reasons for every suite that is not.
pub fn probe_available(caps: &BackendCapabilities) -> (Vec<Suite>, Vec<UnavailableReason>) {
    let mut available = Vec::new();
    let mut unavailable = Vec::new();
    for suite in all_suites() {
        let missing_kem = !caps.enabled_kems.contains(&suite.kem_name);
        let missing_sig = !caps.enabled_sigs.contains(&suite.sig_name);
        let missing_aead = !caps.enabled_aeads.contains(&suite.aead_token);
        if missing_kem || missing_sig || missing_aead {
            let mut reasons = Vec::new();
            if missing_kem {
                reasons.push(format!("kem '{}' not enabled", suite.kem_name));
            }
            if missing_sig {
                reasons.push(format!("sig '{}' not enabled", suite.sig_name));
            }
            if missing_aead {
                reasons.push(format!("aead '{}' not enabled", suite.aead_token.token_str()));
            }
            unavailable.push(UnavailableReason {
                suite_id: suite.suite_id.clone(),
                reason: reasons.join("; "),
            });
        } else {
            available.push(suite);
        }
    }
    (available, unavailable)
}

/// Parse an AEAD token string, surfacing the retirement/unknown-token
/// diagnostics from [`AeadToken::parse`].
pub fn parse_aead_token(token: &str) -> Result<AeadToken> {
    AeadToken::parse(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_suite_is_registered() {
        let suite = get_suite(DEFAULT_SUITE_ID).expect("default suite must resolve");
        assert_eq!(suite.kem_name, "ML-KEM-768");
        assert_eq!(suite.sig_name, "ML-DSA-65");
        assert_eq!(suite.aead_token, AeadToken::AesGcm);
    }

    #[test]
    fn header_ids_are_stable_and_unique_per_pairing() {
        let suites = all_suites();
        let a = suites.iter().find(|s| s.kem_name == "ML-KEM-512").unwrap();
        let b = suites.iter().find(|s| s.kem_name == "ML-KEM-1024").unwrap();
        assert_ne!(a.header_ids.kem_param, b.header_ids.kem_param);
        // Re-deriving must give the same bytes (no hidden randomness).
        let again = header_ids_for(a.kem_name, a.sig_name).unwrap();
        assert_eq!(again, a.header_ids);
    }

    #[test]
    fn retired_tokens_are_rejected_with_a_replacement_hint() {
        let err = parse_aead_token("aes128gcm").unwrap_err();
        assert!(err.to_string().contains("aesgcm"));
        let err = parse_aead_token("ascon128").unwrap_err();
        assert!(err.to_string().contains("ascon128a"));
    }

    #[test]
    fn unknown_token_is_a_config_error() {
        assert!(parse_aead_token("rot13").is_err());
    }

    #[test]
    fn list_suite_ids_covers_all_three_levels() {
        let ids = list_suite_ids();
        assert!(ids.iter().any(|s| s.as_str().contains("mlkem512")));
        assert!(ids.iter().any(|s| s.as_str().contains("mlkem768")));
        assert!(ids.iter().any(|s| s.as_str().contains("mlkem1024")));
    }

    #[test]
    fn probe_with_full_capabilities_returns_everything_available() {
        let (available, unavailable) = probe_available(&BackendCapabilities::default());
        assert_eq!(available.len(), list_suite_ids().len());
        assert!(unavailable.is_empty());
    }

    #[test]
    fn probe_flags_disabled_primitives() {
        let caps = BackendCapabilities {
            enabled_kems: vec!["ML-KEM-768", "ML-KEM-1024"],
            ..BackendCapabilities::default()
        };
        let (available, unavailable) = probe_available(&caps);
        assert!(available.iter().all(|s| s.kem_name != "ML-KEM-512"));
        assert!(unavailable.iter().any(|u| u.suite_id.as_str().contains("mlkem512")));
    }
}
