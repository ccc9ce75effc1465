//! Per-direction AEAD sender (spec §3.3, §4.1.3).

#![forbid(unsafe_code)]

use crate::header::{build_nonce, Header};
use pqtun_core::error::{Error, Result};
use pqtun_core::types::HeaderIds;
use pqtun_crypto::aead::AeadCipher;

pub struct Sender {
    wire_version: u8,
    header_ids: HeaderIds,
    session_id: [u8; 8],
    epoch: u8,
    seq: u64,
    rekey_threshold: u64,
    cipher: AeadCipher,
}

impl Sender {
    pub fn new(
        wire_version: u8,
        header_ids: HeaderIds,
        session_id: [u8; 8],
        cipher: AeadCipher,
        rekey_threshold: u64,
    ) -> Self {
        Self {
            wire_version,
            header_ids,
            session_id,
            epoch: 0,
            seq: 0,
            rekey_threshold,
            cipher,
        }
    }

    pub fn session_id(&self) -> [u8; 8] {
        self.session_id
    }

    pub fn epoch(&self) -> u8 {
        self.epoch
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Headroom before [`Error::SequenceOverflow`], used by the relay to
    /// proactively request a rekey ahead of the hard cutoff.
    pub fn seq_remaining(&self) -> u64 {
        self.rekey_threshold.saturating_sub(self.seq)
    }

    /// Encrypt one datagram, returning `header || ciphertext_with_tag`.
    /// `seq` advances only once the AEAD call has actually succeeded.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if self.seq >= self.rekey_threshold {
            return Err(Error::SequenceOverflow);
        }
        let header = Header::new(self.wire_version, self.header_ids, self.session_id, self.seq, self.epoch);
        let header_bytes = header.pack();
        let nonce = build_nonce(self.epoch, self.seq, self.cipher.nonce_len());
        let ct = self
            .cipher
            .seal(&nonce, &header_bytes, plaintext)
            .map_err(|e| Error::aead_internal(e.to_string()))?;
        self.seq += 1;

        let mut out = Vec::with_capacity(header_bytes.len() + ct.len());
        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(&ct);
        Ok(out)
    }

    /// Roll to a new epoch, resetting `seq` to 0. Forbidden past epoch 255
    /// (spec §4.1.3) — a full rekey (new session id) is required instead.
    pub fn bump_epoch(&mut self) -> Result<()> {
        if self.epoch == 255 {
            return Err(Error::EpochWrap);
        }
        self.epoch += 1;
        self.seq = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pqtun_core::suites::AeadToken;

    fn header_ids() -> HeaderIds {
        HeaderIds { kem_id: 1, kem_param: 2, sig_id: 2, sig_param: 2 }
    }

    fn sender(rekey_threshold: u64) -> Sender {
        let cipher = AeadCipher::new(AeadToken::AesGcm, vec![0x42u8; 32]).unwrap();
        Sender::new(1, header_ids(), [1u8; 8], cipher, rekey_threshold)
    }

    #[test]
    fn seq_advances_only_on_success() {
        let mut s = sender(1_000);
        assert_eq!(s.seq(), 0);
        s.encrypt(b"hello").unwrap();
        assert_eq!(s.seq(), 1);
    }

    #[test]
    fn sequence_overflow_is_reported_and_does_not_advance_seq() {
        let mut s = sender(0);
        let err = s.encrypt(b"hello").unwrap_err();
        assert!(matches!(err, Error::SequenceOverflow));
        assert_eq!(s.seq(), 0);
    }

    #[test]
    fn bump_epoch_resets_seq_and_is_forbidden_at_255() {
        let mut s = sender(1_000);
        s.encrypt(b"a").unwrap();
        s.bump_epoch().unwrap();
        assert_eq!(s.epoch(), 1);
        assert_eq!(s.seq(), 0);

        let mut maxed = sender(1_000);
        for _ in 0..255 {
            maxed.bump_epoch().unwrap();
        }
        assert_eq!(maxed.epoch(), 255);
        assert!(matches!(maxed.bump_epoch().unwrap_err(), Error::EpochWrap));
    }

    #[test]
    fn successive_ciphertexts_for_identical_plaintext_differ() {
        let mut s = sender(1_000);
        let a = s.encrypt(b"same payload").unwrap();
        let b = s.encrypt(b"same payload").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn seq_remaining_counts_down_to_the_threshold() {
        let mut s = sender(3);
        assert_eq!(s.seq_remaining(), 3);
        s.encrypt(b"a").unwrap();
        assert_eq!(s.seq_remaining(), 2);
    }
}
