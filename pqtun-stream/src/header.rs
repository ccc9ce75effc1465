//! Fixed 22-byte wire header (spec §4.1.1): `version | kem_id | kem_param
//! | sig_id | sig_param | session_id(8) | seq(8, BE) | epoch`. Packed
//! contiguously, big-endian, with no padding — both endpoints derive the
//! same bytes from a suite's `header_ids` independently, so this layout
//! must never change once shipped.

#![forbid(unsafe_code)]

use pqtun_core::error::DropReason;
use pqtun_core::types::HeaderIds;

pub const HEADER_LEN: usize = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub kem_id: u8,
    pub kem_param: u8,
    pub sig_id: u8,
    pub sig_param: u8,
    pub session_id: [u8; 8],
    pub seq: u64,
    pub epoch: u8,
}

impl Header {
    pub fn new(version: u8, header_ids: HeaderIds, session_id: [u8; 8], seq: u64, epoch: u8) -> Self {
        Self {
            version,
            kem_id: header_ids.kem_id,
            kem_param: header_ids.kem_param,
            sig_id: header_ids.sig_id,
            sig_param: header_ids.sig_param,
            session_id,
            seq,
            epoch,
        }
    }

    pub fn pack(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = self.version;
        buf[1] = self.kem_id;
        buf[2] = self.kem_param;
        buf[3] = self.sig_id;
        buf[4] = self.sig_param;
        buf[5..13].copy_from_slice(&self.session_id);
        buf[13..21].copy_from_slice(&self.seq.to_be_bytes());
        buf[21] = self.epoch;
        buf
    }

    /// Parse the leading 22 bytes of `wire`. Returns [`DropReason::Header`]
    /// if `wire` is shorter than [`HEADER_LEN`] — this is the only check
    /// this function makes; suite/session/epoch matching is the caller's
    /// job (spec §4.1.4 checks those in a specific order).
    pub fn unpack(wire: &[u8]) -> Result<Self, DropReason> {
        if wire.len() < HEADER_LEN {
            return Err(DropReason::Header);
        }
        let mut session_id = [0u8; 8];
        session_id.copy_from_slice(&wire[5..13]);
        let mut seq_bytes = [0u8; 8];
        seq_bytes.copy_from_slice(&wire[13..21]);
        Ok(Self {
            version: wire[0],
            kem_id: wire[1],
            kem_param: wire[2],
            sig_id: wire[3],
            sig_param: wire[4],
            session_id,
            seq: u64::from_be_bytes(seq_bytes),
            epoch: wire[21],
        })
    }

    pub fn header_ids(&self) -> HeaderIds {
        HeaderIds {
            kem_id: self.kem_id,
            kem_param: self.kem_param,
            sig_id: self.sig_id,
            sig_param: self.sig_param,
        }
    }
}

/// Deterministic counter nonce (spec §4.1.2): `byte(epoch) || seq` encoded
/// in an 11-byte big-endian field (the top 3 bytes are always zero since
/// `seq` is a `u64`), zero-padded on the right to the AEAD's nonce length.
pub fn build_nonce(epoch: u8, seq: u64, nonce_len: usize) -> Vec<u8> {
    let mut nonce = Vec::with_capacity(nonce_len.max(12));
    nonce.push(epoch);
    nonce.extend_from_slice(&[0u8; 3]);
    nonce.extend_from_slice(&seq.to_be_bytes());
    nonce.resize(nonce_len, 0);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> HeaderIds {
        HeaderIds { kem_id: 1, kem_param: 2, sig_id: 2, sig_param: 2 }
    }

    #[test]
    fn pack_and_unpack_roundtrip() {
        let h = Header::new(1, ids(), [7u8; 8], 42, 3);
        let wire = h.pack();
        assert_eq!(wire.len(), HEADER_LEN);
        let parsed = Header::unpack(&wire).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn unpack_rejects_short_input() {
        assert_eq!(Header::unpack(&[0u8; 21]).unwrap_err(), DropReason::Header);
    }

    #[test]
    fn nonce_is_epoch_then_big_endian_seq_zero_padded() {
        let nonce = build_nonce(5, 1, 12);
        assert_eq!(nonce.len(), 12);
        assert_eq!(nonce[0], 5);
        assert_eq!(&nonce[1..4], &[0, 0, 0]);
        assert_eq!(&nonce[4..12], &1u64.to_be_bytes());
    }

    #[test]
    fn nonce_zero_pads_for_longer_nonce_lengths() {
        let nonce = build_nonce(0, 9, 16);
        assert_eq!(nonce.len(), 16);
        assert_eq!(&nonce[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn different_seq_values_give_different_nonces() {
        assert_ne!(build_nonce(0, 1, 12), build_nonce(0, 2, 12));
    }
}
