//! TCP handshake wire protocol (spec §4.2), grounded directly in the
//! original proxy's `build_server_hello` / `parse_and_verify_server_hello`
//! / `client_drone_handshake` / `server_gcs_handshake` exchange:
//!
//! ```text
//! GCS -> Drone: len(u32 BE) || ServerHello
//! Drone -> GCS: len(u32 BE) || kem_ciphertext || hmac_tag(32)
//! ```
//!
//! `ServerHello` wire layout:
//! `version(1) | kem_name_len(2) kem_name | sig_name_len(2) sig_name |
//!  session_id(8) | challenge(8) | kem_pub_len(4) kem_pub | sig_len(2) sig`
//!
//! The transcript the GCS signs (and the drone re-derives to verify) is
//! `version | "|pq-drone-gcs:v1|" | session_id | "|" | kem_name | "|" |
//! sig_name | "|" | kem_pub | "|" | challenge`. The drone's PSK binder is
//! an HMAC-SHA256 over the raw `ServerHello` wire bytes — it authenticates
//! the drone to the GCS, independent of the KEM/signature exchange, so a
//! GCS that doesn't hold the shared PSK can't complete a session even if
//! it somehow had a valid signing key.

#![forbid(unsafe_code)]

use crate::error::{Error, Result};
use crate::sig::SigningIdentity;
use crate::{kdf, kem, sig};
use hmac::{Hmac, Mac};
use pqtun_core::suites::Suite;
use rand::RngCore;
use sha2::Sha256;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

type HmacSha256 = Hmac<Sha256>;

const TRANSCRIPT_LABEL: &[u8] = b"|pq-drone-gcs:v1|";

/// Result of a completed handshake: the negotiated session context handed
/// off to `pqtun-stream` to build a `Sender`/`Receiver` pair from.
pub struct HandshakeOutcome {
    pub session_id: [u8; 8],
    pub key_send: Vec<u8>,
    pub key_recv: Vec<u8>,
}

struct ServerHello {
    version: u8,
    kem_name: String,
    sig_name: String,
    session_id: [u8; 8],
    challenge: [u8; 8],
    kem_pub: Vec<u8>,
    signature: Vec<u8>,
}

impl ServerHello {
    fn transcript(&self) -> Vec<u8> {
        let mut t = Vec::with_capacity(64 + self.kem_pub.len() + self.signature.len());
        t.push(self.version);
        t.extend_from_slice(TRANSCRIPT_LABEL);
        t.extend_from_slice(&self.session_id);
        t.push(b'|');
        t.extend_from_slice(self.kem_name.as_bytes());
        t.push(b'|');
        t.extend_from_slice(self.sig_name.as_bytes());
        t.push(b'|');
        t.extend_from_slice(&self.kem_pub);
        t.push(b'|');
        t.extend_from_slice(&self.challenge);
        t
    }

    fn encode(&self) -> Vec<u8> {
        let mut w = Vec::with_capacity(32 + self.kem_pub.len() + self.signature.len());
        w.push(self.version);
        w.extend_from_slice(&(self.kem_name.len() as u16).to_be_bytes());
        w.extend_from_slice(self.kem_name.as_bytes());
        w.extend_from_slice(&(self.sig_name.len() as u16).to_be_bytes());
        w.extend_from_slice(self.sig_name.as_bytes());
        w.extend_from_slice(&self.session_id);
        w.extend_from_slice(&self.challenge);
        w.extend_from_slice(&(self.kem_pub.len() as u32).to_be_bytes());
        w.extend_from_slice(&self.kem_pub);
        w.extend_from_slice(&(self.signature.len() as u16).to_be_bytes());
        w.extend_from_slice(&self.signature);
        w
    }

    fn decode(wire: &[u8], expected_version: u8) -> Result<Self> {
        let mut off = 0usize;
        let need = |off: usize, n: usize| -> Result<()> {
            if wire.len() < off + n {
                Err(Error::format("truncated server hello"))
            } else {
                Ok(())
            }
        };

        need(off, 1)?;
        let version = wire[off];
        off += 1;
        if version != expected_version {
            return Err(Error::format(format!(
                "wire version mismatch: expected {expected_version}, got {version}"
            )));
        }

        need(off, 2)?;
        let kem_name_len = u16::from_be_bytes([wire[off], wire[off + 1]]) as usize;
        off += 2;
        need(off, kem_name_len)?;
        let kem_name = String::from_utf8(wire[off..off + kem_name_len].to_vec())
            .map_err(|_| Error::format("kem_name is not valid utf-8"))?;
        off += kem_name_len;

        need(off, 2)?;
        let sig_name_len = u16::from_be_bytes([wire[off], wire[off + 1]]) as usize;
        off += 2;
        need(off, sig_name_len)?;
        let sig_name = String::from_utf8(wire[off..off + sig_name_len].to_vec())
            .map_err(|_| Error::format("sig_name is not valid utf-8"))?;
        off += sig_name_len;

        need(off, 8)?;
        let mut session_id = [0u8; 8];
        session_id.copy_from_slice(&wire[off..off + 8]);
        off += 8;

        need(off, 8)?;
        let mut challenge = [0u8; 8];
        challenge.copy_from_slice(&wire[off..off + 8]);
        off += 8;

        need(off, 4)?;
        let kem_pub_len = u32::from_be_bytes([wire[off], wire[off + 1], wire[off + 2], wire[off + 3]]) as usize;
        off += 4;
        need(off, kem_pub_len)?;
        let kem_pub = wire[off..off + kem_pub_len].to_vec();
        off += kem_pub_len;

        need(off, 2)?;
        let sig_len = u16::from_be_bytes([wire[off], wire[off + 1]]) as usize;
        off += 2;
        need(off, sig_len)?;
        let signature = wire[off..off + sig_len].to_vec();

        Ok(Self {
            version,
            kem_name,
            sig_name,
            session_id,
            challenge,
            kem_pub,
            signature,
        })
    }
}

async fn write_framed<S: AsyncWrite + Unpin>(stream: &mut S, payload: &[u8]) -> Result<()> {
    stream
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await
        .map_err(|e| Error::protocol(format!("write failed: {e}")))?;
    stream
        .write_all(payload)
        .await
        .map_err(|e| Error::protocol(format!("write failed: {e}")))?;
    Ok(())
}

async fn read_framed<S: AsyncRead + Unpin>(stream: &mut S, max_len: usize) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| Error::protocol(format!("read failed: {e}")))?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_len {
        return Err(Error::format(format!("frame of {len} bytes exceeds {max_len}-byte limit")));
    }
    let mut buf = vec![0u8; len];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| Error::protocol(format!("read failed: {e}")))?;
    Ok(buf)
}

const MAX_HELLO_LEN: usize = 16 * 1024;
const MAX_CIPHERTEXT_LEN: usize = 8 * 1024;

/// GCS side of the handshake: generate an ephemeral KEM key pair, sign a
/// hello, wait for the drone's ciphertext + PSK tag, and derive transport
/// keys.
pub async fn run_gcs_handshake<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    wire_version: u8,
    suite: &Suite,
    signing_identity: &SigningIdentity,
    psk: &[u8],
    io_timeout: Duration,
) -> Result<HandshakeOutcome> {
    timeout(io_timeout, async {
        let kem_keypair = kem::KemKeypair::generate(suite.kem_name)?;
        let mut session_id = [0u8; 8];
        let mut challenge = [0u8; 8];
        rand::rngs::OsRng.fill_bytes(&mut session_id);
        rand::rngs::OsRng.fill_bytes(&mut challenge);

        let hello = ServerHello {
            version: wire_version,
            kem_name: suite.kem_name.to_string(),
            sig_name: suite.sig_name.to_string(),
            session_id,
            challenge,
            kem_pub: kem_keypair.public_key_bytes(),
            signature: Vec::new(),
        };
        let transcript = hello.transcript();
        let signature = signing_identity.sign(&transcript);
        let hello = ServerHello { signature, ..hello };
        let hello_wire = hello.encode();

        write_framed(stream, &hello_wire).await?;

        let ct_and_tag = read_framed(stream, MAX_CIPHERTEXT_LEN + 32).await?;
        if ct_and_tag.len() < 32 {
            return Err(Error::format("drone response shorter than the PSK tag alone"));
        }
        let (kem_ct, tag) = ct_and_tag.split_at(ct_and_tag.len() - 32);

        let mut mac = HmacSha256::new_from_slice(psk)
            .map_err(|_| Error::auth("PSK is not a valid HMAC key"))?;
        mac.update(&hello_wire);
        mac.verify_slice(tag)
            .map_err(|_| Error::auth("drone PSK authentication tag mismatch"))?;

        let shared_secret = kem_keypair.decapsulate(kem_ct)?;
        let (key_d2g, key_g2d) =
            kdf::derive_transport_keys(&session_id, suite.kem_name, suite.sig_name, &shared_secret)?;
        let (key_send, key_recv) = kdf::gcs_send_recv(&key_d2g, &key_g2d);

        Ok(HandshakeOutcome { session_id, key_send, key_recv })
    })
    .await
    .map_err(|_| Error::protocol("handshake timed out"))?
}

/// Drone side of the handshake: receive and verify the GCS hello,
/// encapsulate, authenticate with the PSK, and derive transport keys.
pub async fn run_drone_handshake<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    wire_version: u8,
    suite: &Suite,
    gcs_verifying_key: &[u8],
    psk: &[u8],
    io_timeout: Duration,
) -> Result<HandshakeOutcome> {
    timeout(io_timeout, async {
        let hello_wire = read_framed(stream, MAX_HELLO_LEN).await?;
        let hello = ServerHello::decode(&hello_wire, wire_version)?;

        if hello.kem_name != suite.kem_name || hello.sig_name != suite.sig_name {
            return Err(Error::auth(format!(
                "suite downgrade attempt: expected {}/{}, got {}/{}",
                suite.kem_name, suite.sig_name, hello.kem_name, hello.sig_name
            )));
        }

        let transcript = hello.transcript();
        sig::verify(&hello.sig_name, gcs_verifying_key, &transcript, &hello.signature)?;

        let expected_ct_len = kem::ciphertext_len(&hello.kem_name)?;
        let (kem_ct, shared_secret) = kem::encapsulate(&hello.kem_name, &hello.kem_pub)?;
        debug_assert_eq!(kem_ct.len(), expected_ct_len);

        let mut mac = HmacSha256::new_from_slice(psk)
            .map_err(|_| Error::auth("PSK is not a valid HMAC key"))?;
        mac.update(&hello_wire);
        let tag = mac.finalize().into_bytes();

        let mut response = Vec::with_capacity(kem_ct.len() + tag.len());
        response.extend_from_slice(&kem_ct);
        response.extend_from_slice(&tag);
        write_framed(stream, &response).await?;

        let (key_d2g, key_g2d) = kdf::derive_transport_keys(
            &hello.session_id,
            &hello.kem_name,
            &hello.sig_name,
            &shared_secret,
        )?;
        let (key_send, key_recv) = kdf::drone_send_recv(&key_d2g, &key_g2d);

        Ok(HandshakeOutcome { session_id: hello.session_id, key_send, key_recv })
    })
    .await
    .map_err(|_| Error::protocol("handshake timed out"))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn handshake_end_to_end_over_an_in_memory_duplex_stream() {
        let suite = pqtun_core::suites::get_suite(pqtun_core::suites::DEFAULT_SUITE_ID).unwrap();
        let gcs_identity = SigningIdentity::generate(suite.sig_name).unwrap();
        let gcs_vk = gcs_identity.verifying_key_bytes();
        let psk = vec![0x5au8; 32];

        let (mut gcs_stream, mut drone_stream) = duplex(64 * 1024);

        let suite_for_gcs = suite.clone();
        let psk_for_gcs = psk.clone();
        let gcs_task = tokio::spawn(async move {
            run_gcs_handshake(
                &mut gcs_stream,
                1,
                &suite_for_gcs,
                &gcs_identity,
                &psk_for_gcs,
                Duration::from_secs(5),
            )
            .await
        });

        let drone_outcome = run_drone_handshake(
            &mut drone_stream,
            1,
            &suite,
            &gcs_vk,
            &psk,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let gcs_outcome = gcs_task.await.unwrap().unwrap();

        assert_eq!(drone_outcome.session_id, gcs_outcome.session_id);
        assert_eq!(drone_outcome.key_send, gcs_outcome.key_recv);
        assert_eq!(drone_outcome.key_recv, gcs_outcome.key_send);
    }

    #[tokio::test]
    async fn drone_rejects_a_hello_signed_by_the_wrong_key() {
        let suite = pqtun_core::suites::get_suite(pqtun_core::suites::DEFAULT_SUITE_ID).unwrap();
        let gcs_identity = SigningIdentity::generate(suite.sig_name).unwrap();
        let impostor_vk = SigningIdentity::generate(suite.sig_name).unwrap().verifying_key_bytes();
        let psk = vec![0x11u8; 32];

        let (mut gcs_stream, mut drone_stream) = duplex(64 * 1024);
        let suite_for_gcs = suite.clone();
        let psk_for_gcs = psk.clone();
        tokio::spawn(async move {
            let _ = run_gcs_handshake(
                &mut gcs_stream,
                1,
                &suite_for_gcs,
                &gcs_identity,
                &psk_for_gcs,
                Duration::from_secs(5),
            )
            .await;
        });

        let result = run_drone_handshake(
            &mut drone_stream,
            1,
            &suite,
            &impostor_vk,
            &psk,
            Duration::from_secs(5),
        )
        .await;
        assert!(result.is_err());
    }
}
