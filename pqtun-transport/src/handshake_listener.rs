//! TCP handshake transport: GCS-side listener with rate limiting and IP
//! allowlisting (spec §4.2.1, §4.2.2), and the drone-side connector.

use crate::rate_limiter::HandshakeRateLimiter;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

/// Wraps a `TcpListener` with the server acceptance policy from spec
/// §4.2.2: per-IP rate limiting and an optional strict allowlist.
/// Rejected connects are closed silently, without ever handing the
/// socket to the handshake code, so a misbehaving peer never has the
/// chance to leak partial handshake state.
pub struct HandshakeListener {
    listener: TcpListener,
    rate_limiter: HandshakeRateLimiter,
    allowlist: Option<HashSet<IpAddr>>,
}

impl HandshakeListener {
    pub async fn bind(
        addr: SocketAddr,
        burst: u32,
        refill_per_s: f64,
        prune_interval: Duration,
        idle_ttl: Duration,
        allowlist: Option<HashSet<IpAddr>>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            rate_limiter: HandshakeRateLimiter::new(burst, refill_per_s, prune_interval, idle_ttl),
            allowlist,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts the next connection that survives the rate limit and
    /// allowlist checks, retrying internally on any connection that is
    /// rejected or that errors during `accept`.
    pub async fn accept(&mut self) -> std::io::Result<(TcpStream, SocketAddr)> {
        loop {
            let (stream, peer) = self.listener.accept().await?;

            if let Some(allowlist) = &self.allowlist {
                if !allowlist.contains(&peer.ip()) {
                    debug!(ip = %peer.ip(), "handshake connect rejected: not in allowlist");
                    continue;
                }
            }

            if !self.rate_limiter.allow(peer.ip()) {
                debug!(ip = %peer.ip(), "handshake connect rejected: rate limited");
                continue;
            }

            info!(peer = %peer, "handshake connect accepted");
            return Ok((stream, peer));
        }
    }
}

/// Drone-side connector: connects to the GCS handshake port with an
/// overall deadline (spec §4.2.2's per-socket I/O timeout applies to the
/// handshake itself; this bounds the TCP connect attempt).
pub async fn connect_with_timeout(addr: SocketAddr, timeout: Duration) -> std::io::Result<TcpStream> {
    tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "handshake connect timed out"))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limited_connects_are_retried_transparently() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut listener = HandshakeListener::bind(
            addr,
            1,
            1000.0,
            Duration::from_secs(60),
            Duration::from_secs(600),
            None,
        )
        .await
        .unwrap();
        let bound = listener.local_addr().unwrap();

        let _c1 = TcpStream::connect(bound).await.unwrap();
        let _c2 = TcpStream::connect(bound).await.unwrap();

        let (_stream, peer) = listener.accept().await.unwrap();
        assert_eq!(peer.ip(), bound.ip());
    }

    #[tokio::test]
    async fn allowlist_rejects_unlisted_peers_silently() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut deny_all: HashSet<IpAddr> = HashSet::new();
        deny_all.insert("10.255.255.1".parse().unwrap());
        let mut listener = HandshakeListener::bind(
            addr,
            5,
            1.0,
            Duration::from_secs(60),
            Duration::from_secs(600),
            Some(deny_all),
        )
        .await
        .unwrap();
        let bound = listener.local_addr().unwrap();

        let _c1 = TcpStream::connect(bound).await.unwrap();
        let accept_fut = listener.accept();
        let timed = tokio::time::timeout(Duration::from_millis(50), accept_fut).await;
        assert!(timed.is_err(), "127.0.0.1 is not in the allowlist and must not be accepted");
    }
}
