//! UDP socket binding helpers for the relay's encrypted and plaintext
//! endpoints (spec §4.4.1, §4.4.5).

use socket2::{Domain, Socket, Type};
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::warn;

/// Binds a UDP socket at `addr` with `SO_REUSEADDR`/`SO_REUSEPORT` set
/// (best effort, mirroring the teacher's `UdpPool::bind`), optionally
/// marking outgoing datagrams with a DSCP codepoint.
///
/// `dscp` is a 6-bit DiffServ codepoint (spec `ENCRYPTED_DSCP`, 0-63);
/// failure to apply it is logged and otherwise ignored, since the
/// socket is still perfectly usable without traffic marking.
pub fn bind_udp(addr: SocketAddr, dscp: Option<u8>) -> io::Result<UdpSocket> {
    let domain = Domain::for_address(addr);
    let socket = Socket::new(domain, Type::DGRAM, None)?;

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    if let Err(e) = socket.set_reuse_port(true) {
        warn!(error = %e, "failed to set SO_REUSEPORT on udp socket");
    }
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;

    if let Some(dscp) = dscp {
        // DSCP occupies the top 6 bits of the IP TOS/traffic-class byte.
        let tos = (dscp as u32) << 2;
        if let Err(e) = socket.set_tos(tos) {
            warn!(error = %e, dscp, "failed to set DSCP on encrypted udp socket");
        }
    }

    socket.set_nonblocking(true)?;
    let std_sock: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_sock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_on_an_ephemeral_loopback_port() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let sock = bind_udp(addr, None).unwrap();
        assert!(sock.local_addr().unwrap().port() > 0);
    }

    #[tokio::test]
    async fn dscp_marking_does_not_fail_the_bind() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let sock = bind_udp(addr, Some(46)).unwrap();
        assert!(sock.local_addr().is_ok());
    }
}
