use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::Result;

/// Options for a receiving socket.
#[derive(Debug, Clone)]
pub struct ReceiveOptions {
    /// Read timeout; `recv_from` returns `Ok(None)` when it expires.
    pub read_timeout: Duration,
    /// Requested `SO_RCVBUF`. Failure to apply it is logged, not fatal.
    pub buffer_size: Option<usize>,
}

/// UDP transport for RTP media and SAP announcements.
///
/// Senders bind a single ephemeral socket (`0.0.0.0:0`). Receivers bind the
/// wildcard address on a fixed port and, for class-D addresses, join the
/// multicast group with address reuse so several receivers can share a port.
///
/// This layer is address-only. It knows nothing about
/// streams or sessions.
#[derive(Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind an ephemeral UDP socket for outbound traffic.
    pub fn bind() -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// Bind an ephemeral sender with a multicast TTL, optionally pinned to
    /// the interface owning `interface`.
    pub fn sender(multicast_ttl: u32, interface: Option<Ipv4Addr>) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_multicast_ttl_v4(multicast_ttl)?;
        socket.set_multicast_loop_v4(true)?;
        if let Some(ip) = interface.filter(|ip| !ip.is_unspecified()) {
            if let Err(e) = socket.set_multicast_if_v4(&ip) {
                tracing::warn!(interface = %ip, error = %e, "could not select multicast interface");
            }
        }
        socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)).into())?;
        Ok(Self {
            socket: Arc::new(socket.into()),
        })
    }

    /// Bind a receiver on `port`, joining `address` when it is multicast.
    pub fn receiver(address: Ipv4Addr, port: u16, options: &ReceiveOptions) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

        let multicast = address.is_multicast();
        if multicast {
            socket.set_reuse_address(true)?;
            #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
            socket.set_reuse_port(true)?;
        }

        if let Some(size) = options.buffer_size {
            if let Err(e) = socket.set_recv_buffer_size(size) {
                tracing::warn!(size, error = %e, "could not enlarge receive buffer");
            }
        }

        socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)).into())?;

        if multicast {
            socket.join_multicast_v4(&address, &Ipv4Addr::UNSPECIFIED)?;
            tracing::debug!(group = %address, port, "joined multicast group");
        }

        socket.set_read_timeout(Some(options.read_timeout))?;

        Ok(Self {
            socket: Arc::new(socket.into()),
        })
    }

    /// Send raw bytes to a specific socket address.
    pub fn send_to(&self, payload: &[u8], addr: SocketAddr) -> Result<usize> {
        Ok(self.socket.send_to(payload, addr)?)
    }

    /// Receive one datagram. `Ok(None)` means the read timeout expired.
    pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receiver_times_out_without_traffic() {
        let options = ReceiveOptions {
            read_timeout: Duration::from_millis(20),
            buffer_size: None,
        };
        let rx = UdpTransport::receiver(Ipv4Addr::LOCALHOST, 0, &options).unwrap();
        let mut buf = [0u8; 16];
        assert!(rx.recv_from(&mut buf).unwrap().is_none());
    }

    #[test]
    fn loopback_send_and_receive() {
        let options = ReceiveOptions {
            read_timeout: Duration::from_secs(1),
            buffer_size: Some(1 << 20),
        };
        let rx = UdpTransport::receiver(Ipv4Addr::LOCALHOST, 0, &options).unwrap();
        let port = rx.local_addr().unwrap().port();

        let tx = UdpTransport::bind().unwrap();
        tx.send_to(b"hello", SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
            .unwrap();

        let mut buf = [0u8; 16];
        let (n, _) = rx.recv_from(&mut buf).unwrap().expect("datagram");
        assert_eq!(&buf[..n], b"hello");
    }
}
