//! Packet capture
//!
//! Owns the receiving socket for one scenario. The socket must be bound
//! before the SUT starts; anything the SUT sends earlier is lost.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::common::{Error, Result};

/// One received datagram
#[derive(Debug, Clone)]
pub struct CapturedPacket {
    pub bytes: Vec<u8>,
    /// Monotonic arrival time, taken as soon as the receive completes
    pub received_at: Instant,
    pub source: SocketAddr,
}

/// Where a capture listens, derived from the SUT's destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    /// Bind directly to the destination address
    Unicast(SocketAddrV4),
    /// Bind the wildcard address on `port` and join `group`
    Multicast { group: Ipv4Addr, port: u16 },
}

impl CaptureTarget {
    /// Pick the capture mode for a SUT destination
    pub fn from_destination(ip: &str, port: u16) -> Result<Self> {
        let addr: Ipv4Addr = ip.parse().map_err(|_| {
            Error::Config(format!(
                "cannot capture on destination_ip '{}': not an IPv4 address",
                ip
            ))
        })?;

        if addr.is_multicast() {
            Ok(Self::Multicast { group: addr, port })
        } else {
            Ok(Self::Unicast(SocketAddrV4::new(addr, port)))
        }
    }
}

/// A receiving UDP socket
#[derive(Debug)]
pub struct PacketCapture {
    socket: Option<UdpSocket>,
    local_addr: SocketAddr,
}

impl PacketCapture {
    /// Open a capture socket for a target
    ///
    /// Must be called from within a tokio runtime.
    pub fn open_target(target: &CaptureTarget) -> Result<Self> {
        match *target {
            CaptureTarget::Unicast(addr) => Self::open(*addr.ip(), addr.port(), None),
            CaptureTarget::Multicast { group, port } => {
                Self::open(Ipv4Addr::UNSPECIFIED, port, Some(group))
            }
        }
    }

    /// Bind to `bind_ip:port`, joining `multicast_group` on the default
    /// interface when given
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(
        bind_ip: Ipv4Addr,
        port: u16,
        multicast_group: Option<Ipv4Addr>,
    ) -> Result<Self> {
        let bind_addr = SocketAddrV4::new(bind_ip, port);
        let bind_err = |source: std::io::Error| Error::CaptureBind {
            addr: bind_addr.to_string(),
            source,
        };

        let socket =
            Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
        if multicast_group.is_some() {
            socket.set_reuse_address(true).map_err(bind_err)?;
        }
        socket.bind(&bind_addr.into()).map_err(bind_err)?;
        if let Some(group) = multicast_group {
            socket
                .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
                .map_err(|source| Error::CaptureBind {
                    addr: format!("{} (join {})", bind_addr, group),
                    source,
                })?;
        }
        socket.set_nonblocking(true).map_err(bind_err)?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket).map_err(bind_err)?;
        let local_addr = socket.local_addr()?;

        tracing::debug!(%local_addr, group = ?multicast_group, "Capture socket bound");

        Ok(Self {
            socket: Some(socket),
            local_addr,
        })
    }

    /// Address the socket is bound to (kept after close)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Wait for the next datagram with no deadline
    ///
    /// Datagrams longer than `max_size` are truncated.
    pub async fn recv(&self, max_size: usize) -> Result<CapturedPacket> {
        let socket = self.socket.as_ref().ok_or(Error::CaptureClosed)?;
        let mut buf = vec![0u8; max_size];
        let (len, source) = socket.recv_from(&mut buf).await?;
        let received_at = Instant::now();
        buf.truncate(len);

        tracing::trace!(len, %source, "Captured datagram");
        Ok(CapturedPacket {
            bytes: buf,
            received_at,
            source,
        })
    }

    /// Wait for the next datagram, giving up after `timeout`
    ///
    /// Returns `Ok(None)` when the deadline passes without a datagram.
    pub async fn recv_timeout(
        &self,
        max_size: usize,
        timeout: Duration,
    ) -> Result<Option<CapturedPacket>> {
        match tokio::time::timeout(timeout, self.recv(max_size)).await {
            Ok(packet) => packet.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Release the socket; calling again is a no-op
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            tracing::debug!(local_addr = %self.local_addr, "Capture socket closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_from_destination() {
        assert_eq!(
            CaptureTarget::from_destination("127.0.0.1", 5000).unwrap(),
            CaptureTarget::Unicast("127.0.0.1:5000".parse().unwrap())
        );
        assert_eq!(
            CaptureTarget::from_destination("239.0.0.99", 6000).unwrap(),
            CaptureTarget::Multicast {
                group: Ipv4Addr::new(239, 0, 0, 99),
                port: 6000
            }
        );
        assert!(matches!(
            CaptureTarget::from_destination("localhost", 5000),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_unicast_receive() {
        let capture = PacketCapture::open(Ipv4Addr::LOCALHOST, 0, None).unwrap();
        let dest = capture.local_addr();

        let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"abcdefghijklmnopqrstuvwxyz", dest).unwrap();

        let packet = capture
            .recv_timeout(1024, Duration::from_secs(2))
            .await
            .unwrap()
            .expect("datagram");
        assert_eq!(packet.bytes, b"abcdefghijklmnopqrstuvwxyz");
        assert_eq!(packet.source, sender.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_oversized_datagram_is_truncated() {
        let capture = PacketCapture::open(Ipv4Addr::LOCALHOST, 0, None).unwrap();
        let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(&[7u8; 64], capture.local_addr()).unwrap();

        let packet = capture.recv(16).await.unwrap();
        assert_eq!(packet.bytes.len(), 16);
    }

    #[tokio::test]
    async fn test_arrival_order_and_timestamps() {
        let capture = PacketCapture::open(Ipv4Addr::LOCALHOST, 0, None).unwrap();
        let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"one", capture.local_addr()).unwrap();
        sender.send_to(b"two", capture.local_addr()).unwrap();

        let first = capture.recv(64).await.unwrap();
        let second = capture.recv(64).await.unwrap();
        assert_eq!(first.bytes, b"one");
        assert_eq!(second.bytes, b"two");
        assert!(second.received_at >= first.received_at);
    }

    #[tokio::test]
    async fn test_timeout_returns_none() {
        let capture = PacketCapture::open(Ipv4Addr::LOCALHOST, 0, None).unwrap();
        let packet = capture
            .recv_timeout(1024, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(packet.is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_releases_port() {
        let mut capture = PacketCapture::open(Ipv4Addr::LOCALHOST, 0, None).unwrap();
        let addr = capture.local_addr();
        capture.close();
        capture.close();
        assert!(!capture.is_open());
        assert!(matches!(capture.recv(64).await, Err(Error::CaptureClosed)));

        // the port can be bound again once closed
        let again = PacketCapture::open(Ipv4Addr::LOCALHOST, addr.port(), None).unwrap();
        assert_eq!(again.local_addr(), addr);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_capture_error() {
        let first = PacketCapture::open(Ipv4Addr::LOCALHOST, 0, None).unwrap();
        let err = PacketCapture::open(Ipv4Addr::LOCALHOST, first.local_addr().port(), None)
            .unwrap_err();
        assert!(matches!(err, Error::CaptureBind { .. }));
    }
}
