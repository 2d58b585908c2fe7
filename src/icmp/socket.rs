use crate::icmp::SessionError;
use anyhow::Context;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

const RECV_BUFFER_SIZE: usize = 2048;

/// A datagram read off the wire, IP header included.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub data: Vec<u8>,
    pub source: Ipv4Addr,
}

/// The raw-socket operations a probe needs.
pub trait Transport {
    fn send_to(&mut self, packet: &[u8], destination: Ipv4Addr) -> io::Result<()>;

    /// Wait at most `wait` for one datagram. `Ok(None)` means nothing arrived.
    fn recv_from(&mut self, wait: Duration) -> io::Result<Option<Datagram>>;

    /// Outgoing TTL for every following send until changed again.
    fn set_ttl(&mut self, ttl: u32) -> io::Result<()>;
}

pub struct IcmpSocket {
    socket: Socket,
}

impl IcmpSocket {
    pub fn new() -> anyhow::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
            .map_err(socket_error)?;

        socket
            .set_nonblocking(false)
            .context("failed to configure raw ICMP socket")?;

        Ok(Self { socket })
    }
}

/// Only EPERM/EACCES mean the process lacks the privilege for raw sockets.
fn socket_error(e: io::Error) -> anyhow::Error {
    if e.kind() == io::ErrorKind::PermissionDenied {
        SessionError::Permission(e).into()
    } else {
        anyhow::Error::new(e).context("failed to create raw ICMP socket")
    }
}

impl Transport for IcmpSocket {
    fn send_to(&mut self, packet: &[u8], destination: Ipv4Addr) -> io::Result<()> {
        let target_addr = SocketAddr::new(IpAddr::V4(destination), 0);
        log::debug!("Sending ICMP packet to {}: {} bytes", destination, packet.len());
        self.socket.send_to(packet, &target_addr.into())?;
        Ok(())
    }

    fn recv_from(&mut self, wait: Duration) -> io::Result<Option<Datagram>> {
        // A zero read timeout would mean "block forever".
        let wait = wait.max(Duration::from_millis(1));
        self.socket.set_read_timeout(Some(wait))?;

        let mut buffer = [MaybeUninit::<u8>::uninit(); RECV_BUFFER_SIZE];
        let (len, addr) = match self.socket.recv_from(&mut buffer) {
            Ok(result) => result,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Ok(None);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(None),
            Err(e) => return Err(e),
        };

        // SAFETY: recv_from initialised the first `len` bytes.
        let data: Vec<u8> = buffer[..len]
            .iter()
            .map(|b| unsafe { b.assume_init() })
            .collect();

        let source = match addr.as_socket() {
            Some(SocketAddr::V4(v4)) => *v4.ip(),
            other => {
                log::warn!("Ignoring datagram from non-IPv4 address {:?}", other);
                return Ok(None);
            }
        };

        log::debug!("Received {} bytes from {}", len, source);
        Ok(Some(Datagram { data, source }))
    }

    fn set_ttl(&mut self, ttl: u32) -> io::Result<()> {
        self.socket.set_ttl(ttl)
    }
}
