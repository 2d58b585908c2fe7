use crate::icmp::{IcmpReply, Transport, parse_icmp_response};
use crate::utils::CancelToken;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Longest single wait on the socket, so cancellation is noticed promptly.
const POLL_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ProbeReply {
    pub reply: IcmpReply,
    pub rtt_ms: f64,
}

#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    Reply(ProbeReply),
    Timeout,
    Cancelled,
}

#[cfg(test)]
impl ProbeOutcome {
    pub fn reply(&self) -> Option<&ProbeReply> {
        match self {
            ProbeOutcome::Reply(reply) => Some(reply),
            _ => None,
        }
    }
}

/// Send `packet` once and wait for the echo reply carrying `expected_identifier`.
///
/// Replies with other identifiers, other ICMP types and malformed datagrams are
/// dropped while the remaining budget keeps shrinking.
pub fn send_and_receive<T: Transport + ?Sized>(
    transport: &mut T,
    destination: Ipv4Addr,
    packet: &[u8],
    expected_identifier: u16,
    timeout: Duration,
    cancel: &CancelToken,
) -> anyhow::Result<ProbeOutcome> {
    send_and_await(transport, destination, packet, timeout, cancel, |reply| {
        reply.is_echo_reply() && reply.identifier == expected_identifier
    })
}

/// Send `packet` once, then wait until `accept` takes a reply or `timeout` runs out.
///
/// Round-trip time is measured from the instant just before the send.
pub fn send_and_await<T, F>(
    transport: &mut T,
    destination: Ipv4Addr,
    packet: &[u8],
    timeout: Duration,
    cancel: &CancelToken,
    mut accept: F,
) -> anyhow::Result<ProbeOutcome>
where
    T: Transport + ?Sized,
    F: FnMut(&IcmpReply) -> bool,
{
    let start_time = Instant::now();
    let deadline = start_time + timeout;

    transport.send_to(packet, destination)?;

    loop {
        if cancel.is_cancelled() {
            return Ok(ProbeOutcome::Cancelled);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(ProbeOutcome::Timeout);
        }

        let Some(datagram) = transport.recv_from(remaining.min(POLL_SLICE))? else {
            continue;
        };

        let reply = match parse_icmp_response(&datagram.data) {
            Ok(reply) => reply,
            Err(e) => {
                log::debug!("Discarding datagram from {}: {}", datagram.source, e);
                continue;
            }
        };

        if !accept(&reply) {
            log::debug!(
                "Discarding ICMP type {} code {} id {} seq {} from {}",
                reply.icmp_type,
                reply.code,
                reply.identifier,
                reply.sequence,
                reply.source
            );
            continue;
        }

        log::debug!(
            "Accepted ICMP type {} code {} (checksum {:#06x}) from {}",
            reply.icmp_type,
            reply.code,
            reply.checksum,
            reply.source
        );

        return Ok(ProbeOutcome::Reply(ProbeReply {
            reply,
            rtt_ms: start_time.elapsed().as_secs_f64() * 1000.0,
        }));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::icmp::packet::tests::ip_datagram;
    use crate::icmp::{Datagram, ICMP_ECHO_REPLY, ICMP_TIME_EXCEEDED, build_echo_request};
    use std::collections::VecDeque;
    use std::io;

    /// Hands out queued datagrams, then reports silence.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        pub inbound: VecDeque<Vec<u8>>,
        pub sent: Vec<(Vec<u8>, Ipv4Addr)>,
        /// Number of upcoming sends that fail.
        pub failing_sends: usize,
    }

    impl Transport for ScriptedTransport {
        fn send_to(&mut self, packet: &[u8], destination: Ipv4Addr) -> io::Result<()> {
            if self.failing_sends > 0 {
                self.failing_sends -= 1;
                return Err(io::Error::other("network unreachable"));
            }
            self.sent.push((packet.to_vec(), destination));
            Ok(())
        }

        fn recv_from(&mut self, wait: Duration) -> io::Result<Option<Datagram>> {
            match self.inbound.pop_front() {
                Some(data) => Ok(Some(Datagram { data, source: Ipv4Addr::new(10, 0, 0, 9) })),
                None => {
                    std::thread::sleep(wait);
                    Ok(None)
                }
            }
        }

        fn set_ttl(&mut self, _ttl: u32) -> io::Result<()> {
            Ok(())
        }
    }

    const TARGET: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 9);

    #[test]
    fn test_matching_reply_is_accepted() {
        let mut transport = ScriptedTransport::default();
        transport.inbound.push_back(ip_datagram(TARGET, 60, ICMP_ECHO_REPLY, 42, 32));

        let packet = build_echo_request(42, 1, 32);
        let outcome = send_and_receive(
            &mut transport,
            TARGET,
            &packet,
            42,
            Duration::from_millis(200),
            &CancelToken::new(),
        )
        .unwrap();

        let reply = outcome.reply().expect("reply");
        assert_eq!(reply.reply.ttl, 60);
        assert_eq!(reply.reply.payload_size, 32);
        assert!(reply.rtt_ms >= 0.0);
        assert_eq!(transport.sent.len(), 1);
        assert_eq!(transport.sent[0].0, packet);
    }

    #[test]
    fn test_mismatched_and_malformed_are_skipped() {
        let mut transport = ScriptedTransport::default();
        transport.inbound.push_back(vec![0x45, 0x00, 0x01]);
        transport.inbound.push_back(ip_datagram(TARGET, 60, ICMP_ECHO_REPLY, 7, 32));
        transport.inbound.push_back(ip_datagram(TARGET, 60, ICMP_TIME_EXCEEDED, 42, 32));
        transport.inbound.push_back(ip_datagram(TARGET, 61, ICMP_ECHO_REPLY, 42, 16));

        let outcome = send_and_receive(
            &mut transport,
            TARGET,
            &build_echo_request(42, 1, 16),
            42,
            Duration::from_millis(500),
            &CancelToken::new(),
        )
        .unwrap();

        let reply = outcome.reply().expect("reply");
        assert_eq!(reply.reply.ttl, 61);
        assert_eq!(reply.reply.payload_size, 16);
        assert!(transport.inbound.is_empty());
    }

    #[test]
    fn test_silence_times_out() {
        let mut transport = ScriptedTransport::default();
        transport.inbound.push_back(ip_datagram(TARGET, 60, ICMP_ECHO_REPLY, 1, 32));

        let started = Instant::now();
        let outcome = send_and_receive(
            &mut transport,
            TARGET,
            &build_echo_request(2, 1, 32),
            2,
            Duration::from_millis(150),
            &CancelToken::new(),
        )
        .unwrap();

        assert!(matches!(outcome, ProbeOutcome::Timeout));
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn test_send_failure_propagates() {
        let mut transport = ScriptedTransport {
            failing_sends: 1,
            ..Default::default()
        };
        let result = send_and_receive(
            &mut transport,
            TARGET,
            &build_echo_request(4, 1, 8),
            4,
            Duration::from_millis(50),
            &CancelToken::new(),
        );

        assert!(result.is_err());
        assert!(transport.sent.is_empty());
    }

    #[test]
    fn test_cancelled_before_reply() {
        let cancel = CancelToken::new();
        cancel.cancel();

        let mut transport = ScriptedTransport::default();
        let outcome = send_and_receive(
            &mut transport,
            TARGET,
            &build_echo_request(3, 1, 8),
            3,
            Duration::from_secs(5),
            &cancel,
        )
        .unwrap();

        assert!(matches!(outcome, ProbeOutcome::Cancelled));
    }
}
