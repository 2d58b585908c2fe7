use crate::dns;
use crate::icmp::{IcmpSocket, ProbeOutcome, Transport, build_echo_request, send_and_await};
use crate::ping::ECHO_SEQUENCE;
use crate::utils::{CancelToken, format_time, generate_identifier};
use std::net::Ipv4Addr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TraceConfig {
    pub target: String,
    pub max_hops: u32,
    pub timeout_ms: u32,
    pub payload_size: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            max_hops: 30,
            timeout_ms: 3000,
            payload_size: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceState {
    Resolving,
    HopLoop(u32),
    /// The destination answered with an echo reply.
    Completed,
    /// Ran out of hops without hearing from the destination.
    Exhausted,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HopRecord {
    pub ttl: u32,
    pub address: Option<Ipv4Addr>,
    pub elapsed_ms: Option<f64>,
    pub icmp_type: Option<u8>,
    pub terminal: bool,
}

impl HopRecord {
    fn unreachable(ttl: u32) -> Self {
        Self {
            ttl,
            address: None,
            elapsed_ms: None,
            icmp_type: None,
            terminal: false,
        }
    }
}

#[derive(Debug)]
pub enum TraceEvent<'a> {
    Resolved(Ipv4Addr),
    Hop(&'a HopRecord),
}

#[derive(Debug, Clone)]
pub struct TraceReport {
    pub target: String,
    pub address: Ipv4Addr,
    pub hops: Vec<HopRecord>,
    pub state: TraceState,
}

impl TraceReport {
    pub fn reached_destination(&self) -> bool {
        self.state == TraceState::Completed
    }
}

pub struct TracerouteSession<T: Transport> {
    config: TraceConfig,
    transport: T,
    cancel: CancelToken,
    state: TraceState,
}

impl TracerouteSession<IcmpSocket> {
    pub fn open(config: TraceConfig, cancel: CancelToken) -> anyhow::Result<Self> {
        Ok(Self::with_transport(config, IcmpSocket::new()?, cancel))
    }
}

impl<T: Transport> TracerouteSession<T> {
    pub fn with_transport(config: TraceConfig, transport: T, cancel: CancelToken) -> Self {
        Self {
            config,
            transport,
            cancel,
            state: TraceState::Resolving,
        }
    }

    pub fn state(&self) -> TraceState {
        self.state
    }

    pub fn run<F>(&mut self, mut observer: F) -> anyhow::Result<TraceReport>
    where
        F: FnMut(TraceEvent<'_>),
    {
        self.state = TraceState::Resolving;
        let address = dns::resolve_ipv4(&self.config.target)?;
        observer(TraceEvent::Resolved(address));

        let timeout = Duration::from_millis(self.config.timeout_ms as u64);
        let mut hops = Vec::new();
        self.state = TraceState::Exhausted;

        for ttl in 1..=self.config.max_hops {
            if self.cancel.is_cancelled() {
                self.state = TraceState::Cancelled;
                break;
            }
            self.state = TraceState::HopLoop(ttl);

            // The option sticks to the socket, so it is rewritten before every send.
            // Without it this hop would go out with the previous TTL.
            let outcome = match self.transport.set_ttl(ttl) {
                Ok(()) => {
                    let identifier = generate_identifier();
                    let packet =
                        build_echo_request(identifier, ECHO_SEQUENCE, self.config.payload_size);

                    // Routers answer with their own identifier; the request's one is only
                    // available in the quoted header, when they include it.
                    send_and_await(
                        &mut self.transport,
                        address,
                        &packet,
                        timeout,
                        &self.cancel,
                        |reply| {
                            if reply.is_echo_reply() {
                                reply.identifier == identifier
                            } else if reply.is_time_exceeded() || reply.is_dest_unreachable() {
                                reply.quoted_identifier.is_none_or(|quoted| quoted == identifier)
                            } else {
                                false
                            }
                        },
                    )
                }
                Err(e) => Err(anyhow::Error::new(e).context(format!("failed to set TTL {}", ttl))),
            };

            let record = match outcome {
                Ok(ProbeOutcome::Reply(probe)) => HopRecord {
                    ttl,
                    address: Some(probe.reply.source),
                    elapsed_ms: Some(probe.rtt_ms),
                    icmp_type: Some(probe.reply.icmp_type),
                    terminal: probe.reply.is_echo_reply(),
                },
                Ok(ProbeOutcome::Timeout) => HopRecord::unreachable(ttl),
                Ok(ProbeOutcome::Cancelled) => {
                    self.state = TraceState::Cancelled;
                    break;
                }
                Err(e) => {
                    log::warn!("Hop {} probe failed: {:#}", ttl, e);
                    HopRecord::unreachable(ttl)
                }
            };

            log::debug!("Hop {}: {:?}", ttl, record);
            observer(TraceEvent::Hop(&record));
            let terminal = record.terminal;
            hops.push(record);

            if terminal {
                self.state = TraceState::Completed;
                break;
            }
            self.state = TraceState::Exhausted;
        }

        Ok(TraceReport {
            target: self.config.target.clone(),
            address,
            hops,
            state: self.state,
        })
    }
}

pub fn format_header(target: &str, resolved_ip: Ipv4Addr, max_hops: u32) -> String {
    if target == resolved_ip.to_string() {
        format!("Tracing route to {} over a maximum of {} hops:\n", target, max_hops)
    } else {
        format!(
            "Tracing route to {} [{}]\nover a maximum of {} hops:\n",
            target, resolved_ip, max_hops
        )
    }
}

pub fn format_hop(hop: &HopRecord, resolved_name: Option<&str>) -> String {
    match (hop.address, hop.elapsed_ms) {
        (Some(address), Some(elapsed)) => {
            let host = match resolved_name {
                Some(name) => format!("{} [{}]", name, address),
                None => address.to_string(),
            };
            format!("{:>3}  {:>6}  {}", hop.ttl, format_time(elapsed), host)
        }
        _ => format!("{:>3}  {:>6}  Request timed out.", hop.ttl, "*"),
    }
}

pub fn format_summary(report: &TraceReport) -> String {
    if report.reached_destination() {
        return "\nTrace complete.".to_string();
    }
    match report.state {
        TraceState::Cancelled => "\nTrace cancelled.".to_string(),
        _ => format!(
            "\nDestination {} [{}] not reached within {} hops.",
            report.target,
            report.address,
            report.hops.len()
        ),
    }
}
