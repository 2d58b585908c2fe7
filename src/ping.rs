use crate::dns;
use crate::icmp::{IcmpSocket, ProbeOutcome, ProbeReply, Transport, build_echo_request, send_and_receive};
use crate::stats::PingStatistics;
use crate::utils::{CancelToken, generate_identifier};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Every echo request carries this sequence number; the identifier tells probes apart.
pub const ECHO_SEQUENCE: u16 = 1;

#[derive(Debug, Clone)]
pub struct PingConfig {
    pub target: String,
    pub timeout_ms: u32,
    pub payload_size: usize,
    /// `None` keeps probing until cancelled.
    pub count: Option<u32>,
    pub interval: Duration,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            timeout_ms: 4000,
            payload_size: 32,
            count: Some(4),
            interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Resolving,
    Probing,
    Reporting,
    Cancelled,
}

/// Progress notifications handed to the caller while the session runs.
#[derive(Debug)]
pub enum PingEvent<'a> {
    Resolved(Ipv4Addr),
    Reply(&'a ProbeReply),
    Timeout,
    Failed(&'a anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct PingReport {
    pub target: String,
    pub address: Ipv4Addr,
    pub stats: PingStatistics,
    pub cancelled: bool,
}

pub struct PingSession<T: Transport> {
    config: PingConfig,
    transport: T,
    cancel: CancelToken,
    state: SessionState,
}

impl PingSession<IcmpSocket> {
    /// Open the raw socket up front so a privilege problem surfaces before any lookup.
    pub fn open(config: PingConfig, cancel: CancelToken) -> anyhow::Result<Self> {
        Ok(Self::with_transport(config, IcmpSocket::new()?, cancel))
    }
}

impl<T: Transport> PingSession<T> {
    pub fn with_transport(config: PingConfig, transport: T, cancel: CancelToken) -> Self {
        Self {
            config,
            transport,
            cancel,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn run<F>(&mut self, mut observer: F) -> anyhow::Result<PingReport>
    where
        F: FnMut(PingEvent<'_>),
    {
        self.state = SessionState::Resolving;
        let address = dns::resolve_ipv4(&self.config.target)?;
        observer(PingEvent::Resolved(address));

        self.state = SessionState::Probing;
        let timeout = Duration::from_millis(self.config.timeout_ms as u64);
        let mut stats = PingStatistics::new();
        let mut iteration: u32 = 0;

        loop {
            if self.config.count.is_some_and(|count| iteration >= count) {
                break;
            }
            if self.cancel.is_cancelled() {
                self.state = SessionState::Cancelled;
                break;
            }
            if iteration > 0 && !self.cancel.sleep(self.config.interval) {
                self.state = SessionState::Cancelled;
                break;
            }
            iteration = iteration.saturating_add(1);

            let identifier = generate_identifier();
            let packet = build_echo_request(identifier, ECHO_SEQUENCE, self.config.payload_size);

            match send_and_receive(
                &mut self.transport,
                address,
                &packet,
                identifier,
                timeout,
                &self.cancel,
            ) {
                Ok(ProbeOutcome::Reply(reply)) => {
                    stats.record_sent();
                    stats.record_received(reply.rtt_ms);
                    observer(PingEvent::Reply(&reply));
                }
                Ok(ProbeOutcome::Timeout) => {
                    stats.record_sent();
                    observer(PingEvent::Timeout);
                }
                Ok(ProbeOutcome::Cancelled) => {
                    self.state = SessionState::Cancelled;
                    break;
                }
                Err(e) => {
                    log::warn!("Probe {} to {} failed: {:#}", iteration, address, e);
                    stats.record_sent();
                    observer(PingEvent::Failed(&e));
                }
            }
        }

        let cancelled = self.state == SessionState::Cancelled;
        if !cancelled {
            self.state = SessionState::Reporting;
        }

        Ok(PingReport {
            target: self.config.target.clone(),
            address,
            stats,
            cancelled,
        })
    }
}
