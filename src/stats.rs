use crate::icmp::ProbeReply;
use crate::utils::format_time;
use std::net::Ipv4Addr;

#[derive(Debug, Clone)]
pub struct PingStatistics {
    pub packets_sent: u32,
    pub packets_received: u32,
    pub min_time: f64,
    pub max_time: f64,
    pub total_time: f64,
}

impl PingStatistics {
    pub fn new() -> Self {
        Self {
            packets_sent: 0,
            packets_received: 0,
            min_time: f64::INFINITY,
            max_time: 0.0,
            total_time: 0.0,
        }
    }

    pub fn record_sent(&mut self) {
        self.packets_sent += 1;
    }

    pub fn record_received(&mut self, time_ms: f64) {
        self.packets_received += 1;
        self.total_time += time_ms;

        if time_ms < self.min_time {
            self.min_time = time_ms;
        }

        if time_ms > self.max_time {
            self.max_time = time_ms;
        }
    }

    pub fn packets_lost(&self) -> u32 {
        self.packets_sent - self.packets_received
    }

    pub fn loss_percentage(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        (self.packets_lost() as f64 / self.packets_sent as f64) * 100.0
    }

    /// Accumulated round-trip time over packets *sent*, so losses pull the average down.
    pub fn average_time(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        self.total_time / self.packets_sent as f64
    }

    pub fn min_time(&self) -> Option<f64> {
        (self.packets_received > 0).then_some(self.min_time)
    }

    pub fn format_summary(&self, target: &str) -> String {
        let mut summary = format!(
            "\nPing statistics for {}:\n    Packets: Sent = {}, Received = {}, Lost = {} ({:.0}% loss),\n",
            target,
            self.packets_sent,
            self.packets_received,
            self.packets_lost(),
            self.loss_percentage()
        );

        if let Some(min_time) = self.min_time() {
            summary.push_str(&format!(
                "Approximate round trip times in milli-seconds:\n    Minimum = {:.0}ms, Maximum = {:.0}ms, Average = {:.0}ms\n",
                min_time,
                self.max_time,
                self.average_time()
            ));
        }

        summary
    }
}

impl Default for PingStatistics {
    fn default() -> Self {
        Self::new()
    }
}

pub fn format_response(response: &ProbeReply, resolved_name: Option<&str>) -> String {
    let source_display = match resolved_name {
        Some(name) => format!("{} [{}]", name, response.reply.source),
        None => response.reply.source.to_string(),
    };

    let time_display = if response.rtt_ms < 1.0 {
        format!("time{}", format_time(response.rtt_ms))
    } else {
        format!("time={}", format_time(response.rtt_ms))
    };

    format!(
        "Reply from {}: bytes={} {} TTL={}",
        source_display, response.reply.payload_size, time_display, response.reply.ttl
    )
}

pub fn format_header(target: &str, resolved_ip: Ipv4Addr, payload_size: usize) -> String {
    if target == resolved_ip.to_string() {
        format!("Pinging {} with {} bytes of data:", target, payload_size)
    } else {
        format!("Pinging {} [{}] with {} bytes of data:", target, resolved_ip, payload_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icmp::IcmpReply;

    #[test]
    fn test_statistics_calculation() {
        let mut stats = PingStatistics::new();

        stats.record_sent();
        stats.record_received(10.5);

        stats.record_sent();
        stats.record_received(20.3);

        stats.record_sent();

        assert_eq!(stats.packets_sent, 3);
        assert_eq!(stats.packets_received, 2);
        assert_eq!(stats.packets_lost(), 1);
        assert!((stats.loss_percentage() - 33.333333333333336).abs() < 0.0001);
        assert!((stats.average_time() - 30.8 / 3.0).abs() < 1e-9);
        assert_eq!(stats.min_time(), Some(10.5));
        assert_eq!(stats.max_time, 20.3);
    }

    #[test]
    fn test_empty_statistics() {
        let stats = PingStatistics::new();
        assert_eq!(stats.loss_percentage(), 0.0);
        assert_eq!(stats.average_time(), 0.0);
        assert_eq!(stats.min_time(), None);
    }

    #[test]
    fn test_response_formatting() {
        let response = ProbeReply {
            reply: IcmpReply {
                icmp_type: 0,
                code: 0,
                checksum: 0,
                identifier: 1,
                sequence: 1,
                ttl: 64,
                source: Ipv4Addr::new(8, 8, 8, 8),
                payload_size: 32,
                quoted_identifier: None,
            },
            rtt_ms: 15.7,
        };

        let formatted = format_response(&response, None);
        assert_eq!(formatted, "Reply from 8.8.8.8: bytes=32 time=16ms TTL=64");

        let named = format_response(&response, Some("dns.google"));
        assert!(named.starts_with("Reply from dns.google [8.8.8.8]"));
    }

    #[test]
    fn test_header_formatting() {
        let ip = Ipv4Addr::new(8, 8, 8, 8);
        assert_eq!(format_header("8.8.8.8", ip, 32), "Pinging 8.8.8.8 with 32 bytes of data:");
        assert_eq!(
            format_header("dns.google", ip, 32),
            "Pinging dns.google [8.8.8.8] with 32 bytes of data:"
        );
    }

    #[test]
    fn test_summary_formatting() {
        let mut stats = PingStatistics::new();
        stats.record_sent();
        stats.record_received(10.0);
        stats.record_sent();

        let summary = stats.format_summary("8.8.8.8");
        assert!(summary.contains("Ping statistics for 8.8.8.8"));
        assert!(summary.contains("Sent = 2"));
        assert!(summary.contains("Received = 1"));
        assert!(summary.contains("Lost = 1"));
        assert!(summary.contains("50% loss"));
        assert!(summary.contains("Average = 5ms"));
    }

    #[test]
    fn test_summary_without_replies_omits_times() {
        let mut stats = PingStatistics::new();
        stats.record_sent();
        let summary = stats.format_summary("10.0.0.1");
        assert!(summary.contains("100% loss"));
        assert!(!summary.contains("Minimum"));
    }
}
