use crate::icmp::SessionError;
use dns_lookup::{lookup_addr, lookup_host};
use std::net::{IpAddr, Ipv4Addr};

/// Resolve `hostname` to a single IPv4 address. Literal addresses skip the lookup.
pub fn resolve_ipv4(hostname: &str) -> anyhow::Result<Ipv4Addr> {
    let resolution_error = |reason: String| SessionError::Resolution {
        host: hostname.to_string(),
        reason,
    };

    if let Ok(ip) = hostname.parse::<IpAddr>() {
        return match ip {
            IpAddr::V4(v4) => Ok(v4),
            IpAddr::V6(_) => Err(resolution_error("IPv6 addresses are not supported".into()).into()),
        };
    }

    let addresses = lookup_host(hostname).map_err(|e| resolution_error(e.to_string()))?;

    let address = addresses
        .into_iter()
        .find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| resolution_error("no IPv4 address found".into()))?;

    log::debug!("Resolved {} to {}", hostname, address);
    Ok(address)
}

pub fn reverse_lookup(ip: Ipv4Addr) -> Option<String> {
    lookup_addr(&IpAddr::V4(ip)).ok()
}
