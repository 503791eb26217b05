//! Pattern matchers for individual rule types

use std::net::IpAddr;

/// Right-aligned label comparison with `*` wildcards
///
/// `*.example.com` matches `api.example.com` but not `example.com`;
/// `example.com` matches itself and any subdomain.
pub fn domain_matches(pattern: &str, domain: &str) -> bool {
    let pattern = pattern.trim().trim_end_matches('.');
    let domain = domain.trim().trim_end_matches('.');
    if pattern.is_empty() || domain.is_empty() {
        return false;
    }

    let pattern_labels: Vec<&str> = pattern.split('.').collect();
    let domain_labels: Vec<&str> = domain.split('.').collect();
    if pattern_labels.len() > domain_labels.len() {
        return false;
    }

    pattern_labels
        .iter()
        .rev()
        .zip(domain_labels.iter().rev())
        .all(|(p, d)| *p == "*" || p.eq_ignore_ascii_case(d))
}

/// A parsed `network/prefix` pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cidr {
    /// IPv4 network, stored pre-masked
    V4 {
        /// Masked network bits
        network: u32,
        /// Mask derived from the prefix length
        mask: u32,
    },
    /// IPv6 network, stored pre-masked
    V6 {
        /// Masked network bits
        network: u128,
        /// Mask derived from the prefix length
        mask: u128,
    },
}

impl Cidr {
    /// Parse `a.b.c.d/n`, `x::y/n` or a bare address (full-length prefix)
    pub fn parse(pattern: &str) -> Option<Self> {
        let pattern = pattern.trim();
        let (ip_str, prefix) = match pattern.split_once('/') {
            Some((ip, prefix)) => (ip.trim(), Some(prefix.trim().parse::<u32>().ok()?)),
            None => (pattern, None),
        };

        match ip_str.parse::<IpAddr>().ok()? {
            IpAddr::V4(ip) => {
                let prefix = prefix.unwrap_or(32);
                if prefix > 32 {
                    return None;
                }
                let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
                Some(Cidr::V4 {
                    network: u32::from(ip) & mask,
                    mask,
                })
            }
            IpAddr::V6(ip) => {
                let prefix = prefix.unwrap_or(128);
                if prefix > 128 {
                    return None;
                }
                let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
                Some(Cidr::V6 {
                    network: u128::from(ip) & mask,
                    mask,
                })
            }
        }
    }

    /// Whether `ip` falls inside this network
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self, ip) {
            (Cidr::V4 { network, mask }, IpAddr::V4(ip)) => u32::from(ip) & mask == *network,
            (Cidr::V6 { network, mask }, IpAddr::V6(ip)) => u128::from(ip) & mask == *network,
            _ => false,
        }
    }
}
