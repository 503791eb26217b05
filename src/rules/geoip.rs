//! Country lookup for `geo-ip` rules
//!
//! The rule engine only sees the [`CountryLookup`] trait. The bundled
//! [`StaticCountryTable`] is a small built-in range table; a database-backed
//! implementation can be plugged in without touching the engine.

use lazy_static::lazy_static;
use std::fmt::Debug;
use std::net::{IpAddr, Ipv4Addr};

/// Resolve an IP to an ISO country code
pub trait CountryLookup: Send + Sync + Debug {
    /// Country code for `ip`, if known
    fn lookup(&self, ip: IpAddr) -> Option<String>;
}

/// Inclusive IPv4 range tagged with a country code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryRange {
    /// First address
    pub start: u32,
    /// Last address (inclusive)
    pub end: u32,
    /// ISO 3166 alpha-2 code
    pub country: String,
}

impl CountryRange {
    /// Build from dotted addresses
    pub fn new(start: Ipv4Addr, end: Ipv4Addr, country: impl Into<String>) -> Self {
        CountryRange {
            start: u32::from(start),
            end: u32::from(end),
            country: country.into(),
        }
    }
}

lazy_static! {
    static ref BUILTIN_RANGES: Vec<CountryRange> = vec![
        CountryRange::new(Ipv4Addr::new(1, 0, 1, 0), Ipv4Addr::new(1, 0, 3, 255), "CN"),
        CountryRange::new(Ipv4Addr::new(1, 0, 8, 0), Ipv4Addr::new(1, 0, 15, 255), "CN"),
        CountryRange::new(Ipv4Addr::new(36, 96, 0, 0), Ipv4Addr::new(36, 127, 255, 255), "CN"),
        CountryRange::new(Ipv4Addr::new(114, 114, 0, 0), Ipv4Addr::new(114, 114, 255, 255), "CN"),
        CountryRange::new(Ipv4Addr::new(223, 5, 5, 0), Ipv4Addr::new(223, 6, 6, 255), "CN"),
        CountryRange::new(Ipv4Addr::new(1, 0, 16, 0), Ipv4Addr::new(1, 0, 31, 255), "JP"),
        CountryRange::new(Ipv4Addr::new(1, 1, 1, 0), Ipv4Addr::new(1, 1, 1, 255), "AU"),
        CountryRange::new(Ipv4Addr::new(8, 8, 4, 0), Ipv4Addr::new(8, 8, 8, 255), "US"),
        CountryRange::new(Ipv4Addr::new(17, 0, 0, 0), Ipv4Addr::new(17, 255, 255, 255), "US"),
        CountryRange::new(Ipv4Addr::new(103, 4, 96, 0), Ipv4Addr::new(103, 4, 99, 255), "HK"),
    ];
}

/// Linear scan over a fixed range table
#[derive(Debug, Clone)]
pub struct StaticCountryTable {
    ranges: Vec<CountryRange>,
}

impl Default for StaticCountryTable {
    fn default() -> Self {
        StaticCountryTable {
            ranges: BUILTIN_RANGES.clone(),
        }
    }
}

impl StaticCountryTable {
    /// Use the built-in table
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Use caller-provided ranges
    pub fn from_ranges(ranges: Vec<CountryRange>) -> Self {
        StaticCountryTable { ranges }
    }

    /// Number of ranges
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether the table has no ranges
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl CountryLookup for StaticCountryTable {
    fn lookup(&self, ip: IpAddr) -> Option<String> {
        // IPv6 is not covered by the range table
        let IpAddr::V4(v4) = ip else {
            return None;
        };
        let value = u32::from(v4);
        self.ranges
            .iter()
            .find(|r| r.start <= value && value <= r.end)
            .map(|r| r.country.clone())
    }
}
