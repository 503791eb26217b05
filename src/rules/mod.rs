//! Routing rules
//!
//! Decides, per target, whether a connection is proxied, sent direct,
//! rejected or sent direct with TLS untouched.

mod engine;
mod geoip;
mod matcher;
mod overrides;
mod store;
mod types;

pub use engine::RuleEngine;
pub use geoip::{CountryLookup, CountryRange, StaticCountryTable};
pub use matcher::{domain_matches, Cidr};
pub use overrides::DomainOverrides;
pub use store::{JsonFileStore, MemoryStore, RuleStore};
pub use types::{default_rules, Action, Rule, RuleType};
