//! Per-domain routing overrides from `[local]` configuration
//!
//! Overrides are consulted before the rule list: a bypass entry always goes
//! direct and a forward entry always goes through the relay.

use super::matcher::domain_matches;
use super::types::Action;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainOverrides {
    bypass: Vec<String>,
    forward: Vec<String>,
}

impl DomainOverrides {
    pub fn new(bypass: Vec<String>, forward: Vec<String>) -> Self {
        DomainOverrides { bypass, forward }
    }

    pub fn is_empty(&self) -> bool {
        self.bypass.is_empty() && self.forward.is_empty()
    }

    /// Forced action for `domain`, if any entry matches. Bypass wins over forward.
    pub fn lookup(&self, domain: &str) -> Option<Action> {
        if self.bypass.iter().any(|p| domain_matches(p, domain)) {
            return Some(Action::Direct);
        }
        if self.forward.iter().any(|p| domain_matches(p, domain)) {
            return Some(Action::Proxy);
        }
        None
    }
}
