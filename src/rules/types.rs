//! Rule data model

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a rule's pattern is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleType {
    /// Domain labels, right-aligned, `*` wildcard
    Domain,
    /// `network/prefix` or a bare address
    IpCidr,
    /// Country code looked up from the IP
    GeoIp,
    /// Case-insensitive regex over the user agent
    UserAgent,
    /// Always matches
    Final,
}

/// Routing decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Through the encrypted relay
    Proxy,
    /// Straight to the target
    Direct,
    /// Refuse the connection
    Reject,
    /// Straight to the target, TLS left untouched
    BypassTls,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Proxy => write!(f, "proxy"),
            Action::Direct => write!(f, "direct"),
            Action::Reject => write!(f, "reject"),
            Action::BypassTls => write!(f, "bypass-tls"),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// One routing rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Match dimension
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    /// Pattern, interpreted per `rule_type`
    #[serde(default)]
    pub pattern: String,
    /// Decision when matched
    pub action: Action,
    /// Disabled rules are skipped
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Rule {
    /// Create an enabled rule
    pub fn new(rule_type: RuleType, pattern: impl Into<String>, action: Action) -> Self {
        Rule {
            rule_type,
            pattern: pattern.into(),
            action,
            enabled: true,
        }
    }

    /// Domain rule
    pub fn domain(pattern: impl Into<String>, action: Action) -> Self {
        Self::new(RuleType::Domain, pattern, action)
    }

    /// CIDR rule
    pub fn ip_cidr(pattern: impl Into<String>, action: Action) -> Self {
        Self::new(RuleType::IpCidr, pattern, action)
    }

    /// GeoIP rule
    pub fn geo_ip(country: impl Into<String>, action: Action) -> Self {
        Self::new(RuleType::GeoIp, country, action)
    }

    /// User-agent rule
    pub fn user_agent(pattern: impl Into<String>, action: Action) -> Self {
        Self::new(RuleType::UserAgent, pattern, action)
    }

    /// Catch-all rule
    pub fn final_rule(action: Action) -> Self {
        Self::new(RuleType::Final, "", action)
    }

    /// Same rule, disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// The rule set used when nothing usable is persisted
///
/// Loopback and private networks go direct; everything else is proxied.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::domain("localhost", Action::Direct),
        Rule::ip_cidr("127.0.0.0/8", Action::Direct),
        Rule::ip_cidr("10.0.0.0/8", Action::Direct),
        Rule::ip_cidr("172.16.0.0/12", Action::Direct),
        Rule::ip_cidr("192.168.0.0/16", Action::Direct),
        Rule::ip_cidr("169.254.0.0/16", Action::Direct),
        Rule::ip_cidr("::1/128", Action::Direct),
        Rule::ip_cidr("fc00::/7", Action::Direct),
        Rule::final_rule(Action::Proxy),
    ]
}
