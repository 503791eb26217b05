//! Everything a connection needs from its server, bundled once per profile

use crate::config::{CipherMode, ServerProfile};
use crate::crypto::CipherEngine;
use crate::error::Result;
use crate::rules::{Action, DomainOverrides, RuleEngine};
use crate::socks::TargetAddr;
use crate::stats::TrafficAccounting;
use crate::transport::TcpConnector;
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Debug)]
pub struct ConnectionContext {
    pub rules: Arc<RuleEngine>,
    pub overrides: DomainOverrides,
    pub cipher: Arc<CipherEngine>,
    pub profile: ServerProfile,
    pub stats: Arc<TrafficAccounting>,
    pub connector: TcpConnector,
    pub cipher_mode: CipherMode,
}

impl ConnectionContext {
    /// Build the cipher for `profile` and bundle it with the shared services
    pub fn new(
        profile: ServerProfile,
        rules: Arc<RuleEngine>,
        overrides: DomainOverrides,
        stats: Arc<TrafficAccounting>,
        connector: TcpConnector,
        cipher_mode: CipherMode,
    ) -> Result<Self> {
        profile.validate()?;
        let cipher = Arc::new(CipherEngine::new(&profile.password, profile.method)?);
        Ok(ConnectionContext {
            rules,
            overrides,
            cipher,
            profile,
            stats,
            connector,
            cipher_mode,
        })
    }

    /// Routing decision for `target`: overrides first, then the rule list
    pub fn route(&self, target: &TargetAddr) -> Action {
        let domain = target.domain_name();
        if let Some(action) = domain.and_then(|d| self.overrides.lookup(d)) {
            return action;
        }
        // Clients sometimes send literal addresses as domain names
        let ip = target
            .ip()
            .or_else(|| domain.and_then(|d| d.parse::<IpAddr>().ok()));
        self.rules.match_route(domain, ip, None)
    }

    /// Address of the remote relay
    pub fn relay_target(&self) -> TargetAddr {
        match self.profile.host.parse::<IpAddr>() {
            Ok(ip) => TargetAddr::Ip((ip, self.profile.port).into()),
            Err(_) => TargetAddr::domain(self.profile.host.clone(), self.profile.port),
        }
    }
}
