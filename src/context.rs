//! Application context
//!
//! Built once at startup and shared by handle with every server instance,
//! in place of process-wide singletons.

use crate::config::{LocalConfig, ServerProfile};
use crate::connection::ConnectionContext;
use crate::error::Result;
use crate::rules::{DomainOverrides, JsonFileStore, MemoryStore, RuleEngine, RuleStore, StaticCountryTable};
use crate::stats::TrafficAccounting;
use crate::transport::TcpConnector;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct AppContext {
    pub local: LocalConfig,
    pub rules: Arc<RuleEngine>,
    pub overrides: DomainOverrides,
    pub stats: Arc<TrafficAccounting>,
}

impl AppContext {
    /// Load rules from `local.rules_path`, or keep them in memory
    pub fn new(local: LocalConfig) -> Self {
        let store: Box<dyn RuleStore> = match &local.rules_path {
            Some(path) => {
                info!("Rules file: {:?}", path);
                Box::new(JsonFileStore::new(path))
            }
            None => Box::new(MemoryStore::new()),
        };
        let rules = Arc::new(RuleEngine::load(store, Arc::new(StaticCountryTable::builtin())));
        Self::with_rules(local, rules)
    }

    /// Use an already constructed rule engine
    pub fn with_rules(local: LocalConfig, rules: Arc<RuleEngine>) -> Self {
        let overrides = DomainOverrides::new(
            local.bypass_domains.clone(),
            local.forward_domains.clone(),
        );
        AppContext {
            local,
            rules,
            overrides,
            stats: Arc::new(TrafficAccounting::new()),
        }
    }

    /// Per-profile bundle handed to every connection
    pub fn connection_context(&self, profile: ServerProfile) -> Result<ConnectionContext> {
        ConnectionContext::new(
            profile,
            Arc::clone(&self.rules),
            self.overrides.clone(),
            Arc::clone(&self.stats),
            TcpConnector::new(self.local.connect_timeout()),
            self.local.cipher_mode,
        )
    }
}
