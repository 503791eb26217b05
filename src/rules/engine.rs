//! Ordered first-match rule evaluation
//!
//! The rule list lives behind a single `RwLock`: lookups share it, every
//! mutation takes the write side and persists the full list before
//! releasing it, so saves are applied in mutation order.

use super::geoip::{CountryLookup, StaticCountryTable};
use super::matcher::{domain_matches, Cidr};
use super::store::{MemoryStore, RuleStore};
use super::types::{default_rules, Action, Rule, RuleType};
use crate::error::{ProxyError, Result};
use regex::{Regex, RegexBuilder};
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Pattern prepared once per rule list version
#[derive(Debug)]
enum Matcher {
    Domain(String),
    Cidr(Option<Cidr>),
    GeoIp(String),
    UserAgent(Option<Regex>),
    Final,
}

impl Matcher {
    fn compile(rule: &Rule) -> Self {
        match rule.rule_type {
            RuleType::Domain => Matcher::Domain(rule.pattern.clone()),
            RuleType::IpCidr => {
                let cidr = Cidr::parse(&rule.pattern);
                if cidr.is_none() {
                    warn!("Invalid CIDR pattern: {}", rule.pattern);
                }
                Matcher::Cidr(cidr)
            }
            RuleType::GeoIp => Matcher::GeoIp(rule.pattern.trim().to_ascii_uppercase()),
            RuleType::UserAgent => {
                match RegexBuilder::new(&rule.pattern)
                    .case_insensitive(true)
                    .build()
                {
                    Ok(re) => Matcher::UserAgent(Some(re)),
                    Err(e) => {
                        warn!("Invalid user-agent pattern {:?}: {}", rule.pattern, e);
                        Matcher::UserAgent(None)
                    }
                }
            }
            RuleType::Final => Matcher::Final,
        }
    }
}

#[derive(Debug)]
struct CompiledRule {
    action: Action,
    matcher: Matcher,
}

#[derive(Debug, Default)]
struct RuleSet {
    rules: Vec<Rule>,
    compiled: Vec<CompiledRule>,
}

impl RuleSet {
    fn new(rules: Vec<Rule>) -> Self {
        let compiled = rules
            .iter()
            .filter(|r| r.enabled)
            .map(|r| CompiledRule {
                action: r.action,
                matcher: Matcher::compile(r),
            })
            .collect();
        RuleSet { rules, compiled }
    }
}

/// Routing rule engine
#[derive(Debug)]
pub struct RuleEngine {
    set: RwLock<RuleSet>,
    store: Box<dyn RuleStore>,
    geoip: Arc<dyn CountryLookup>,
}

impl RuleEngine {
    /// Load rules from `store`, falling back to [`default_rules`]
    ///
    /// Absent or unreadable storage is not an error; the defaults are used
    /// and written back.
    pub fn load(store: Box<dyn RuleStore>, geoip: Arc<dyn CountryLookup>) -> Self {
        let rules = match store.load() {
            Ok(Some(rules)) => {
                info!("Loaded {} routing rules", rules.len());
                rules
            }
            Ok(None) => {
                info!("Using default routing rules");
                let rules = default_rules();
                if let Err(e) = store.save(&rules) {
                    warn!("Failed to persist default rules: {}", e);
                }
                rules
            }
            Err(e) => {
                warn!("Failed to load rules, using defaults: {}", e);
                default_rules()
            }
        };

        RuleEngine {
            set: RwLock::new(RuleSet::new(rules)),
            store,
            geoip,
        }
    }

    /// In-memory engine with an explicit rule list
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        RuleEngine {
            set: RwLock::new(RuleSet::new(rules.clone())),
            store: Box::new(MemoryStore::with_rules(rules)),
            geoip: Arc::new(StaticCountryTable::builtin()),
        }
    }

    /// Decide the route for a target
    ///
    /// Enabled rules are tried in order and the first match wins. With no
    /// match the connection is proxied.
    pub fn match_route(
        &self,
        domain: Option<&str>,
        ip: Option<IpAddr>,
        user_agent: Option<&str>,
    ) -> Action {
        let set = self.set.read().unwrap_or_else(|e| e.into_inner());
        for rule in &set.compiled {
            let hit = match &rule.matcher {
                Matcher::Domain(pattern) => domain.is_some_and(|d| domain_matches(pattern, d)),
                Matcher::Cidr(cidr) => match (cidr, ip) {
                    (Some(cidr), Some(ip)) => cidr.contains(ip),
                    _ => false,
                },
                Matcher::GeoIp(country) => ip
                    .and_then(|ip| self.geoip.lookup(ip))
                    .is_some_and(|c| c.eq_ignore_ascii_case(country)),
                Matcher::UserAgent(re) => match (re, user_agent) {
                    (Some(re), Some(ua)) => re.is_match(ua),
                    _ => false,
                },
                Matcher::Final => true,
            };
            if hit {
                return rule.action;
            }
        }
        Action::Proxy
    }

    /// Snapshot of the full rule list, disabled rules included
    pub fn rules(&self) -> Vec<Rule> {
        self.set
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .rules
            .clone()
    }

    pub fn len(&self) -> usize {
        self.set.read().unwrap_or_else(|e| e.into_inner()).rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a rule
    pub fn add(&self, rule: Rule) {
        let _ = self.mutate(|rules| {
            rules.push(rule);
            Ok(())
        });
    }

    /// Remove the rule at `index`
    pub fn remove(&self, index: usize) -> Result<Rule> {
        self.mutate(|rules| {
            check_index(index, rules.len())?;
            Ok(rules.remove(index))
        })
    }

    /// Replace the rule at `index`
    pub fn update(&self, index: usize, rule: Rule) -> Result<()> {
        self.mutate(|rules| {
            check_index(index, rules.len())?;
            rules[index] = rule;
            Ok(())
        })
    }

    /// Replace the whole list with [`default_rules`]
    pub fn reset_to_defaults(&self) {
        let _ = self.mutate(|rules| {
            *rules = default_rules();
            Ok(())
        });
    }

    fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<Rule>) -> Result<T>,
    {
        let mut set = self.set.write().unwrap_or_else(|e| e.into_inner());
        let mut rules = set.rules.clone();
        let out = f(&mut rules)?;

        if let Err(e) = self.store.save(&rules) {
            warn!("Failed to persist rules: {}", e);
        }
        debug!("Rule list updated, {} rules", rules.len());
        *set = RuleSet::new(rules);
        Ok(out)
    }
}

fn check_index(index: usize, len: usize) -> Result<()> {
    if index >= len {
        return Err(ProxyError::Config(format!(
            "Rule index {} out of range (len {})",
            index, len
        )));
    }
    Ok(())
}
