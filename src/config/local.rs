//! Local listener configuration

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

fn default_listen_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_local_port() -> u16 {
    1080
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_monitor_interval() -> u64 {
    60
}

fn default_stats_interval() -> u64 {
    1
}

/// How IVs are carried on the encrypted relay leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CipherMode {
    /// Fresh IV prefixed to every sealed frame
    #[default]
    PerMessage,
    /// One IV per direction, sent once before the first frame
    Session,
}

/// `[local]` section
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LocalConfig {
    /// Address the SOCKS5 listener binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: IpAddr,

    /// Port the SOCKS5 listener binds to (0 picks a free port)
    #[serde(default = "default_local_port")]
    pub local_port: u16,

    /// Upstream connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Relay connections idle for longer than this many seconds are cancelled
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,

    /// Idle monitor period in seconds
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval: u64,

    /// Traffic snapshot period in seconds
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,

    /// JSON rule file; rules are kept in memory when unset
    #[serde(default)]
    pub rules_path: Option<PathBuf>,

    #[serde(default)]
    pub cipher_mode: CipherMode,

    /// Domain patterns always routed direct
    #[serde(default)]
    pub bypass_domains: Vec<String>,

    /// Domain patterns always routed through the relay
    #[serde(default)]
    pub forward_domains: Vec<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        LocalConfig {
            listen_addr: default_listen_addr(),
            local_port: default_local_port(),
            connect_timeout: default_connect_timeout(),
            idle_timeout: default_idle_timeout(),
            monitor_interval: default_monitor_interval(),
            stats_interval: default_stats_interval(),
            rules_path: None,
            cipher_mode: CipherMode::default(),
            bypass_domains: Vec::new(),
            forward_domains: Vec::new(),
        }
    }
}

impl LocalConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.local_port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval.max(1))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval.max(1))
    }
}
