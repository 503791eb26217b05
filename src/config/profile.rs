//! Remote relay profile

use crate::crypto::CipherMethod;
use crate::error::{ProxyError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

fn default_protocol() -> String {
    "origin".to_string()
}

fn default_obfs() -> String {
    "plain".to_string()
}

fn default_timeout() -> u64 {
    60
}

/// `[server]` section: where and how to reach the remote relay
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerProfile {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub method: CipherMethod,

    /// Only `origin` is supported
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Only `plain` is supported
    #[serde(default = "default_obfs")]
    pub obfs: String,

    #[serde(default)]
    pub protocol_param: Option<String>,

    #[serde(default)]
    pub obfs_param: Option<String>,

    /// Relay timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub udp: bool,
}

// Keeps the password out of logs
impl fmt::Debug for ServerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .field("method", &self.method)
            .field("protocol", &self.protocol)
            .field("obfs", &self.obfs)
            .field("timeout", &self.timeout)
            .field("udp", &self.udp)
            .finish()
    }
}

impl ServerProfile {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        password: impl Into<String>,
        method: CipherMethod,
    ) -> Self {
        ServerProfile {
            host: host.into(),
            port,
            password: password.into(),
            method,
            protocol: default_protocol(),
            obfs: default_obfs(),
            protocol_param: None,
            obfs_param: None,
            timeout: default_timeout(),
            udp: false,
        }
    }

    /// `host:port` of the relay
    pub fn server_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Validate the profile
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ProxyError::Config("Server host is empty".into()));
        }
        if self.port == 0 {
            return Err(ProxyError::Config("Server port must be non-zero".into()));
        }
        if self.password.is_empty() {
            return Err(ProxyError::Config("Server password is empty".into()));
        }
        self.method.ensure_implemented()?;

        if !matches!(self.protocol.as_str(), "origin" | "") {
            return Err(ProxyError::Config(format!(
                "Unsupported protocol plugin: {}",
                self.protocol
            )));
        }
        if !matches!(self.obfs.as_str(), "plain" | "") {
            return Err(ProxyError::Config(format!(
                "Unsupported obfs plugin: {}",
                self.obfs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CryptoError;

    fn profile() -> ServerProfile {
        ServerProfile::new("relay.example.com", 8388, "secret", CipherMethod::Aes256Cfb)
    }

    #[test]
    fn test_valid_profile() {
        let profile = profile();
        assert!(profile.validate().is_ok());
        assert_eq!(profile.server_addr(), "relay.example.com:8388");
        assert_eq!(profile.protocol, "origin");
        assert_eq!(profile.obfs, "plain");
    }

    #[test]
    fn test_ipv6_server_addr() {
        let profile = ServerProfile::new("::1", 8388, "secret", CipherMethod::Aes128Gcm);
        assert_eq!(profile.server_addr(), "[::1]:8388");
    }

    #[test]
    fn test_invalid_fields() {
        let mut p = profile();
        p.host = " ".into();
        assert!(matches!(p.validate(), Err(ProxyError::Config(_))));

        let mut p = profile();
        p.port = 0;
        assert!(matches!(p.validate(), Err(ProxyError::Config(_))));

        let mut p = profile();
        p.password.clear();
        assert!(matches!(p.validate(), Err(ProxyError::Config(_))));

        let mut p = profile();
        p.obfs = "http_simple".into();
        assert!(matches!(p.validate(), Err(ProxyError::Config(_))));

        let mut p = profile();
        p.protocol = "auth_aes128_md5".into();
        assert!(matches!(p.validate(), Err(ProxyError::Config(_))));
    }

    #[test]
    fn test_unimplemented_method() {
        let p = ServerProfile::new("relay", 1, "pw", CipherMethod::Rc4Md5);
        assert!(matches!(
            p.validate(),
            Err(ProxyError::Crypto(CryptoError::UnimplementedMethod(_)))
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", profile());
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
