//! # ssr-local - Local SOCKS5 Forward Proxy Core
//!
//! ssr-local accepts SOCKS5 clients on a local port, decides per target
//! whether traffic goes direct, through an encrypted relay, or is refused,
//! and accounts the bytes it moves.
//!
//! ## Features
//!
//! - **SOCKS5 Listener**: RFC 1928 subset (no-auth, CONNECT, IPv4/IPv6/domain)
//! - **Rule-Based Routing**: domain, CIDR, GeoIP and user-agent rules, first match wins
//! - **Encrypted Relay Leg**: AEAD framing with per-message or per-session IVs
//! - **Traffic Accounting**: upload/download/connection counters with periodic snapshots
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ssr_local::{load_config, AppContext, ProxyServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("ssr-local.toml")?;
//!     ssr_local::logging::init_from_config(&config.logging)?;
//!
//!     let app = Arc::new(AppContext::new(config.local));
//!     let server = ProxyServer::new(app, config.server)?;
//!     server.start().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SOCKS5 Client -> ProxyServer -> ProxyConnection -> RuleEngine
//!                                       |
//!                                       +-> direct:  Target
//!                                       +-> proxy:   CipherEngine -> Relay -> Target
//! ```

#![warn(rust_2018_idioms)]

pub mod config;
pub mod connection;
pub mod context;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod rules;
pub mod server;
pub mod socks;
pub mod stats;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config, ServerProfile};
pub use context::AppContext;
pub use error::{ProxyError, Socks5Error};
pub use server::{ProxyServer, ServerState};

/// Version of the ssr-local library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
