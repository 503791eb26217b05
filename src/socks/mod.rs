//! SOCKS5 wire protocol
//!
//! Implements the RFC 1928 subset accepted on the local listener: version 5,
//! the "no authentication" method, the CONNECT command and IPv4, domain and
//! IPv6 address types. Parsing is incremental over a [`ReceiveBuffer`] so
//! partial reads never lose or reorder bytes.

mod buffer;
mod consts;
mod parser;
mod reply;
mod types;

pub use buffer::ReceiveBuffer;
pub use consts::*;
pub use parser::{parse_greeting, parse_request, Greeting, Parsed, Request};
pub use reply::{build_reply, method_rejected, method_selected, send_reply};
pub use types::{SocksCommand, TargetAddr};
