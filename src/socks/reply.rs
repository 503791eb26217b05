//! SOCKS5 reply builder
//!
//! Constructs SOCKS5 reply messages.

use super::consts::*;
use crate::error::Socks5ReplyCode;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Method selection reply accepting "no authentication"
pub fn method_selected() -> [u8; 2] {
    [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE]
}

/// Method selection reply rejecting every offered method
pub fn method_rejected() -> [u8; 2] {
    [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE]
}

/// Build a request reply
///
/// # SOCKS5 Reply Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// The bound address is always reported as `0.0.0.0:0`.
pub fn build_reply(code: Socks5ReplyCode) -> [u8; 10] {
    [
        SOCKS5_VERSION,
        code.into(),
        SOCKS5_RESERVED,
        SOCKS5_ADDR_TYPE_IPV4,
        0,
        0,
        0,
        0,
        0,
        0,
    ]
}

/// Write a reply and flush
pub async fn send_reply<S>(stream: &mut S, reply: &[u8]) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(reply).await?;
    stream.flush().await
}
