//! Common test utilities for ssr-local integration tests

#![allow(dead_code)]

use ssr_local::config::{CipherMode, LocalConfig, ServerProfile};
use ssr_local::connection::{FrameDecoder, FrameEncoder};
use ssr_local::crypto::{CipherEngine, CipherMethod};
use ssr_local::socks::{
    parse_request, Parsed, TargetAddr, SOCKS5_AUTH_METHOD_NONE, SOCKS5_CMD_TCP_CONNECT,
    SOCKS5_RESERVED, SOCKS5_VERSION,
};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const TEST_PASSWORD: &str = "integration-secret";

/// Create a test TCP listener on a random port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Echo every byte back until the peer closes
pub async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// A port nothing is listening on
pub async fn closed_port() -> u16 {
    let (listener, addr) = create_test_listener().await;
    drop(listener);
    addr.port()
}

/// Local settings bound to an ephemeral port
pub fn local_config(cipher_mode: CipherMode) -> LocalConfig {
    LocalConfig {
        local_port: 0,
        connect_timeout: 2,
        cipher_mode,
        ..Default::default()
    }
}

/// Profile pointing at a relay started by [`spawn_relay`]
pub fn relay_profile(relay: SocketAddr, method: CipherMethod) -> ServerProfile {
    ServerProfile::new(relay.ip().to_string(), relay.port(), TEST_PASSWORD, method)
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Run `fut` with a test-sized timeout
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

/// Mock SOCKS5 client messages
pub mod socks5_mock {
    use super::*;

    /// No-auth method selection
    pub fn greeting() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE]
    }

    /// CONNECT request for `target`
    pub fn connect_request(target: &TargetAddr) -> Vec<u8> {
        let mut request = vec![SOCKS5_VERSION, SOCKS5_CMD_TCP_CONNECT, SOCKS5_RESERVED];
        request.extend_from_slice(&target.to_bytes());
        request
    }
}

/// Negotiate with the proxy at `proxy` and return the stream plus the
/// 10-byte reply to the CONNECT request
pub async fn socks_connect(proxy: SocketAddr, target: &TargetAddr) -> (TcpStream, [u8; 10]) {
    let mut stream = TcpStream::connect(proxy).await.unwrap();

    stream.write_all(&socks5_mock::greeting()).await.unwrap();
    let mut method = [0u8; 2];
    stream.read_exact(&mut method).await.unwrap();
    assert_eq!(method, [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE]);

    stream
        .write_all(&socks5_mock::connect_request(target))
        .await
        .unwrap();
    let mut reply = [0u8; 10];
    stream.read_exact(&mut reply).await.unwrap();
    (stream, reply)
}

/// Start a minimal remote relay speaking the encrypted framing
///
/// Each inbound connection carries the target header as its first frame.
/// The relay connects there and relays, encrypting replies the same way.
pub async fn spawn_relay(method: CipherMethod, mode: CipherMode) -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = serve_relay_connection(stream, method, mode).await;
            });
        }
    });
    addr
}

async fn serve_relay_connection(
    mut inbound: TcpStream,
    method: CipherMethod,
    mode: CipherMode,
) -> anyhow::Result<()> {
    let cipher = CipherEngine::new(TEST_PASSWORD, method)?;
    let (up, down) = match mode {
        CipherMode::PerMessage => (None, None),
        CipherMode::Session => (Some("relay/up".to_string()), Some("relay/down".to_string())),
    };
    let mut decoder = FrameDecoder::new(up);
    let mut encoder = FrameEncoder::new(down);
    let mut up_buf = vec![0u8; 16 * 1024];
    let mut down_buf = vec![0u8; 16 * 1024];

    let header = loop {
        if let Some(frame) = decoder.next_frame(&cipher)? {
            break frame;
        }
        let n = inbound.read(&mut up_buf).await?;
        if n == 0 {
            return Ok(());
        }
        decoder.feed(&up_buf[..n]);
    };

    let mut request = vec![SOCKS5_VERSION, SOCKS5_CMD_TCP_CONNECT, SOCKS5_RESERVED];
    request.extend_from_slice(&header);
    let target = match parse_request(&request)? {
        Parsed::Complete { value, .. } => value.target,
        Parsed::Incomplete => anyhow::bail!("truncated target header"),
    };
    let mut outbound = TcpStream::connect(target.resolve().await?).await?;

    let (mut in_read, mut in_write) = inbound.split();
    let (mut out_read, mut out_write) = outbound.split();

    while let Some(frame) = decoder.next_frame(&cipher)? {
        out_write.write_all(&frame).await?;
    }

    let mut client_open = true;
    loop {
        tokio::select! {
            n = in_read.read(&mut up_buf), if client_open => {
                let n = n?;
                if n == 0 {
                    out_write.shutdown().await?;
                    client_open = false;
                    continue;
                }
                decoder.feed(&up_buf[..n]);
                while let Some(frame) = decoder.next_frame(&cipher)? {
                    out_write.write_all(&frame).await?;
                }
            }
            n = out_read.read(&mut down_buf) => {
                let n = n?;
                if n == 0 {
                    break;
                }
                let frames = encoder.encode(&cipher, &down_buf[..n])?;
                in_write.write_all(&frames).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_test_listener() {
        let (listener, addr) = create_test_listener().await;
        assert!(addr.port() > 0);
        drop(listener);
    }

    #[test]
    fn test_socks5_mock_greeting() {
        let request = socks5_mock::greeting();
        assert_eq!(request, vec![5, 1, 0]);
    }

    #[test]
    fn test_socks5_mock_connect_domain() {
        let cmd = socks5_mock::connect_request(&TargetAddr::domain("example.com", 443));
        assert_eq!(&cmd[..4], &[5, 1, 0, 3]);
        assert_eq!(cmd[4], 11);
        assert_eq!(&cmd[cmd.len() - 2..], &443u16.to_be_bytes());
    }
}
