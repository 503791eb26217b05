//! TCP connector and upstream connection

use super::SocketOpts;
use crate::error::{ProxyError, Result};
use crate::socks::TargetAddr;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Opens upstream TCP connections with a bounded connect time
#[derive(Debug, Clone)]
pub struct TcpConnector {
    socket_opts: SocketOpts,
    connect_timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        TcpConnector {
            socket_opts: SocketOpts::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        TcpConnector {
            connect_timeout,
            ..Default::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Resolve `target` and connect to it
    pub async fn connect(&self, target: &TargetAddr) -> Result<UpstreamConnection> {
        let fut = async {
            let resolved = target.resolve().await?;
            let stream = TcpStream::connect(resolved).await.map_err(|e| {
                ProxyError::Connection(format!("Failed to connect to {}: {}", target, e))
            })?;
            Ok::<_, ProxyError>((resolved, stream))
        };

        let (resolved, stream) = tokio::time::timeout(self.connect_timeout, fut)
            .await
            .map_err(|_| ProxyError::Timeout(format!("Connection timeout to {}", target)))??;

        if let Err(e) = self.socket_opts.apply(&stream) {
            warn!("Failed to apply socket options: {}", e);
        }

        debug!("TCP connection established to {} ({})", target, resolved);
        Ok(UpstreamConnection {
            stream,
            remote: resolved,
        })
    }
}

/// An established upstream TCP connection
#[derive(Debug)]
pub struct UpstreamConnection {
    stream: TcpStream,
    remote: SocketAddr,
}

impl UpstreamConnection {
    /// Address actually connected to
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Write all of `data`
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        Ok(())
    }

    /// Read into `buf`; `Ok(0)` means the peer closed
    pub async fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.stream.read(buf).await?)
    }

    /// Shut down the write side
    pub async fn disconnect(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Hand the socket over to the relay
    pub fn into_stream(self) -> TcpStream {
        self.stream
    }
}
