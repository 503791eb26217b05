//! Full-duplex byte pumps between the client and the upstream leg
//!
//! Each direction runs its own read loop. When the client finishes sending,
//! the upstream write side is shut down and the download direction keeps
//! running until upstream closes. Cancellation stops both directions.

use super::framing::{FrameDecoder, FrameEncoder};
use super::state::ActivityClock;
use crate::crypto::CipherEngine;
use crate::error::Result;
use crate::stats::TrafficAccounting;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Shared per-connection bookkeeping used by both pumps
#[derive(Debug, Clone)]
pub struct RelayContext {
    pub stats: Arc<TrafficAccounting>,
    pub activity: Arc<ActivityClock>,
    pub token: CancellationToken,
}

/// Read once, returning `None` on cancellation
async fn read_some<R>(reader: &mut R, buf: &mut [u8], token: &CancellationToken) -> Result<Option<usize>>
where
    R: AsyncRead + Unpin,
{
    tokio::select! {
        _ = token.cancelled() => Ok(None),
        n = reader.read(buf) => Ok(Some(n?)),
    }
}

/// Copy client bytes upstream unchanged
async fn pump_plain_up<R, W>(mut client: R, mut upstream: W, initial: &[u8], ctx: &RelayContext) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    if !initial.is_empty() {
        upstream.write_all(initial).await?;
        ctx.stats.record_upload(initial.len() as u64);
        total += initial.len() as u64;
    }

    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    while let Some(n) = read_some(&mut client, &mut buf, &ctx.token).await? {
        if n == 0 {
            let _ = upstream.shutdown().await;
            break;
        }
        upstream.write_all(&buf[..n]).await?;
        ctx.stats.record_upload(n as u64);
        ctx.activity.touch();
        total += n as u64;
    }
    Ok(total)
}

/// Copy upstream bytes to the client unchanged
async fn pump_plain_down<R, W>(mut upstream: R, mut client: W, ctx: &RelayContext) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    while let Some(n) = read_some(&mut upstream, &mut buf, &ctx.token).await? {
        if n == 0 {
            let _ = client.shutdown().await;
            break;
        }
        client.write_all(&buf[..n]).await?;
        ctx.stats.record_download(n as u64);
        ctx.activity.touch();
        total += n as u64;
    }
    Ok(total)
}

/// Seal client bytes into frames and send them upstream
///
/// `header` is sent as its own first frame ahead of any client data.
async fn pump_encrypt_up<R, W>(
    mut client: R,
    mut upstream: W,
    header: &[u8],
    initial: &[u8],
    cipher: &CipherEngine,
    mut encoder: FrameEncoder,
    ctx: &RelayContext,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut first = encoder.encode(cipher, header)?;
    if !initial.is_empty() {
        first.extend_from_slice(&encoder.encode(cipher, initial)?);
        ctx.stats.record_upload(initial.len() as u64);
    }
    upstream.write_all(&first).await?;
    let mut total = initial.len() as u64;

    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    while let Some(n) = read_some(&mut client, &mut buf, &ctx.token).await? {
        if n == 0 {
            let _ = upstream.shutdown().await;
            break;
        }
        let frames = encoder.encode(cipher, &buf[..n])?;
        upstream.write_all(&frames).await?;
        ctx.stats.record_upload(n as u64);
        ctx.activity.touch();
        total += n as u64;
    }
    Ok(total)
}

/// Open frames from upstream and deliver the plaintext to the client
async fn pump_decrypt_down<R, W>(
    mut upstream: R,
    mut client: W,
    cipher: &CipherEngine,
    mut decoder: FrameDecoder,
    ctx: &RelayContext,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    while let Some(n) = read_some(&mut upstream, &mut buf, &ctx.token).await? {
        if n == 0 {
            if decoder.buffered() > 0 {
                debug!("Upstream closed with {} undecoded bytes", decoder.buffered());
            }
            let _ = client.shutdown().await;
            break;
        }
        ctx.activity.touch();
        decoder.feed(&buf[..n]);
        while let Some(plaintext) = decoder.next_frame(cipher)? {
            client.write_all(&plaintext).await?;
            ctx.stats.record_download(plaintext.len() as u64);
            total += plaintext.len() as u64;
        }
    }
    Ok(total)
}

/// Drive both directions until download finishes, an error occurs or the
/// connection is cancelled
async fn join_pumps<U, D>(upload: U, download: D) -> Result<(u64, u64)>
where
    U: std::future::Future<Output = Result<u64>>,
    D: std::future::Future<Output = Result<u64>>,
{
    tokio::pin!(upload, download);

    tokio::select! {
        result = &mut upload => {
            let up = result?;
            let down = (&mut download).await?;
            Ok((up, down))
        }
        result = &mut download => {
            let down = result?;
            debug!("Upstream finished before client");
            Ok((0, down))
        }
    }
}

/// Relay plaintext between `client` and `upstream`
///
/// `initial` holds client bytes that arrived together with the request.
pub async fn relay_plain<C, U>(client: C, upstream: U, initial: &[u8], ctx: &RelayContext) -> Result<()>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (upstream_read, upstream_write) = tokio::io::split(upstream);

    let (up, down) = join_pumps(
        pump_plain_up(client_read, upstream_write, initial, ctx),
        pump_plain_down(upstream_read, client_write, ctx),
    )
    .await?;

    debug!("Plain relay finished: up={} down={}", up, down);
    Ok(())
}

/// Relay through the encrypted framing to a remote relay
pub async fn relay_encrypted<C, U>(
    client: C,
    upstream: U,
    header: &[u8],
    initial: &[u8],
    cipher: &CipherEngine,
    sessions: (Option<String>, Option<String>),
    ctx: &RelayContext,
) -> Result<()>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (upstream_read, upstream_write) = tokio::io::split(upstream);
    let (up_session, down_session) = sessions;

    let (up, down) = join_pumps(
        pump_encrypt_up(
            client_read,
            upstream_write,
            header,
            initial,
            cipher,
            FrameEncoder::new(up_session),
            ctx,
        ),
        pump_decrypt_down(
            upstream_read,
            client_write,
            cipher,
            FrameDecoder::new(down_session),
            ctx,
        ),
    )
    .await?;

    debug!("Encrypted relay finished: up={} down={}", up, down);
    Ok(())
}
