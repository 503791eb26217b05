//! Per-client SOCKS5 connection
//!
//! A [`ProxyConnection`] negotiates SOCKS5 with one accepted client, asks
//! the rule engine where the target should go, connects upstream and then
//! relays until either side closes, an error occurs or it is cancelled.
//! Its owner learns about completion through exactly one
//! [`ConnectionEvent`].

use super::context::ConnectionContext;
use super::event::{ConnectionEvent, ConnectionId};
use super::relay::{relay_encrypted, relay_plain, RelayContext};
use super::state::{ActivityClock, ConnectionState};
use crate::config::CipherMode;
use crate::error::{ProxyError, Result, Socks5Error, Socks5ReplyCode};
use crate::rules::Action;
use crate::socks::{
    build_reply, method_rejected, method_selected, parse_greeting, parse_request, send_reply,
    Parsed, ReceiveBuffer, Request, SocksCommand,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// What to do after looking at the buffered client bytes
#[derive(Debug)]
pub enum Step {
    /// Read more from the client
    NeedMoreData,
    /// Send this reply, then keep going
    Reply(Vec<u8>),
    /// Send the reply (if any) and fail the connection
    Reject {
        reply: Option<Vec<u8>>,
        error: ProxyError,
    },
    /// Negotiation finished; connect to the request's target
    Connect(Request),
}

/// One accepted client
#[derive(Debug)]
pub struct ProxyConnection {
    id: ConnectionId,
    peer: SocketAddr,
    ctx: Arc<ConnectionContext>,
    state: Mutex<ConnectionState>,
    activity: Arc<ActivityClock>,
    token: CancellationToken,
    finished: AtomicBool,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ProxyConnection {
    pub fn new(
        id: ConnectionId,
        peer: SocketAddr,
        ctx: Arc<ConnectionContext>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Arc<Self> {
        Arc::new(ProxyConnection {
            id,
            peer,
            ctx,
            state: Mutex::new(ConnectionState::Initial),
            activity: Arc::new(ActivityClock::new()),
            token: CancellationToken::new(),
            finished: AtomicBool::new(false),
            events,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Time since the last byte moved in either direction
    pub fn idle_for(&self) -> Duration {
        self.activity.idle_for()
    }

    /// Whether the owner has already been notified
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn transition(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.can_transition_to(next) {
            trace!("[{}] {} -> {}", self.id, *state, next);
            *state = next;
            true
        } else {
            false
        }
    }

    /// Advance the handshake/request state machine over buffered bytes
    ///
    /// Consumed bytes are removed from `buf`; anything past the request is
    /// left in place for the relay.
    pub fn process_buffered(&self, buf: &mut ReceiveBuffer) -> Step {
        match self.state() {
            ConnectionState::Initial | ConnectionState::Handshake => {
                self.transition(ConnectionState::Handshake);
                match parse_greeting(buf.as_slice()) {
                    Ok(Parsed::Incomplete) => Step::NeedMoreData,
                    Ok(Parsed::Complete { value, consumed }) => {
                        buf.consume(consumed);
                        if value.offers_no_auth() {
                            self.transition(ConnectionState::Request);
                            Step::Reply(method_selected().to_vec())
                        } else {
                            Step::Reject {
                                reply: Some(method_rejected().to_vec()),
                                error: Socks5Error::NoAcceptableMethod.into(),
                            }
                        }
                    }
                    Err(e) => Step::Reject {
                        reply: None,
                        error: e.into(),
                    },
                }
            }
            ConnectionState::Request => match parse_request(buf.as_slice()) {
                Ok(Parsed::Incomplete) => Step::NeedMoreData,
                Ok(Parsed::Complete { value, consumed }) => {
                    buf.consume(consumed);
                    let command = SocksCommand::from_byte(value.command);
                    if command != Some(SocksCommand::Connect) {
                        if let Some(command) = command {
                            debug!("[{}] {} requested, only CONNECT is served", self.id, command);
                        }
                        let error = Socks5Error::CommandNotSupported(value.command);
                        return Step::Reject {
                            reply: Some(build_reply(error.reply_code()).to_vec()),
                            error: error.into(),
                        };
                    }
                    self.transition(ConnectionState::Connecting);
                    Step::Connect(value)
                }
                Err(e) => Step::Reject {
                    reply: Some(build_reply(e.reply_code()).to_vec()),
                    error: e.into(),
                },
            },
            state => Step::Reject {
                reply: None,
                error: ProxyError::System(format!("No negotiation in state {}", state)),
            },
        }
    }

    /// Spawn the connection task
    pub fn start<S>(self: &Arc<Self>, client: S) -> JoinHandle<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let conn = Arc::clone(self);
        tokio::spawn(async move { conn.run(client).await })
    }

    /// Drive the connection to completion and notify the owner
    pub async fn run<S>(self: Arc<Self>, client: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.activity.touch();
        let result = tokio::select! {
            result = self.drive(client) => result,
            _ = self.token.cancelled() => Ok(()),
        };
        self.finish(result);
    }

    /// Cancel both legs. Idempotent; the owner is notified once.
    pub fn cancel(&self) {
        self.token.cancel();
        if self.transition(ConnectionState::Cancelled) {
            debug!("[{}] Connection from {} cancelled", self.id, self.peer);
        }
        self.end_cipher_sessions();
        self.notify(ConnectionEvent::Closed { id: self.id });
    }

    fn finish(&self, result: Result<()>) {
        self.end_cipher_sessions();
        let event = match result {
            Ok(()) => {
                self.transition(ConnectionState::Cancelled);
                debug!("[{}] Connection from {} closed", self.id, self.peer);
                ConnectionEvent::Closed { id: self.id }
            }
            Err(error) => {
                self.transition(ConnectionState::Error);
                warn!("[{}] Connection from {} failed: {}", self.id, self.peer, error);
                ConnectionEvent::Failed { id: self.id, error }
            }
        };
        self.notify(event);
    }

    fn notify(&self, event: ConnectionEvent) {
        if !self.finished.swap(true, Ordering::SeqCst) {
            // The owner may already be gone during shutdown
            let _ = self.events.send(event);
        }
    }

    fn session_ids(&self) -> (String, String) {
        (format!("{}/up", self.id), format!("{}/down", self.id))
    }

    fn end_cipher_sessions(&self) {
        if self.ctx.cipher_mode == CipherMode::Session {
            let (up, down) = self.session_ids();
            self.ctx.cipher.end_session(&up);
            self.ctx.cipher.end_session(&down);
        }
    }

    async fn drive<S>(&self, mut client: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut buf = ReceiveBuffer::with_capacity(512);

        let request = loop {
            match self.process_buffered(&mut buf) {
                Step::NeedMoreData => {
                    let n = client.read_buf(buf.inner_mut()).await?;
                    if n == 0 {
                        return Err(ProxyError::Connection(
                            "Client closed during negotiation".into(),
                        ));
                    }
                    self.activity.touch();
                }
                Step::Reply(reply) => send_reply(&mut client, &reply).await?,
                Step::Reject { reply, error } => {
                    if let Some(reply) = reply {
                        let _ = send_reply(&mut client, &reply).await;
                    }
                    return Err(error);
                }
                Step::Connect(request) => break request,
            }
        };

        let target = request.target;
        let action = self.ctx.route(&target);
        debug!("[{}] {} -> {} routed {}", self.id, self.peer, target, action);

        if action == Action::Reject {
            send_reply(&mut client, &build_reply(Socks5ReplyCode::ConnectionNotAllowed)).await?;
            return Err(Socks5Error::ConnectionNotAllowed.into());
        }

        let upstream_addr = match action {
            Action::Proxy => self.ctx.relay_target(),
            _ => target.clone(),
        };
        let upstream = match self.ctx.connector.connect(&upstream_addr).await {
            Ok(upstream) => upstream,
            Err(e) => {
                let _ = send_reply(&mut client, &build_reply(Socks5ReplyCode::HostUnreachable)).await;
                return Err(e);
            }
        };

        send_reply(&mut client, &build_reply(Socks5ReplyCode::Succeeded)).await?;
        self.transition(ConnectionState::Relay);
        self.activity.touch();
        info!(
            "[{}] {} -> {} established ({})",
            self.id, self.peer, target, action
        );

        let initial = buf.take_all();
        let relay_ctx = RelayContext {
            stats: Arc::clone(&self.ctx.stats),
            activity: Arc::clone(&self.activity),
            token: self.token.clone(),
        };

        match action {
            Action::Proxy => {
                let sessions = match self.ctx.cipher_mode {
                    CipherMode::PerMessage => (None, None),
                    CipherMode::Session => {
                        let (up, down) = self.session_ids();
                        (Some(up), Some(down))
                    }
                };
                relay_encrypted(
                    client,
                    upstream.into_stream(),
                    &target.to_bytes(),
                    &initial,
                    &self.ctx.cipher,
                    sessions,
                    &relay_ctx,
                )
                .await
            }
            _ => relay_plain(client, upstream.into_stream(), &initial, &relay_ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerProfile;
    use crate::crypto::CipherMethod;
    use crate::rules::{DomainOverrides, Rule, RuleEngine};
    use crate::socks::TargetAddr;
    use crate::stats::TrafficAccounting;
    use crate::transport::TcpConnector;
    use tokio::io::{duplex, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn context(rules: Vec<Rule>) -> Arc<ConnectionContext> {
        context_with_mode(rules, CipherMode::PerMessage)
    }

    fn context_with_mode(rules: Vec<Rule>, mode: CipherMode) -> Arc<ConnectionContext> {
        Arc::new(
            ConnectionContext::new(
                ServerProfile::new("127.0.0.1", 9, "pw", CipherMethod::Aes256Gcm),
                Arc::new(RuleEngine::with_rules(rules)),
                DomainOverrides::default(),
                Arc::new(TrafficAccounting::new()),
                TcpConnector::new(Duration::from_secs(2)),
                mode,
            )
            .unwrap(),
        )
    }

    fn connection(
        rules: Vec<Rule>,
    ) -> (Arc<ProxyConnection>, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = ProxyConnection::new(7, "127.0.0.1:50000".parse().unwrap(), context(rules), tx);
        (conn, rx)
    }

    fn buffer(bytes: &[u8]) -> ReceiveBuffer {
        let mut buf = ReceiveBuffer::new();
        buf.extend(bytes);
        buf
    }

    #[test]
    fn test_greeting_no_auth() {
        let (conn, _rx) = connection(Vec::new());
        let mut buf = buffer(&[0x05, 0x01, 0x00]);

        match conn.process_buffered(&mut buf) {
            Step::Reply(reply) => assert_eq!(reply, vec![0x05, 0x00]),
            other => panic!("unexpected step: {:?}", other),
        }
        assert_eq!(conn.state(), ConnectionState::Request);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_greeting_gssapi_only() {
        let (conn, _rx) = connection(Vec::new());
        let mut buf = buffer(&[0x05, 0x01, 0x01]);

        match conn.process_buffered(&mut buf) {
            Step::Reject { reply, error } => {
                assert_eq!(reply, Some(vec![0x05, 0xFF]));
                assert!(matches!(
                    error,
                    ProxyError::Protocol(Socks5Error::NoAcceptableMethod)
                ));
            }
            other => panic!("unexpected step: {:?}", other),
        }
    }

    #[test]
    fn test_partial_greeting_waits() {
        let (conn, _rx) = connection(Vec::new());
        let mut buf = buffer(&[0x05, 0x02, 0x00]);
        assert!(matches!(conn.process_buffered(&mut buf), Step::NeedMoreData));
        assert_eq!(buf.len(), 3);
        assert_eq!(conn.state(), ConnectionState::Handshake);
    }

    #[test]
    fn test_request_ipv4_with_trailing_data() {
        let (conn, _rx) = connection(Vec::new());
        let mut buf = buffer(&[0x05, 0x01, 0x00]);
        conn.process_buffered(&mut buf);

        buf.extend(&[0x05, 0x01, 0x00, 0x01, 93, 184, 216, 34, 0x00, 0x50, b'G', b'E']);
        match conn.process_buffered(&mut buf) {
            Step::Connect(request) => {
                assert_eq!(request.target.host(), "93.184.216.34");
                assert_eq!(request.target.port(), 80);
            }
            other => panic!("unexpected step: {:?}", other),
        }
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(buf.as_slice(), b"GE");
    }

    #[test]
    fn test_request_unsupported_command() {
        let (conn, _rx) = connection(Vec::new());
        let mut buf = buffer(&[0x05, 0x01, 0x00]);
        conn.process_buffered(&mut buf);

        buf.extend(&[0x05, 0x03, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x35]);
        match conn.process_buffered(&mut buf) {
            Step::Reject { reply, error } => {
                assert_eq!(reply.unwrap()[1], 0x07);
                assert!(matches!(
                    error,
                    ProxyError::Protocol(Socks5Error::CommandNotSupported(0x03))
                ));
            }
            other => panic!("unexpected step: {:?}", other),
        }
    }

    #[test]
    fn test_request_bad_address_type() {
        let (conn, _rx) = connection(Vec::new());
        let mut buf = buffer(&[0x05, 0x01, 0x00]);
        conn.process_buffered(&mut buf);

        buf.extend(&[0x05, 0x01, 0x00, 0x09, 0, 0]);
        match conn.process_buffered(&mut buf) {
            Step::Reject { reply, .. } => assert_eq!(reply.unwrap()[1], 0x08),
            other => panic!("unexpected step: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (conn, mut rx) = connection(Vec::new());
        conn.cancel();
        conn.cancel();

        assert_eq!(conn.state(), ConnectionState::Cancelled);
        assert!(conn.is_finished());
        assert!(matches!(rx.recv().await, Some(ConnectionEvent::Closed { id: 7 })));
        drop(conn);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_rejected_by_rules() {
        let (conn, mut rx) = connection(vec![Rule::final_rule(Action::Reject)]);
        let (mut app, client_side) = duplex(1024);
        let handle = conn.start(client_side);

        app.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut reply = [0u8; 2];
        app.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00]);

        let mut request = vec![0x05, 0x01, 0x00];
        request.extend_from_slice(&TargetAddr::domain("ads.test", 443).to_bytes());
        app.write_all(&request).await.unwrap();
        let mut reply = [0u8; 10];
        app.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], 0x02);

        handle.await.unwrap();
        match rx.recv().await {
            Some(ConnectionEvent::Failed { id, error }) => {
                assert_eq!(id, 7);
                assert!(matches!(
                    error,
                    ProxyError::Protocol(Socks5Error::ConnectionNotAllowed)
                ));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(conn.state(), ConnectionState::Error);
    }

    #[tokio::test]
    async fn test_direct_relay_to_echo_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let echo_addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let (mut r, mut w) = socket.split();
            let _ = tokio::io::copy(&mut r, &mut w).await;
        });

        let (conn, mut rx) = connection(vec![Rule::final_rule(Action::Direct)]);
        let (mut app, client_side) = duplex(4096);
        let handle = conn.start(client_side);

        // Greeting, request and early data in one write
        let mut bytes = vec![0x05, 0x01, 0x00, 0x05, 0x01, 0x00];
        bytes.extend_from_slice(&TargetAddr::from(echo_addr).to_bytes());
        bytes.extend_from_slice(b"early");
        app.write_all(&bytes).await.unwrap();

        let mut replies = [0u8; 12];
        app.read_exact(&mut replies).await.unwrap();
        assert_eq!(&replies[..2], &[0x05, 0x00]);
        assert_eq!(&replies[2..4], &[0x05, 0x00]);

        let mut echoed = [0u8; 5];
        app.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"early");
        assert_eq!(conn.state(), ConnectionState::Relay);

        app.write_all(b"more").await.unwrap();
        let mut echoed = [0u8; 4];
        app.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"more");

        conn.cancel();
        handle.await.unwrap();
        assert!(matches!(rx.recv().await, Some(ConnectionEvent::Closed { id: 7 })));
        assert_eq!(conn.ctx.stats.snapshot().upload_bytes, 9);
    }

    #[tokio::test]
    async fn test_connect_failure_replies_host_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = listener.local_addr().unwrap();
        drop(listener);

        let (conn, mut rx) = connection(vec![Rule::final_rule(Action::Direct)]);
        let (mut app, client_side) = duplex(1024);
        let handle = conn.start(client_side);

        let mut bytes = vec![0x05, 0x01, 0x00, 0x05, 0x01, 0x00];
        bytes.extend_from_slice(&TargetAddr::from(closed).to_bytes());
        app.write_all(&bytes).await.unwrap();

        let mut replies = [0u8; 12];
        app.read_exact(&mut replies).await.unwrap();
        assert_eq!(replies[3], 0x04);

        handle.await.unwrap();
        match rx.recv().await {
            Some(ConnectionEvent::Failed { error, .. }) => {
                assert_eq!(error.kind(), crate::error::ErrorKind::Connection)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    fn seed_sessions(ctx: &ConnectionContext, id: ConnectionId) {
        let iv = vec![7u8; ctx.cipher.method().iv_size()];
        ctx.cipher.encrypt(b"x", Some(&format!("{}/up", id))).unwrap();
        ctx.cipher.open_session(&format!("{}/down", id), &iv).unwrap();
    }

    #[tokio::test]
    async fn test_cancel_ends_cipher_sessions() {
        let ctx = context_with_mode(Vec::new(), CipherMode::Session);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = ProxyConnection::new(3, "127.0.0.1:50000".parse().unwrap(), Arc::clone(&ctx), tx);

        seed_sessions(&ctx, 3);
        seed_sessions(&ctx, 4);
        assert_eq!(ctx.cipher.session_count(), 4);

        conn.cancel();
        assert!(matches!(rx.recv().await, Some(ConnectionEvent::Closed { id: 3 })));
        assert_eq!(ctx.cipher.session_count(), 2);
        assert!(ctx.cipher.session_iv("3/up").is_none());
        assert!(ctx.cipher.session_iv("3/down").is_none());
        assert!(ctx.cipher.session_iv("4/up").is_some());
    }

    #[tokio::test]
    async fn test_normal_close_ends_cipher_sessions() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let echo_addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let (mut r, mut w) = socket.split();
            let _ = tokio::io::copy(&mut r, &mut w).await;
        });

        let ctx = context_with_mode(vec![Rule::final_rule(Action::Direct)], CipherMode::Session);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = ProxyConnection::new(5, "127.0.0.1:50000".parse().unwrap(), Arc::clone(&ctx), tx);
        seed_sessions(&ctx, 5);

        let (mut app, client_side) = duplex(4096);
        let handle = conn.start(client_side);

        let mut bytes = vec![0x05, 0x01, 0x00, 0x05, 0x01, 0x00];
        bytes.extend_from_slice(&TargetAddr::from(echo_addr).to_bytes());
        bytes.extend_from_slice(b"ping");
        app.write_all(&bytes).await.unwrap();

        let mut replies = [0u8; 16];
        app.read_exact(&mut replies).await.unwrap();
        assert_eq!(&replies[12..], b"ping");
        assert_eq!(ctx.cipher.session_count(), 2);

        drop(app);
        handle.await.unwrap();
        assert!(matches!(rx.recv().await, Some(ConnectionEvent::Closed { id: 5 })));
        assert_eq!(conn.state(), ConnectionState::Cancelled);
        assert_eq!(ctx.cipher.session_count(), 0);
    }
}
