//! TCP transport
//!
//! Each listener runs a background accept task. Every accepted socket gets
//! its own handshake task, so a slow or silent peer never holds up the
//! others; only connections that pass the handshake reach `accept()`.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{self, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, HandshakeError, RejectReason, Result};
use crate::protocol::handshake::{self, HandshakeDecision, HandshakePolicy};
use crate::server::config::EndpointConfig;

use super::{Connection, ListenMode, Listener, Transport};

/// Handshaken connections waiting for `accept()`
const ACCEPT_BACKLOG: usize = 16;

/// Pause after a failed accept so errors like EMFILE don't spin the loop
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Transport over plain TCP with the relay session handshake
///
/// Nothing on the wire is encrypted: the passphrase travels in clear text in
/// the handshake and is only compared, and stream data follows unprotected.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    type Listener = TcpListener;

    async fn listen(&self, config: &EndpointConfig, mode: ListenMode) -> Result<TcpListener> {
        TcpListener::bind(config, mode).await
    }
}

/// Listener-side handshake settings
struct ListenSettings {
    latency_ms: u32,
    handshake_timeout: Duration,
    policy: HandshakePolicy,
    /// Set once the single session of a [`ListenMode::Single`] listener is taken
    slot: Option<AtomicBool>,
}

impl ListenSettings {
    fn new(config: &EndpointConfig, mode: ListenMode) -> Self {
        Self {
            latency_ms: config.latency_ms,
            handshake_timeout: config.handshake_timeout,
            policy: config.handshake_policy(),
            slot: match mode {
                ListenMode::Multi => None,
                ListenMode::Single => Some(AtomicBool::new(false)),
            },
        }
    }

    /// Take the session slot; always succeeds on a multi-session listener
    fn claim(&self) -> Option<SlotClaim<'_>> {
        match &self.slot {
            None => Some(SlotClaim(None)),
            Some(taken) if !taken.swap(true, Ordering::AcqRel) => Some(SlotClaim(Some(taken))),
            Some(_) => None,
        }
    }
}

/// Holds the session slot; released again unless committed
struct SlotClaim<'a>(Option<&'a AtomicBool>);

impl SlotClaim<'_> {
    fn commit(mut self) {
        self.0 = None;
    }
}

impl Drop for SlotClaim<'_> {
    fn drop(&mut self) {
        if let Some(taken) = self.0 {
            taken.store(false, Ordering::Release);
        }
    }
}

/// Bound TCP listener; dropping it stops the accept task
pub struct TcpListener {
    local_addr: SocketAddr,
    incoming: mpsc::Receiver<io::Result<TcpConnection>>,
    task: Option<JoinHandle<()>>,
}

impl TcpListener {
    /// Bind and start accepting in the background
    pub async fn bind(config: &EndpointConfig, mode: ListenMode) -> Result<Self> {
        let listener = net::TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let settings = Arc::new(ListenSettings::new(config, mode));
        let (tx, incoming) = mpsc::channel(ACCEPT_BACKLOG);
        let task = tokio::spawn(accept_loop(listener, settings, tx));

        Ok(Self {
            local_addr,
            incoming,
            task: Some(task),
        })
    }
}

impl Listener for TcpListener {
    type Conn = TcpConnection;

    async fn accept(&mut self) -> Result<TcpConnection> {
        match self.incoming.recv().await {
            Some(Ok(conn)) => Ok(conn),
            Some(Err(e)) => Err(Error::Io(e)),
            None => Err(Error::ListenerClosed),
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn close(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            // Resolves once the task, and the socket it owns, are dropped
            let _ = task.await;
        }
    }
}

impl Drop for TcpListener {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// Source of raw sockets for the accept loop
trait AcceptSocket: Send + Sync + 'static {
    fn accept_socket(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;
}

impl AcceptSocket for net::TcpListener {
    async fn accept_socket(&self) -> io::Result<(TcpStream, SocketAddr)> {
        self.accept().await
    }
}

async fn accept_loop<L: AcceptSocket>(
    listener: L,
    settings: Arc<ListenSettings>,
    tx: mpsc::Sender<io::Result<TcpConnection>>,
) {
    loop {
        match listener.accept_socket().await {
            Ok((socket, peer_addr)) => {
                let settings = Arc::clone(&settings);
                let tx = tx.clone();

                tokio::spawn(async move {
                    let result = tokio::time::timeout(
                        settings.handshake_timeout,
                        accept_handshake(socket, peer_addr, &settings),
                    )
                    .await
                    .unwrap_or(Err(HandshakeError::Timeout.into()));

                    match result {
                        Ok(conn) => {
                            // Receiver gone means the listener was closed meanwhile
                            let _ = tx.send(Ok(conn)).await;
                        }
                        Err(e) => {
                            tracing::warn!(peer = %peer_addr, error = %e, "Handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                if tx.send(Err(e)).await.is_err() {
                    return;
                }
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
}

async fn accept_handshake(
    mut socket: TcpStream,
    peer_addr: SocketAddr,
    settings: &ListenSettings,
) -> Result<TcpConnection> {
    socket.set_nodelay(true)?;

    let request = handshake::read_request(&mut socket).await?;
    let mut response = settings
        .policy
        .respond(peer_addr, &request, settings.latency_ms);

    let claim = match response.decision {
        HandshakeDecision::Accept { .. } => {
            let claim = settings.claim();
            if claim.is_none() {
                response.decision = HandshakeDecision::Reject(RejectReason::Busy);
            }
            claim
        }
        HandshakeDecision::Reject(_) => None,
    };

    socket.write_all(&response.encode()).await?;

    match response.decision {
        HandshakeDecision::Accept { sender } => {
            if let Some(claim) = claim {
                claim.commit();
            }
            tracing::debug!(
                peer = %peer_addr,
                stream_id = %request.stream_id,
                latency_ms = response.latency_ms,
                sender = sender,
                "Handshake complete"
            );
            Ok(TcpConnection::new(
                socket,
                peer_addr,
                request.stream_id,
                response.latency_ms,
                sender,
            ))
        }
        HandshakeDecision::Reject(reason) => Err(HandshakeError::Rejected(reason).into()),
    }
}

/// Handshaken TCP connection
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    stream_id: String,
    latency_ms: u32,
    sender: bool,
}

impl TcpConnection {
    pub(crate) fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        stream_id: String,
        latency_ms: u32,
        sender: bool,
    ) -> Self {
        Self {
            stream,
            peer_addr,
            stream_id,
            latency_ms,
            sender,
        }
    }

    /// Stream id requested by the caller
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Negotiated latency in milliseconds
    pub fn latency_ms(&self) -> u32 {
        self.latency_ms
    }

    /// Whether the listener side took the sender role
    pub fn listener_is_sender(&self) -> bool {
        self.sender
    }
}

impl Connection for TcpConnection {
    fn remote_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl AsyncRead for TcpConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for TcpConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}
