//! Scripted in-memory transport for driving the relay loops in tests
//!
//! Each endpoint port gets a queue of `listen` outcomes, and each listener a
//! queue of `accept` outcomes. Once a queue runs dry the call never resolves,
//! so a loop under test parks instead of spinning.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

use crate::error::{Error, Result};
use crate::server::config::EndpointConfig;
use crate::transport::{Connection, ListenMode, Listener, Transport};

/// Outcome of one `accept`
pub(crate) enum Accept {
    Io(io::ErrorKind),
    Conn(DuplexStream),
    Closed,
}

/// Outcome of one `listen`
pub(crate) enum Listen {
    Fail(io::ErrorKind),
    Open(Vec<Accept>),
}

/// Transport calls observed, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Listen(u16, ListenMode),
    Close(u16),
}

pub(crate) type EventLog = Arc<Mutex<Vec<Event>>>;

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    scripts: Mutex<HashMap<u16, VecDeque<Listen>>>,
    events: EventLog,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue `listen` outcomes for the endpoint bound to `port`
    pub(crate) fn script(self, port: u16, listens: Vec<Listen>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(port)
            .or_default()
            .extend(listens);
        self
    }

    pub(crate) fn events(&self) -> EventLog {
        Arc::clone(&self.events)
    }
}

impl Transport for ScriptedTransport {
    type Listener = ScriptedListener;

    async fn listen(&self, config: &EndpointConfig, mode: ListenMode) -> Result<ScriptedListener> {
        let port = config.bind_addr.port();
        self.events.lock().unwrap().push(Event::Listen(port, mode));

        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&port)
            .and_then(VecDeque::pop_front);

        match next {
            Some(Listen::Fail(kind)) => Err(io::Error::from(kind).into()),
            Some(Listen::Open(accepts)) => Ok(ScriptedListener {
                port,
                accepts: accepts.into(),
                events: Arc::clone(&self.events),
            }),
            None => std::future::pending::<Result<ScriptedListener>>().await,
        }
    }
}

pub(crate) struct ScriptedListener {
    port: u16,
    accepts: VecDeque<Accept>,
    events: EventLog,
}

impl Listener for ScriptedListener {
    type Conn = ScriptedConnection;

    async fn accept(&mut self) -> Result<ScriptedConnection> {
        match self.accepts.pop_front() {
            Some(Accept::Io(kind)) => Err(io::Error::from(kind).into()),
            Some(Accept::Conn(stream)) => Ok(ScriptedConnection {
                stream,
                peer_addr: SocketAddr::from(([127, 0, 0, 1], 40000)),
            }),
            Some(Accept::Closed) => Err(Error::ListenerClosed),
            None => std::future::pending::<Result<ScriptedConnection>>().await,
        }
    }

    fn local_addr(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], self.port))
    }

    async fn close(self) {
        self.events.lock().unwrap().push(Event::Close(self.port));
    }
}

pub(crate) struct ScriptedConnection {
    stream: DuplexStream,
    peer_addr: SocketAddr,
}

impl Connection for ScriptedConnection {
    fn remote_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl AsyncRead for ScriptedConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for ScriptedConnection {
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
