//! Source acceptance and ingest loop
//!
//! ```text
//!   ┌──────────► Listening ── listen failed ──► fatal
//!   │                │
//!   │            Accepting ── (listener closed either way)
//!   │             │      │
//!   │      accept error  source connected
//!   │             │      │
//!   ├─────────────┘   Reading ◄──┐
//!   │                  │    │    │ broadcast [0:n)
//!   └── read error/EOF ┘    └────┘
//! ```
//!
//! A listener only exists while no source is connected, so at most one
//! source is ever active and each session starts with a fresh handshake.
//! The listener hands out a single session; callers racing the winner are
//! rejected as busy instead of being accepted and dropped.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::Result;
use crate::protocol::constants::DATA_UNIT_SIZE;
use crate::registry::SinkRegistry;
use crate::server::config::EndpointConfig;
use crate::stats::{RelayStats, SessionStats};
use crate::transport::{ConnOf, Connection, ListenMode, Listener, Transport};

pub(crate) struct SourceIngest<T: Transport> {
    transport: Arc<T>,
    config: EndpointConfig,
    registry: Arc<SinkRegistry>,
    stats: Arc<RelayStats>,
}

impl<T: Transport> SourceIngest<T> {
    pub(crate) fn new(
        transport: Arc<T>,
        config: EndpointConfig,
        registry: Arc<SinkRegistry>,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            transport,
            config,
            registry,
            stats,
        }
    }

    /// Accept and relay sources forever; returns only if a listener can't be created
    pub(crate) async fn run(&self) -> Result<()> {
        loop {
            let listen = self.transport.listen(&self.config, ListenMode::Single);
            let mut listener = match listen.await {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::error!(
                        addr = %self.config.bind_addr,
                        error = %e,
                        "Failed to listen for source"
                    );
                    return Err(e);
                }
            };
            tracing::info!(addr = %listener.local_addr(), "Listening for sources");

            let accepted = listener.accept().await;
            listener.close().await;

            match accepted {
                Ok(source) => self.ingest(source).await,
                Err(e) => {
                    tracing::warn!(error = %e, "Error accepting source connection");
                }
            }
        }
    }

    /// Relay one source session until it fails
    async fn ingest(&self, mut source: ConnOf<T>) {
        let peer = source.remote_addr();
        self.stats.source_connected();
        tracing::info!(peer = %peer, "Source connected");

        let mut session = SessionStats::new();
        let mut buf = vec![0u8; DATA_UNIT_SIZE];

        loop {
            let n = match source.read(&mut buf).await {
                Ok(0) => {
                    tracing::info!(peer = %peer, "Source disconnected");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    tracing::info!(peer = %peer, error = %e, "Source disconnected");
                    break;
                }
            };

            let outcome = self.registry.broadcast(&buf[..n]).await;
            session.record(n, &outcome);
            self.stats.unit_relayed(n, &outcome);
        }

        if let Err(e) = source.shutdown().await {
            tracing::debug!(peer = %peer, error = %e, "Source shutdown failed");
        }
        drop(source);

        tracing::info!(
            peer = %peer,
            units = session.units_received,
            bytes = session.bytes_received,
            sinks_dropped = session.sinks_dropped,
            duration_ms = session.duration().as_millis() as u64,
            bitrate = session.bitrate(),
            "Source session ended"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::net::SocketAddr;

    use super::*;
    use crate::error::Error;
    use crate::server::scripted::{Accept, Event, Listen, ScriptedTransport};

    #[tokio::test]
    async fn test_accept_error_relistens_and_listen_failure_is_fatal() {
        let (conn, mut feed) = tokio::io::duplex(DATA_UNIT_SIZE * 4);
        let transport = ScriptedTransport::new().script(
            5000,
            vec![
                Listen::Open(vec![Accept::Io(io::ErrorKind::ConnectionReset)]),
                Listen::Open(vec![Accept::Conn(conn)]),
                Listen::Fail(io::ErrorKind::AddrInUse),
            ],
        );
        let events = transport.events();

        let registry = Arc::new(SinkRegistry::new());
        let stats = Arc::new(RelayStats::new());
        let (sink, mut player) = tokio::io::duplex(DATA_UNIT_SIZE * 4);
        registry
            .register(SocketAddr::from(([127, 0, 0, 1], 1)), sink)
            .await;

        // One short unit, then EOF
        feed.write_all(b"unit").await.unwrap();
        drop(feed);

        let ingest = SourceIngest::new(
            Arc::new(transport),
            EndpointConfig::source(),
            Arc::clone(&registry),
            Arc::clone(&stats),
        );
        match ingest.run().await {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::AddrInUse),
            other => panic!("unexpected result: {:?}", other),
        }

        let mut buf = [0u8; 4];
        player.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"unit");

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.source_sessions, 1);
        assert_eq!(snapshot.units_relayed, 1);
        assert_eq!(registry.count().await, 1);

        let listen = Event::Listen(5000, ListenMode::Single);
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                listen.clone(),
                Event::Close(5000),
                listen.clone(),
                Event::Close(5000),
                listen,
            ]
        );
    }
}
