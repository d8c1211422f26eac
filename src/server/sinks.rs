//! Sink acceptance loop
//!
//! The sink listener is created once and lives for the whole process.
//! Individual accept failures are logged and skipped; registration runs in
//! its own task so a broadcast holding the registry lock never stalls
//! accepting.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::registry::SinkRegistry;
use crate::server::config::EndpointConfig;
use crate::stats::RelayStats;
use crate::transport::{Connection, ListenMode, Listener, Transport};

pub(crate) struct SinkAcceptor<T: Transport> {
    transport: Arc<T>,
    config: EndpointConfig,
    registry: Arc<SinkRegistry>,
    stats: Arc<RelayStats>,
}

impl<T: Transport> SinkAcceptor<T> {
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

    /// Create the sink listener
    pub(crate) async fn listen(&self) -> Result<T::Listener> {
        match self.transport.listen(&self.config, ListenMode::Multi).await {
            Ok(listener) => {
                tracing::info!(addr = %listener.local_addr(), "Listening for sinks");
                Ok(listener)
            }
            Err(e) => {
                tracing::error!(
                    addr = %self.config.bind_addr,
                    error = %e,
                    "Failed to listen for sinks"
                );
                Err(e)
            }
        }
    }

    /// Accept sinks until the listener itself fails
    pub(crate) async fn accept_loop(&self, listener: &mut T::Listener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok(conn) => {
                    let peer = conn.remote_addr();
                    tracing::info!(peer = %peer, "Sink connected");
                    self.stats.sink_accepted();

                    let registry = Arc::clone(&self.registry);
                    tokio::spawn(async move {
                        registry.register(peer, conn).await;
                    });
                }
                Err(Error::ListenerClosed) => {
                    tracing::error!("Sink listener closed");
                    return Err(Error::ListenerClosed);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Error accepting sink connection");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::time::{Duration, Instant};

    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::server::scripted::{Accept, Event, Listen, ScriptedTransport};

    fn acceptor(
        transport: ScriptedTransport,
    ) -> (SinkAcceptor<ScriptedTransport>, Arc<SinkRegistry>, Arc<RelayStats>) {
        let registry = Arc::new(SinkRegistry::new());
        let stats = Arc::new(RelayStats::new());
        let acceptor = SinkAcceptor::new(
            Arc::new(transport),
            EndpointConfig::sink(),
            Arc::clone(&registry),
            Arc::clone(&stats),
        );
        (acceptor, registry, stats)
    }

    #[tokio::test]
    async fn test_accept_error_skipped_until_listener_closed() {
        let (conn, mut peer) = tokio::io::duplex(64);
        let transport = ScriptedTransport::new().script(
            5001,
            vec![Listen::Open(vec![
                Accept::Io(io::ErrorKind::ConnectionAborted),
                Accept::Conn(conn),
                Accept::Closed,
            ])],
        );
        let events = transport.events();
        let (acceptor, registry, stats) = acceptor(transport);

        let mut listener = acceptor.listen().await.unwrap();
        let result = acceptor.accept_loop(&mut listener).await;

        assert!(matches!(result, Err(Error::ListenerClosed)));
        assert_eq!(stats.snapshot().sinks_accepted, 1);
        assert_eq!(
            *events.lock().unwrap(),
            vec![Event::Listen(5001, ListenMode::Multi)]
        );

        // Registration runs on its own task
        let deadline = Instant::now() + Duration::from_secs(2);
        while registry.count().await != 1 {
            assert!(Instant::now() < deadline, "sink never registered");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        registry.broadcast(b"unit").await;
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"unit");
    }

    #[tokio::test]
    async fn test_listen_failure_returned() {
        let transport = ScriptedTransport::new()
            .script(5001, vec![Listen::Fail(io::ErrorKind::AddrInUse)]);
        let (acceptor, _, _) = acceptor(transport);

        match acceptor.listen().await {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::AddrInUse),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("listen unexpectedly succeeded"),
        }
    }
}
