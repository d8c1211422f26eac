//! Relay server
//!
//! Runs the sink acceptance loop and the source ingest loop side by side.
//! They share nothing but the sink registry.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::error::{Error, Result};
use crate::registry::SinkRegistry;
use crate::server::config::RelayConfig;
use crate::server::sinks::SinkAcceptor;
use crate::server::source::SourceIngest;
use crate::stats::RelayStats;
use crate::transport::{TcpTransport, Transport};

/// Single-source, multi-sink relay
pub struct RelayServer<T: Transport = TcpTransport> {
    config: RelayConfig,
    transport: Arc<T>,
    registry: Arc<SinkRegistry>,
    stats: Arc<RelayStats>,
}

impl RelayServer<TcpTransport> {
    /// Create a relay over TCP
    ///
    /// Fails if the configuration is invalid; no listener is created here.
    pub fn new(config: RelayConfig) -> Result<Self> {
        Self::with_transport(config, TcpTransport)
    }
}

impl<T: Transport> RelayServer<T> {
    /// Create a relay over a custom transport
    pub fn with_transport(config: RelayConfig, transport: T) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            transport: Arc::new(transport),
            registry: Arc::new(SinkRegistry::new()),
            stats: Arc::new(RelayStats::new()),
        })
    }

    /// Get the relay configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Get a reference to the sink registry
    pub fn registry(&self) -> &Arc<SinkRegistry> {
        &self.registry
    }

    /// Get the relay-wide counters
    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Run the relay
    ///
    /// The sink acceptance loop runs on the calling task and the source loop
    /// on a task of its own. Only returns on a fatal error: the sink listener
    /// could not be created or closed, or a source listener could not be
    /// created.
    pub async fn run(&self) -> Result<()> {
        let sinks = SinkAcceptor::new(
            Arc::clone(&self.transport),
            self.config.sink.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.stats),
        );
        let source = SourceIngest::new(
            Arc::clone(&self.transport),
            self.config.source.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.stats),
        );

        let mut sink_listener = sinks.listen().await?;

        // Dropping the set aborts the source loop along with this future
        let mut source_task = JoinSet::new();
        source_task.spawn(async move { source.run().await });

        tokio::select! {
            result = sinks.accept_loop(&mut sink_listener) => result,
            Some(joined) = source_task.join_next() => {
                joined.unwrap_or_else(|e| Err(Error::Io(e.into())))
            }
        }
    }

    /// Run the relay until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!(stats = ?self.stats.snapshot(), "Shutdown signal received");
                Ok(())
            }
            result = self.run() => result,
        }
    }
}
