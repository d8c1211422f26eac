//! Sink entry types
//!
//! This module defines the per-sink state stored in the registry.

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Write half of a sink, type-erased so any transport can register
pub type SinkWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A registered downstream connection
pub struct SinkConnection {
    /// Registry-assigned identifier
    id: u64,

    /// Remote endpoint, for diagnostics
    remote_addr: SocketAddr,

    /// Transport handle
    writer: SinkWriter,

    /// When the sink was registered
    connected_at: Instant,

    /// Bytes written successfully
    bytes_sent: u64,

    /// Data units written successfully
    units_sent: u64,
}

impl SinkConnection {
    pub(super) fn new(id: u64, remote_addr: SocketAddr, writer: SinkWriter) -> Self {
        Self {
            id,
            remote_addr,
            writer,
            connected_at: Instant::now(),
            bytes_sent: 0,
            units_sent: 0,
        }
    }

    /// Registry identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remote endpoint
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Time since registration
    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Bytes written successfully
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Write one data unit in full
    pub(super) async fn write_unit(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data).await?;
        self.writer.flush().await?;
        self.bytes_sent += data.len() as u64;
        self.units_sent += 1;
        Ok(())
    }

    /// Snapshot of this sink's counters
    pub fn stats(&self) -> SinkStats {
        SinkStats {
            id: self.id,
            remote_addr: self.remote_addr,
            bytes_sent: self.bytes_sent,
            units_sent: self.units_sent,
            connected_for: self.connected_for(),
        }
    }
}

impl std::fmt::Debug for SinkConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkConnection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("bytes_sent", &self.bytes_sent)
            .field("units_sent", &self.units_sent)
            .finish_non_exhaustive()
    }
}

/// Statistics for a sink
#[derive(Debug, Clone)]
pub struct SinkStats {
    /// Registry identifier
    pub id: u64,
    /// Remote endpoint
    pub remote_addr: SocketAddr,
    /// Bytes written successfully
    pub bytes_sent: u64,
    /// Data units written successfully
    pub units_sent: u64,
    /// Time since registration
    pub connected_for: Duration,
}
