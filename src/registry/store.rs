//! Sink registry implementation
//!
//! The registry owns every registered sink connection. One mutex guards both
//! registration and broadcast-time iteration, so a sink is either fully
//! visible to a broadcast or not registered yet.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::io::AsyncWrite;
use tokio::sync::{Mutex, MutexGuard};

use super::entry::{SinkConnection, SinkStats};

/// What to do with an entry after visiting it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Leave the entry registered
    Keep,
    /// Remove (and close) the entry
    Remove,
}

pub(super) struct RegistryInner {
    pub(super) sinks: HashMap<u64, SinkConnection>,
    next_id: u64,
}

/// Registry of connected sinks
///
/// Identifiers start at 0, increase monotonically, and are never reused.
/// Removing a sink drops its connection, which closes it.
pub struct SinkRegistry {
    inner: Mutex<RegistryInner>,
}

impl SinkRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                sinks: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    pub(super) async fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().await
    }

    /// Register a sink and return its identifier
    pub async fn register<W>(&self, remote_addr: SocketAddr, writer: W) -> u64
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut inner = self.inner.lock().await;

        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .sinks
            .insert(id, SinkConnection::new(id, remote_addr, Box::new(writer)));

        tracing::debug!(
            id = id,
            peer = %remote_addr,
            sinks = inner.sinks.len(),
            "Sink registered"
        );

        id
    }

    /// Visit every registered sink under the registry lock
    ///
    /// Entries for which `f` returns [`Visit::Remove`] are removed before this
    /// returns.
    pub async fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(u64, &mut SinkConnection) -> Visit,
    {
        let mut inner = self.inner.lock().await;
        inner.sinks.retain(|id, sink| f(*id, sink) == Visit::Keep);
    }

    /// Number of registered sinks
    pub async fn count(&self) -> usize {
        self.inner.lock().await.sinks.len()
    }

    /// Registered identifiers in ascending order
    pub async fn ids(&self) -> Vec<u64> {
        let inner = self.inner.lock().await;
        let mut ids: Vec<u64> = inner.sinks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Per-sink statistics, ordered by identifier
    pub async fn stats(&self) -> Vec<SinkStats> {
        let inner = self.inner.lock().await;
        let mut stats: Vec<SinkStats> = inner.sinks.values().map(SinkConnection::stats).collect();
        stats.sort_unstable_by_key(|s| s.id);
        stats
    }
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}
