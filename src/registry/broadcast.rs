//! Fan-out of data units to every registered sink

use super::store::SinkRegistry;

/// Result of one broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Sinks that received the whole unit
    pub delivered: usize,
    /// Sinks removed because their write failed
    pub removed: Vec<u64>,
}

impl SinkRegistry {
    /// Write `data` to every registered sink
    ///
    /// Writes are issued one sink at a time while holding the registry lock,
    /// so every sink gets the unit before the caller can read the next one,
    /// and a slow sink delays the rest. A sink whose write fails is removed
    /// before this returns; the other sinks are unaffected.
    pub async fn broadcast(&self, data: &[u8]) -> BroadcastOutcome {
        let mut inner = self.lock().await;
        let mut outcome = BroadcastOutcome::default();

        for (id, sink) in inner.sinks.iter_mut() {
            match sink.write_unit(data).await {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    tracing::info!(
                        id = *id,
                        peer = %sink.remote_addr(),
                        error = %e,
                        "Sink disconnected"
                    );
                    outcome.removed.push(*id);
                }
            }
        }

        for id in &outcome.removed {
            inner.sinks.remove(id);
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, DuplexStream};

    use super::*;
    use crate::protocol::constants::DATA_UNIT_SIZE;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn unit(seed: u8) -> Vec<u8> {
        (0..DATA_UNIT_SIZE).map(|i| (i as u8).wrapping_add(seed)).collect()
    }

    async fn read_unit(reader: &mut DuplexStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_broadcast_to_all_sinks() {
        let registry = SinkRegistry::new();
        let (w1, mut r1) = tokio::io::duplex(DATA_UNIT_SIZE * 4);
        let (w2, mut r2) = tokio::io::duplex(DATA_UNIT_SIZE * 4);
        registry.register(addr(1), w1).await;
        registry.register(addr(2), w2).await;

        let data = unit(7);
        let outcome = registry.broadcast(&data).await;

        assert_eq!(outcome.delivered, 2);
        assert!(outcome.removed.is_empty());
        assert_eq!(read_unit(&mut r1, DATA_UNIT_SIZE).await, data);
        assert_eq!(read_unit(&mut r2, DATA_UNIT_SIZE).await, data);
        assert_eq!(registry.ids().await, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_failed_sink_removed_others_served() {
        let registry = SinkRegistry::new();
        let (w1, r1) = tokio::io::duplex(DATA_UNIT_SIZE * 4);
        let (w2, mut r2) = tokio::io::duplex(DATA_UNIT_SIZE * 4);
        let dead = registry.register(addr(1), w1).await;
        let live = registry.register(addr(2), w2).await;

        // Closing the read side makes writes fail with BrokenPipe
        drop(r1);

        let data = unit(3);
        let outcome = registry.broadcast(&data).await;

        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.removed, vec![dead]);
        assert_eq!(registry.ids().await, vec![live]);
        assert_eq!(read_unit(&mut r2, DATA_UNIT_SIZE).await, data);
    }

    #[tokio::test]
    async fn test_units_arrive_in_order() {
        let registry = SinkRegistry::new();
        let (w, mut r) = tokio::io::duplex(DATA_UNIT_SIZE * 8);
        registry.register(addr(1), w).await;

        let units: Vec<Vec<u8>> = (0..5).map(unit).collect();
        for u in &units {
            registry.broadcast(u).await;
        }

        for u in &units {
            assert_eq!(&read_unit(&mut r, DATA_UNIT_SIZE).await, u);
        }
    }

    #[tokio::test]
    async fn test_partial_unit_sent_as_is() {
        let registry = SinkRegistry::new();
        let (w, mut r) = tokio::io::duplex(DATA_UNIT_SIZE);
        registry.register(addr(1), w).await;

        registry.broadcast(b"short").await;

        assert_eq!(read_unit(&mut r, 5).await, b"short");
        let stats = registry.stats().await;
        assert_eq!(stats[0].bytes_sent, 5);
        assert_eq!(stats[0].units_sent, 1);
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let registry = SinkRegistry::new();
        let outcome = registry.broadcast(&unit(0)).await;
        assert_eq!(outcome, BroadcastOutcome::default());
    }

    #[tokio::test]
    async fn test_registration_waits_for_broadcast() {
        let registry = Arc::new(SinkRegistry::new());

        // A tiny pipe nobody drains yet keeps the broadcast blocked mid-write
        let (slow_w, mut slow_r) = tokio::io::duplex(16);
        registry.register(addr(1), slow_w).await;

        let data = unit(9);
        let broadcaster = {
            let registry = Arc::clone(&registry);
            let data = data.clone();
            tokio::spawn(async move { registry.broadcast(&data).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (late_w, mut late_r) = tokio::io::duplex(DATA_UNIT_SIZE * 2);
        let registering = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.register(addr(2), late_w).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!registering.is_finished());

        assert_eq!(read_unit(&mut slow_r, DATA_UNIT_SIZE).await, data);
        assert_eq!(broadcaster.await.unwrap().delivered, 1);
        assert_eq!(registering.await.unwrap(), 1);

        // The late sink saw none of the in-flight unit
        let mut buf = [0u8; 1];
        let pending =
            tokio::time::timeout(Duration::from_millis(50), late_r.read(&mut buf)).await;
        assert!(pending.is_err());
    }
}
