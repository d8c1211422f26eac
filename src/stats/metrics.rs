//! Statistics and metrics for relay sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::registry::BroadcastOutcome;

/// Statistics for one source session (accept to disconnect)
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// When the source connected
    pub started_at: Instant,
    /// Total bytes received from the source
    pub bytes_received: u64,
    /// Data units received from the source
    pub units_received: u64,
    /// Successful sink writes
    pub sink_writes: u64,
    /// Sinks dropped after a failed write
    pub sinks_dropped: u64,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            bytes_received: 0,
            units_received: 0,
            sink_writes: 0,
            sinks_dropped: 0,
        }
    }

    /// Account for one unit and its broadcast
    pub fn record(&mut self, len: usize, outcome: &BroadcastOutcome) {
        self.bytes_received += len as u64;
        self.units_received += 1;
        self.sink_writes += outcome.delivered as u64;
        self.sinks_dropped += outcome.removed.len() as u64;
    }

    /// Session duration so far
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Average ingest bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        bitrate(self.bytes_received, self.duration())
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

fn bitrate(bytes: u64, duration: Duration) -> u64 {
    let millis = duration.as_millis() as u64;
    if millis > 0 {
        bytes * 8 * 1000 / millis
    } else {
        0
    }
}

/// Relay-wide counters, shared by both loops
#[derive(Debug, Default)]
pub struct RelayStats {
    source_sessions: AtomicU64,
    sinks_accepted: AtomicU64,
    sinks_dropped: AtomicU64,
    units_relayed: AtomicU64,
    bytes_relayed: AtomicU64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn source_connected(&self) {
        self.source_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn sink_accepted(&self) {
        self.sinks_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unit_relayed(&self, len: usize, outcome: &BroadcastOutcome) {
        self.units_relayed.fetch_add(1, Ordering::Relaxed);
        self.bytes_relayed.fetch_add(len as u64, Ordering::Relaxed);
        if !outcome.removed.is_empty() {
            self.sinks_dropped
                .fetch_add(outcome.removed.len() as u64, Ordering::Relaxed);
        }
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            source_sessions: self.source_sessions.load(Ordering::Relaxed),
            sinks_accepted: self.sinks_accepted.load(Ordering::Relaxed),
            sinks_dropped: self.sinks_dropped.load(Ordering::Relaxed),
            units_relayed: self.units_relayed.load(Ordering::Relaxed),
            bytes_relayed: self.bytes_relayed.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`RelayStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    /// Source sessions accepted
    pub source_sessions: u64,
    /// Sink connections accepted
    pub sinks_accepted: u64,
    /// Sinks dropped after a failed write
    pub sinks_dropped: u64,
    /// Data units read from sources
    pub units_relayed: u64,
    /// Bytes read from sources
    pub bytes_relayed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_stats_new() {
        let stats = SessionStats::new();
        assert_eq!(stats.bytes_received, 0);
        assert_eq!(stats.units_received, 0);
        assert_eq!(stats.sink_writes, 0);
        assert_eq!(stats.sinks_dropped, 0);
    }

    #[test]
    fn test_session_stats_record() {
        let mut stats = SessionStats::new();
        let outcome = BroadcastOutcome {
            delivered: 2,
            removed: vec![4],
        };

        stats.record(1316, &outcome);
        stats.record(100, &BroadcastOutcome::default());

        assert_eq!(stats.bytes_received, 1416);
        assert_eq!(stats.units_received, 2);
        assert_eq!(stats.sink_writes, 2);
        assert_eq!(stats.sinks_dropped, 1);
    }

    #[test]
    fn test_bitrate() {
        // 1,000,000 bytes * 8 bits / 10 seconds = 800,000 bps
        assert_eq!(bitrate(1_000_000, Duration::from_secs(10)), 800_000);
    }

    #[test]
    fn test_bitrate_zero_duration() {
        assert_eq!(bitrate(1_000_000, Duration::ZERO), 0);
    }

    #[test]
    fn test_relay_stats_snapshot() {
        let stats = RelayStats::new();
        stats.source_connected();
        stats.sink_accepted();
        stats.sink_accepted();
        stats.unit_relayed(
            1316,
            &BroadcastOutcome {
                delivered: 1,
                removed: vec![0],
            },
        );

        assert_eq!(
            stats.snapshot(),
            RelayStatsSnapshot {
                source_sessions: 1,
                sinks_accepted: 2,
                sinks_dropped: 1,
                units_relayed: 1,
                bytes_relayed: 1316,
            }
        );
    }
}
