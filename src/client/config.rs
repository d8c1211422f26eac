//! Client configuration

use std::time::Duration;

use crate::protocol::constants::{DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_LATENCY_MS};

/// Caller-side connection settings
#[derive(Clone)]
pub struct ClientConfig {
    /// Stream id sent in the handshake
    pub stream_id: String,

    /// Requested latency in milliseconds
    pub latency_ms: u32,

    /// Passphrase to present, if the listener requires one
    pub passphrase: Option<String>,

    /// Limit for TCP connect plus handshake
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            stream_id: String::new(),
            latency_ms: DEFAULT_LATENCY_MS,
            passphrase: None,
            connect_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("stream_id", &self.stream_id)
            .field("latency_ms", &self.latency_ms)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl ClientConfig {
    /// Config for a stream id with defaults otherwise
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            ..Default::default()
        }
    }

    /// Set requested latency
    pub fn latency(mut self, latency_ms: u32) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Set the passphrase; an empty string means none
    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        let passphrase = passphrase.into();
        self.passphrase = (!passphrase.is_empty()).then_some(passphrase);
        self
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
