//! Relay configuration

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use crate::error::ConfigError;
use crate::protocol::constants::*;
use crate::protocol::{HandshakeHook, HandshakePolicy};

/// Settings for one listening endpoint (source or sink side)
#[derive(Clone)]
pub struct EndpointConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Latency in milliseconds, negotiated with each peer at handshake
    pub latency_ms: u32,

    /// Passphrase peers must present; `None` means no authentication
    pub passphrase: Option<String>,

    /// Time a peer has to complete the handshake
    pub handshake_timeout: Duration,

    /// Extra handshake check, run after the passphrase check
    pub handshake_hook: Option<HandshakeHook>,
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("bind_addr", &self.bind_addr)
            .field("latency_ms", &self.latency_ms)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("handshake_timeout", &self.handshake_timeout)
            .field("handshake_hook", &self.handshake_hook.is_some())
            .finish()
    }
}

impl EndpointConfig {
    /// Config listening on all interfaces at `port`
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
            latency_ms: DEFAULT_LATENCY_MS,
            passphrase: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            handshake_hook: None,
        }
    }

    /// Default source endpoint (`:5000`)
    pub fn source() -> Self {
        Self::with_port(DEFAULT_SOURCE_PORT)
    }

    /// Default sink endpoint (`:5001`)
    pub fn sink() -> Self {
        Self::with_port(DEFAULT_SINK_PORT)
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set latency
    pub fn latency(mut self, latency_ms: u32) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Set the passphrase; an empty string disables authentication
    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        let passphrase = passphrase.into();
        self.passphrase = (!passphrase.is_empty()).then_some(passphrase);
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Install an extra handshake check
    pub fn handshake_hook(mut self, hook: HandshakeHook) -> Self {
        self.handshake_hook = Some(hook);
        self
    }

    /// Check the passphrase length in bytes; `field` names the setting in the error
    pub fn validate(&self, field: &str) -> Result<(), ConfigError> {
        match &self.passphrase {
            Some(p) if p.len() < MIN_PASSPHRASE_LEN => {
                Err(ConfigError::PassphraseTooShort {
                    field: field.to_string(),
                    min: MIN_PASSPHRASE_LEN,
                })
            }
            _ => Ok(()),
        }
    }

    /// Handshake policy for listeners built from this config
    pub fn handshake_policy(&self) -> HandshakePolicy {
        let policy = HandshakePolicy::new(self.passphrase.clone());
        match &self.handshake_hook {
            Some(hook) => policy.with_hook(hook.clone()),
            None => policy,
        }
    }
}

/// Complete relay configuration: one endpoint per side
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Where the single source connects
    pub source: EndpointConfig,

    /// Where sinks connect
    pub sink: EndpointConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            source: EndpointConfig::source(),
            sink: EndpointConfig::sink(),
        }
    }
}

impl RelayConfig {
    /// Create a config from both endpoints
    pub fn new(source: EndpointConfig, sink: EndpointConfig) -> Self {
        Self { source, sink }
    }

    /// Validate both endpoints
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.source.validate("--src-passphrase")?;
        self.sink.validate("--sink-passphrase")?;
        Ok(())
    }
}

/// Parse a listen address
///
/// Accepts `host:port`, `ip:port`, and the bare `:port` form meaning all
/// interfaces.
pub fn parse_listen_addr(s: &str) -> Result<SocketAddr, ConfigError> {
    let invalid = || ConfigError::InvalidAddress(s.to_string());

    if let Some(port) = s.strip_prefix(':') {
        let port: u16 = port.parse().map_err(|_| invalid())?;
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }

    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }

    s.to_socket_addrs()
        .map_err(|_| invalid())?
        .next()
        .ok_or_else(invalid)
}
