//! Relay server: configuration, sink acceptance, and source ingest

pub mod config;
pub mod listener;
mod sinks;
mod source;

#[cfg(test)]
mod scripted;

pub use config::{parse_listen_addr, EndpointConfig, RelayConfig};
pub use listener::RelayServer;
