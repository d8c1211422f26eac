//! Relay client
//!
//! Connects to a relay endpoint, either to publish the source stream or to
//! receive the relayed stream as a sink.

pub mod config;
pub mod connector;

pub use config::ClientConfig;
pub use connector::RelayConnector;
