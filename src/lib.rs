//! Single-source, multi-sink stream relay
//!
//! One upstream source connects to the source endpoint; any number of sinks
//! connect to the sink endpoint. Every data unit read from the source is
//! written, in order, to every connected sink. Sinks that fail a write are
//! dropped; a source that disconnects is replaced by the next one to connect.
//!
//! The built-in [`TcpTransport`] does not encrypt anything. An endpoint
//! passphrase is sent in clear text and only decides who may connect.
//!
//! ```no_run
//! use stream_relay::{RelayConfig, RelayServer};
//!
//! # async fn example() -> stream_relay::error::Result<()> {
//! let server = RelayServer::new(RelayConfig::default())?;
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod stats;
pub mod transport;

pub use error::{Error, Result};
pub use registry::{BroadcastOutcome, SinkRegistry};
pub use server::{EndpointConfig, RelayConfig, RelayServer};
pub use transport::{Connection, ListenMode, Listener, TcpTransport, Transport};
