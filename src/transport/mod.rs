//! Transport abstraction
//!
//! The relay core only needs to listen, accept, read, write, close, and name
//! the remote end of a connection. Anything that provides those operations
//! can carry a relay; [`TcpTransport`] is the built-in implementation.
//!
//! Dropping a [`Connection`] closes it. Dropping a [`Listener`] stops it
//! accepting; [`Listener::close`] additionally waits until the address is
//! free to bind again.

pub mod tcp;

use std::future::Future;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::server::config::EndpointConfig;

pub use tcp::{TcpConnection, TcpListener, TcpTransport};

/// How many sessions a listener hands out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenMode {
    /// Keep accepting until closed
    Multi,
    /// Accept one session; later callers are rejected as busy
    Single,
}

/// An established, handshaken connection
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Remote endpoint, for diagnostics
    fn remote_addr(&self) -> SocketAddr;
}

/// A bound listener producing connections
pub trait Listener: Send + 'static {
    /// Connection type produced by `accept`
    type Conn: Connection;

    /// Wait for the next connection that completed its handshake
    ///
    /// Returns [`Error::ListenerClosed`](crate::error::Error::ListenerClosed)
    /// once the listener can no longer produce connections.
    fn accept(&mut self) -> impl Future<Output = Result<Self::Conn>> + Send;

    /// Bound local address
    fn local_addr(&self) -> SocketAddr;

    /// Stop accepting and release the address before returning
    fn close(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized;
}

/// Factory for listeners
pub trait Transport: Send + Sync + 'static {
    /// Listener type produced by `listen`
    type Listener: Listener;

    /// Bind a listener using an endpoint's address, latency, and passphrase
    ///
    /// In [`ListenMode::Single`] no caller past the first accepted one is
    /// ever told it was accepted.
    fn listen(
        &self,
        config: &EndpointConfig,
        mode: ListenMode,
    ) -> impl Future<Output = Result<Self::Listener>> + Send;
}

/// Connection type of a transport
pub type ConnOf<T> = <<T as Transport>::Listener as Listener>::Conn;
