//! Caller side of the relay handshake
//!
//! Used to connect to either relay endpoint: as the source that feeds it or
//! as a sink that plays from it.

use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::{HandshakeError, Result};
use crate::protocol::handshake::{read_response, HandshakeDecision, HandshakeRequest};
use crate::transport::TcpConnection;

use super::config::ClientConfig;

/// Opens handshaken connections to a relay
pub struct RelayConnector;

impl RelayConnector {
    /// Connect to `addr` and complete the handshake
    ///
    /// The whole exchange must finish within `config.connect_timeout`.
    pub async fn connect(addr: SocketAddr, config: &ClientConfig) -> Result<TcpConnection> {
        tokio::time::timeout(config.connect_timeout, Self::handshake(addr, config))
            .await
            .unwrap_or(Err(HandshakeError::Timeout.into()))
    }

    async fn handshake(addr: SocketAddr, config: &ClientConfig) -> Result<TcpConnection> {
        let mut socket = TcpStream::connect(addr).await?;
        socket.set_nodelay(true)?;

        let mut request = HandshakeRequest::new(config.stream_id.clone()).latency(config.latency_ms);
        request.passphrase = config.passphrase.clone();
        socket.write_all(&request.encode()?).await?;

        let response = read_response(&mut socket).await?;
        match response.decision {
            HandshakeDecision::Accept { sender } => {
                tracing::debug!(
                    peer = %addr,
                    latency_ms = response.latency_ms,
                    listener_sender = sender,
                    "Connected to relay"
                );
                Ok(TcpConnection::new(
                    socket,
                    addr,
                    config.stream_id.clone(),
                    response.latency_ms,
                    sender,
                ))
            }
            HandshakeDecision::Reject(reason) => Err(HandshakeError::Rejected(reason).into()),
        }
    }
}
