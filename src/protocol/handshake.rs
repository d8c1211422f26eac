//! Session handshake
//!
//! Every transport connection opens with a single request/response exchange
//! before any stream data flows:
//!
//! ```text
//! Caller                                        Listener
//!   |                                              |
//!   |-- request: magic, version, latency,  ------->|
//!   |            stream id, passphrase             |
//!   |                                              |  policy.decide()
//!   |<-- response: magic, version, status, --------|
//!   |              latency, flags, reason          |
//!   |                                              |
//!   |        [data units, no further framing]      |
//! ```
//!
//! Multi-byte integers are big-endian. The negotiated latency is the larger
//! of the two sides' values. When the listener holds a passphrase it flags
//! itself as the sender, which older players need before they will complete
//! a secured session.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{HandshakeError, RejectReason, Result};
use crate::protocol::constants::*;

/// Caller's opening message
#[derive(Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Latency the caller asks for, in milliseconds
    pub latency_ms: u32,
    /// Requested stream identifier (may be empty)
    pub stream_id: String,
    /// Offered passphrase
    pub passphrase: Option<String>,
}

impl fmt::Debug for HandshakeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeRequest")
            .field("latency_ms", &self.latency_ms)
            .field("stream_id", &self.stream_id)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HandshakeRequest {
    /// Create a request for a stream id with default latency and no passphrase
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            latency_ms: DEFAULT_LATENCY_MS,
            stream_id: stream_id.into(),
            passphrase: None,
        }
    }

    /// Set the requested latency
    pub fn latency(mut self, latency_ms: u32) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Set the offered passphrase; an empty string means none
    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        let passphrase = passphrase.into();
        self.passphrase = (!passphrase.is_empty()).then_some(passphrase);
        self
    }

    /// Serialize the request
    pub fn encode(&self) -> std::result::Result<Bytes, HandshakeError> {
        let stream_id = self.stream_id.as_bytes();
        let passphrase = self.passphrase.as_deref().unwrap_or("").as_bytes();

        let stream_id_len = u16::try_from(stream_id.len())
            .map_err(|_| HandshakeError::FieldTooLong("stream_id"))?;
        let passphrase_len = u16::try_from(passphrase.len())
            .map_err(|_| HandshakeError::FieldTooLong("passphrase"))?;

        let mut buf =
            BytesMut::with_capacity(REQUEST_HEADER_SIZE + stream_id.len() + 2 + passphrase.len());
        buf.put_slice(&HANDSHAKE_MAGIC);
        buf.put_u8(HANDSHAKE_VERSION);
        buf.put_u32(self.latency_ms);
        buf.put_u16(stream_id_len);
        buf.put_slice(stream_id);
        buf.put_u16(passphrase_len);
        buf.put_slice(passphrase);

        Ok(buf.freeze())
    }

    /// Decode a request from the front of `buf`
    ///
    /// Returns `Ok(None)` until the whole request is buffered. Bytes are only
    /// consumed once a complete request is available.
    pub fn decode(buf: &mut BytesMut) -> std::result::Result<Option<Self>, HandshakeError> {
        check_prefix(buf)?;
        if buf.len() < REQUEST_HEADER_SIZE {
            return Ok(None);
        }

        let stream_id_len = u16::from_be_bytes([buf[9], buf[10]]) as usize;
        let passphrase_len_at = REQUEST_HEADER_SIZE + stream_id_len;
        if buf.len() < passphrase_len_at + 2 {
            return Ok(None);
        }

        let passphrase_len =
            u16::from_be_bytes([buf[passphrase_len_at], buf[passphrase_len_at + 1]]) as usize;
        let total = passphrase_len_at + 2 + passphrase_len;
        if buf.len() < total {
            return Ok(None);
        }

        let mut frame = buf.split_to(total).freeze();
        frame.advance(HANDSHAKE_MAGIC.len() + 1);
        let latency_ms = frame.get_u32();
        let stream_id_len = frame.get_u16() as usize;
        let stream_id = take_string(&mut frame, stream_id_len, "stream_id")?;
        let passphrase_len = frame.get_u16() as usize;
        let passphrase = take_string(&mut frame, passphrase_len, "passphrase")?;

        Ok(Some(Self {
            latency_ms,
            stream_id,
            passphrase: (!passphrase.is_empty()).then_some(passphrase),
        }))
    }
}

/// Outcome of a handshake decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeDecision {
    /// Accept the session
    Accept {
        /// Listener takes the sender role
        sender: bool,
    },
    /// Refuse the session
    Reject(RejectReason),
}

/// Listener's reply to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Accept or reject
    pub decision: HandshakeDecision,
    /// Negotiated latency in milliseconds
    pub latency_ms: u32,
}

impl HandshakeResponse {
    /// Serialize the response
    pub fn encode(&self) -> Bytes {
        let (status, flags, reason) = match self.decision {
            HandshakeDecision::Accept { sender } => {
                (STATUS_ACCEPTED, if sender { FLAG_SENDER } else { 0 }, 0)
            }
            HandshakeDecision::Reject(reason) => (STATUS_REJECTED, 0, reason.code()),
        };

        let mut buf = BytesMut::with_capacity(RESPONSE_SIZE);
        buf.put_slice(&HANDSHAKE_MAGIC);
        buf.put_u8(HANDSHAKE_VERSION);
        buf.put_u8(status);
        buf.put_u32(self.latency_ms);
        buf.put_u8(flags);
        buf.put_u8(reason);
        buf.freeze()
    }

    /// Decode a response from the front of `buf`
    pub fn decode(buf: &mut BytesMut) -> std::result::Result<Option<Self>, HandshakeError> {
        check_prefix(buf)?;
        if buf.len() < RESPONSE_SIZE {
            return Ok(None);
        }

        let mut frame = buf.split_to(RESPONSE_SIZE).freeze();
        frame.advance(HANDSHAKE_MAGIC.len() + 1);
        let status = frame.get_u8();
        let latency_ms = frame.get_u32();
        let flags = frame.get_u8();
        let reason = frame.get_u8();

        let decision = if status == STATUS_ACCEPTED {
            HandshakeDecision::Accept {
                sender: flags & FLAG_SENDER != 0,
            }
        } else {
            HandshakeDecision::Reject(RejectReason::from_code(reason))
        };

        Ok(Some(Self {
            decision,
            latency_ms,
        }))
    }

    /// Whether the listener accepted
    pub fn is_accepted(&self) -> bool {
        matches!(self.decision, HandshakeDecision::Accept { .. })
    }
}

/// Extra accept/reject check run after the passphrase check
pub type HandshakeHook = Arc<dyn Fn(SocketAddr, &HandshakeRequest) -> HandshakeDecision + Send + Sync>;

/// Listener-side handshake decision
///
/// A pure function of the peer address and the request, fixed at
/// configuration time.
#[derive(Clone, Default)]
pub struct HandshakePolicy {
    passphrase: Option<String>,
    hook: Option<HandshakeHook>,
}

impl fmt::Debug for HandshakePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakePolicy")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl HandshakePolicy {
    /// Policy requiring `passphrase` (or requiring its absence when `None`)
    pub fn new(passphrase: Option<String>) -> Self {
        Self {
            passphrase,
            hook: None,
        }
    }

    /// Add a custom check
    pub fn with_hook(mut self, hook: HandshakeHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Whether callers must present a passphrase
    pub fn requires_passphrase(&self) -> bool {
        self.passphrase.is_some()
    }

    /// Decide whether to accept `request` from `peer`
    pub fn decide(&self, peer: SocketAddr, request: &HandshakeRequest) -> HandshakeDecision {
        match (&self.passphrase, &request.passphrase) {
            (Some(ours), Some(theirs)) if ours == theirs => {}
            (Some(_), Some(_)) => return HandshakeDecision::Reject(RejectReason::BadSecret),
            (Some(_), None) => return HandshakeDecision::Reject(RejectReason::Unsecure),
            (None, Some(_)) => return HandshakeDecision::Reject(RejectReason::UnexpectedSecret),
            (None, None) => {}
        }

        let sender = self.passphrase.is_some();
        match self.hook.as_ref().map(|hook| hook(peer, request)) {
            Some(HandshakeDecision::Reject(reason)) => HandshakeDecision::Reject(reason),
            Some(HandshakeDecision::Accept { sender: hooked }) => HandshakeDecision::Accept {
                sender: sender || hooked,
            },
            None => HandshakeDecision::Accept { sender },
        }
    }

    /// Build the response to `request`, negotiating latency
    pub fn respond(
        &self,
        peer: SocketAddr,
        request: &HandshakeRequest,
        local_latency_ms: u32,
    ) -> HandshakeResponse {
        HandshakeResponse {
            decision: self.decide(peer, request),
            latency_ms: local_latency_ms.max(request.latency_ms),
        }
    }
}

/// Read one request, consuming no bytes past its end
pub async fn read_request<R>(reader: &mut R) -> Result<HandshakeRequest>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(64);
    read_into(reader, &mut buf, REQUEST_HEADER_SIZE).await?;
    check_prefix(&buf)?;

    let stream_id_len = u16::from_be_bytes([buf[9], buf[10]]) as usize;
    read_into(reader, &mut buf, stream_id_len + 2).await?;

    let at = REQUEST_HEADER_SIZE + stream_id_len;
    let passphrase_len = u16::from_be_bytes([buf[at], buf[at + 1]]) as usize;
    read_into(reader, &mut buf, passphrase_len).await?;

    match HandshakeRequest::decode(&mut buf)? {
        Some(request) => Ok(request),
        None => Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
    }
}

/// Read one response, consuming no bytes past its end
pub async fn read_response<R>(reader: &mut R) -> Result<HandshakeResponse>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(RESPONSE_SIZE);
    read_into(reader, &mut buf, RESPONSE_SIZE).await?;

    match HandshakeResponse::decode(&mut buf)? {
        Some(response) => Ok(response),
        None => Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
    }
}

async fn read_into<R>(reader: &mut R, buf: &mut BytesMut, len: usize) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let start = buf.len();
    buf.resize(start + len, 0);
    reader.read_exact(&mut buf[start..]).await?;
    Ok(())
}

/// Validate whatever part of magic + version is already buffered
fn check_prefix(buf: &[u8]) -> std::result::Result<(), HandshakeError> {
    let n = buf.len().min(HANDSHAKE_MAGIC.len());
    if buf[..n] != HANDSHAKE_MAGIC[..n] {
        let mut magic = [0u8; 4];
        magic[..n].copy_from_slice(&buf[..n]);
        return Err(HandshakeError::InvalidMagic(magic));
    }
    if buf.len() > HANDSHAKE_MAGIC.len() && buf[4] != HANDSHAKE_VERSION {
        return Err(HandshakeError::InvalidVersion(buf[4]));
    }
    Ok(())
}

fn take_string(
    frame: &mut Bytes,
    len: usize,
    field: &'static str,
) -> std::result::Result<String, HandshakeError> {
    let raw = frame.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| HandshakeError::InvalidUtf8(field))
}
