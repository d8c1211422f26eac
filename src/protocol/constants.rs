//! Protocol constants

use std::time::Duration;

/// Size of one data unit read from the source (MPEG-TS aligned: 7 x 188)
pub const DATA_UNIT_SIZE: usize = 1316;

/// Minimum passphrase length when a passphrase is configured
pub const MIN_PASSPHRASE_LEN: usize = 10;

/// Default latency in milliseconds
pub const DEFAULT_LATENCY_MS: u32 = 500;

/// Default source listen port
pub const DEFAULT_SOURCE_PORT: u16 = 5000;

/// Default sink listen port
pub const DEFAULT_SINK_PORT: u16 = 5001;

/// Default time a peer has to complete the handshake
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Handshake magic bytes
pub const HANDSHAKE_MAGIC: [u8; 4] = *b"SRLY";

/// Handshake version
pub const HANDSHAKE_VERSION: u8 = 1;

/// Fixed request header: magic + version + latency + stream id length
pub const REQUEST_HEADER_SIZE: usize = 4 + 1 + 4 + 2;

/// Fixed response size: magic + version + status + latency + flags + reason
pub const RESPONSE_SIZE: usize = 4 + 1 + 1 + 4 + 1 + 1;

/// Response flag: listener acts as the sending side of the session
pub const FLAG_SENDER: u8 = 0x01;

/// Handshake status: accepted
pub const STATUS_ACCEPTED: u8 = 0;

/// Handshake status: rejected
pub const STATUS_REJECTED: u8 = 1;
