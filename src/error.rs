//! Error types for the relay
//!
//! Only configuration and listener errors ever leave the relay loops; every
//! per-connection failure is logged and recovered where it happens.

use std::fmt;
use std::io;

/// Convenience result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Underlying socket I/O failure
    Io(io::Error),
    /// Invalid endpoint configuration
    Config(ConfigError),
    /// Transport handshake failure
    Handshake(HandshakeError),
    /// Listener stopped producing connections
    ListenerClosed,
}

/// Configuration errors, all fatal at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Passphrase set but shorter than the minimum length
    PassphraseTooShort {
        /// Flag or field the passphrase came from
        field: String,
        /// Minimum accepted length
        min: usize,
    },
    /// Listen address could not be parsed or resolved
    InvalidAddress(String),
}

/// Handshake errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Peer did not start with the expected magic bytes
    InvalidMagic([u8; 4]),
    /// Unsupported handshake version
    InvalidVersion(u8),
    /// Field longer than the handshake allows
    FieldTooLong(&'static str),
    /// Stream id or passphrase is not valid UTF-8
    InvalidUtf8(&'static str),
    /// Listener refused the connection
    Rejected(RejectReason),
    /// Peer took too long to complete the handshake
    Timeout,
}

/// Reason a listener rejected a handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Passphrases do not match
    BadSecret,
    /// Listener requires a passphrase and the caller sent none
    Unsecure,
    /// Caller sent a passphrase to a listener without one
    UnexpectedSecret,
    /// Rejected by a custom policy
    Policy,
    /// Listener only takes one session and already has it
    Busy,
}

impl RejectReason {
    /// Wire code for this reason
    pub fn code(self) -> u8 {
        match self {
            RejectReason::BadSecret => 1,
            RejectReason::Unsecure => 2,
            RejectReason::UnexpectedSecret => 3,
            RejectReason::Policy => 4,
            RejectReason::Busy => 5,
        }
    }

    /// Parse a wire code; unknown codes map to `Policy`
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => RejectReason::BadSecret,
            2 => RejectReason::Unsecure,
            3 => RejectReason::UnexpectedSecret,
            5 => RejectReason::Busy,
            _ => RejectReason::Policy,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Config(e) => write!(f, "{}", e),
            Error::Handshake(e) => write!(f, "Handshake error: {}", e),
            Error::ListenerClosed => write!(f, "Listener closed"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::PassphraseTooShort { field, min } => {
                write!(f, "{}: must be at least {} characters long", field, min)
            }
            ConfigError::InvalidAddress(addr) => write!(f, "Invalid listen address: {}", addr),
        }
    }
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::InvalidMagic(m) => write!(f, "Invalid magic: {:02x?}", m),
            HandshakeError::InvalidVersion(v) => write!(f, "Unsupported version: {}", v),
            HandshakeError::FieldTooLong(field) => write!(f, "Field too long: {}", field),
            HandshakeError::InvalidUtf8(field) => write!(f, "Field is not UTF-8: {}", field),
            HandshakeError::Rejected(reason) => write!(f, "Rejected: {}", reason),
            HandshakeError::Timeout => write!(f, "Timed out"),
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::BadSecret => "passphrase mismatch",
            RejectReason::Unsecure => "passphrase required",
            RejectReason::UnexpectedSecret => "listener has no passphrase",
            RejectReason::Policy => "refused by policy",
            RejectReason::Busy => "listener busy",
        };
        f.write_str(s)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Config(e) => Some(e),
            Error::Handshake(e) => Some(e),
            Error::ListenerClosed => None,
        }
    }
}

impl std::error::Error for ConfigError {}

impl std::error::Error for HandshakeError {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<HandshakeError> for Error {
    fn from(e: HandshakeError) -> Self {
        Error::Handshake(e)
    }
}
