//! Relay transport protocol
//!
//! Constants shared by the relay and the session handshake that opens every
//! transport connection.

pub mod constants;
pub mod handshake;

pub use handshake::{
    HandshakeDecision, HandshakeHook, HandshakePolicy, HandshakeRequest, HandshakeResponse,
};
