//! Sink registry and broadcaster
//!
//! The registry owns every connected sink. The source ingest loop hands each
//! data unit to [`SinkRegistry::broadcast`], which writes it to every sink in
//! turn and prunes the ones that fail.
//!
//! # Architecture
//!
//! ```text
//!                         Arc<SinkRegistry>
//!                    ┌─────────────────────────┐
//!                    │ Mutex<                  │
//!                    │   sinks: HashMap<id,    │
//!                    │     SinkConnection>,    │
//!                    │   next_id,              │
//!                    │ >                       │
//!                    └───────────┬─────────────┘
//!                                │
//!        ┌───────────────────────┼───────────────────────┐
//!        │                       │                       │
//!        ▼                       ▼                       ▼
//!   [Source loop]          [Sink accept]             [Sink] ...
//!   read 1316 bytes        register()                write_all()
//!        │                                               ▲
//!        └──────────► registry.broadcast() ──────────────┘
//! ```
//!
//! Registration and broadcast take the same lock, so a sink registered while
//! a broadcast is in flight never sees part of that unit.

pub mod broadcast;
pub mod entry;
pub mod store;

pub use broadcast::BroadcastOutcome;
pub use entry::{SinkConnection, SinkStats, SinkWriter};
pub use store::{SinkRegistry, Visit};
