//! Session and responder engines for framed serial command exchange.
//!
//! This is the "just works" layer on both ends of the link:
//!
//! - [`Session`] — host side: send-with-retry, watchdog liveness probe,
//!   telemetry multiplexing (interleaved drain and exclusive monitor),
//!   await-tagged-frame, and the append-only exchange [`History`]
//! - [`Responder`] — device side: frame validation, a fixed command table
//!   with a strict/lenient unknown-command policy, and the [`serve`]
//!   simulator loop

pub mod config;
pub mod error;
pub mod history;
pub mod responder;
pub mod session;
pub mod telemetry;

pub use config::{Backoff, SessionConfig};
pub use error::{Result, SessionError};
pub use history::{Direction, History, HistoryEntry};
pub use responder::{
    serve, DeviceState, PidGains, Responder, ResponderConfig, ServeOptions, UnknownPolicy,
};
pub use session::Session;
pub use telemetry::TelemetryEvent;
