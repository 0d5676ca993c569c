//! Byte-stream transport abstraction for serial command links.
//!
//! The core protocol only needs a duplex byte stream with per-read
//! timeouts and input discard; everything device-specific (which port,
//! what baud rate) stays with the caller. [`LinkStream`] provides that
//! boundary with two backends:
//!
//! - an in-memory loopback pair for tests and in-process simulation
//! - a real serial port behind the `serial` feature

pub mod error;
mod loopback;
pub mod stream;

pub use error::{Result, TransportError};
pub use stream::LinkStream;
