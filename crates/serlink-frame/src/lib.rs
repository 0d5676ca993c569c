//! Checksum-delimited line framing for serial command links.
//!
//! Pure, stateless building blocks shared by both ends of a link:
//!
//! - [`FrameFormat`] — the pluggable wire framing, with the [`Delimited`]
//!   (`payload|checksum#`) and [`ColonHex`] (`:CMD|ARG|SEQ` + hex) profiles
//! - [`LineScanner`] — accumulates raw bytes and yields complete lines
//! - [`Line`] — the frame-vs-telemetry classification of a received line
//! - [`Reply`] — the ACK/NACK acknowledgement grammar
//! - [`checksum`] — the shared byte-sum checksum and its renderings

pub mod checksum;
pub mod error;
pub mod profile;
pub mod reply;
pub mod scanner;

pub use error::{FrameError, Result};
pub use profile::{
    ColonHex, Delimited, Frame, FrameFormat, Line, Profile, CHECKSUM_SEPARATOR, FRAME_TERMINATOR,
};
pub use reply::Reply;
pub use scanner::LineScanner;
