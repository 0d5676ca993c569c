//! Framed command exchange with embedded devices over serial links.
//!
//! serlink exchanges discrete commands with an embedded device over an
//! unreliable, line-oriented serial byte stream — checksummed frames with
//! retry and timeout, while unsolicited telemetry lines interleave on the
//! same stream.
//!
//! # Crate Structure
//!
//! - [`transport`] — Byte-stream boundary (loopback pair, serial port)
//! - [`frame`] — Framing profiles, line classification, ACK/NACK grammar
//! - [`peer`] — Host-side session and device-side responder (behind the
//!   `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use serlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use serlink_frame::*;
}

/// Re-export session and responder types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use serlink_peer::*;
}
