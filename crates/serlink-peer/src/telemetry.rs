//! Telemetry events.
//!
//! The device emits unsolicited, unframed status lines at any time,
//! interleaved unpredictably with command responses. The session's reader
//! thread routes them onto their own channel so a chatty device can never
//! starve command delivery; the session surfaces them to consumers as
//! [`TelemetryEvent`]s in two modes — a non-blocking interleaved drain and
//! a blocking exclusive monitor (see [`Session`](crate::Session)).

/// An event surfaced by the telemetry multiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    /// An unframed status line.
    Line(String),
    /// A framed payload observed outside a request/response exchange —
    /// an asynchronous `RESULT`, a late reply to a timed-out attempt.
    /// Informational; never parsed as the answer to a command.
    Frame(String),
}

impl std::fmt::Display for TelemetryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetryEvent::Line(line) => write!(f, "{line}"),
            TelemetryEvent::Frame(frame) => write!(f, "[FRAME] {frame}"),
        }
    }
}
