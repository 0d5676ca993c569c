//! Frame-level acknowledgement grammar.
//!
//! Replies are terminator-framed but carry no checksum field: the text
//! after the frame marking is `ACK`, `ACK|<data>`, `NACK`, or
//! `NACK|<reason>`. Anything else framed is an out-of-band frame (an
//! asynchronous `RESULT`, for instance) and is surfaced as an event rather
//! than parsed here.

use std::fmt;

/// A device's answer to one command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Positive acknowledgement, optionally carrying response data.
    Ack(Option<String>),
    /// Negative acknowledgement, optionally carrying a reason.
    Nack(Option<String>),
}

impl Reply {
    /// Parse the text of a framed line (frame marking stripped).
    ///
    /// Returns `None` for framed payloads that are not acknowledgements.
    pub fn parse(text: &str) -> Option<Reply> {
        let text = text.trim_end_matches(crate::FRAME_TERMINATOR);
        if let Some(rest) = text.strip_prefix("NACK") {
            return Some(Reply::Nack(split_field(rest)));
        }
        if let Some(rest) = text.strip_prefix("ACK") {
            return Some(Reply::Ack(split_field(rest)));
        }
        None
    }

    /// Whether this is a positive acknowledgement.
    pub fn is_ack(&self) -> bool {
        matches!(self, Reply::Ack(_))
    }

    /// The data or reason field, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Reply::Ack(field) | Reply::Nack(field) => field.as_deref(),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (tag, field) = match self {
            Reply::Ack(field) => ("ACK", field),
            Reply::Nack(field) => ("NACK", field),
        };
        match field {
            Some(field) => write!(f, "{tag}|{field}"),
            None => write!(f, "{tag}"),
        }
    }
}

fn split_field(rest: &str) -> Option<String> {
    let field = rest.strip_prefix('|')?;
    if field.is_empty() {
        None
    } else {
        Some(field.to_string())
    }
}
