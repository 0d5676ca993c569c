//! Append-only exchange history.
//!
//! The session records every transmitted frame, received frame, and fault;
//! collaborators (the CLI's log-file writer, for one) read the entries —
//! the core never persists them itself.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Which way a history entry travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Tx,
    Rx,
    Fault,
}

/// One recorded line of the exchange.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    /// Milliseconds since the Unix epoch at record time.
    pub timestamp_ms: u64,
    pub direction: Direction,
    pub text: String,
}

/// Append-only record of a session's exchanges.
#[derive(Debug, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn record(&mut self, direction: Direction, text: impl Into<String>) {
        self.entries.push(HistoryEntry {
            timestamp_ms: unix_millis(),
            direction,
            text: text.into(),
        });
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let mut history = History::default();
        history.record(Direction::Tx, "PING|46");
        history.record(Direction::Rx, "ACK|PONG");

        assert_eq!(history.len(), 2);
        assert_eq!(history.entries()[0].direction, Direction::Tx);
        assert_eq!(history.entries()[0].text, "PING|46");
        assert_eq!(history.entries()[1].direction, Direction::Rx);
    }

    #[test]
    fn entries_serialize_for_log_writers() {
        let mut history = History::default();
        history.record(Direction::Fault, "link closed");
        let json = serde_json::to_string(&history.entries()[0]).unwrap();
        assert!(json.contains("\"direction\":\"fault\""));
        assert!(json.contains("link closed"));
    }
}
