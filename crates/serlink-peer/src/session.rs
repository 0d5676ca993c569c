//! The host-side transport session.
//!
//! A [`Session`] owns one open link. A dedicated reader thread continuously
//! classifies incoming lines into a frame channel and a telemetry channel;
//! [`Session::send`] blocks only on the frame channel with a per-attempt
//! deadline, and telemetry consumers drain their channel independently.
//! Exactly one `send` is in flight per session (`&mut self`); concurrent
//! issuers must serialize externally, because the retry machine assumes the
//! next framed reply belongs to its own attempt.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serlink_frame::{FrameFormat, Line, LineScanner, Reply};
use serlink_transport::{LinkStream, TransportError};
use tracing::{debug, trace, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::history::{Direction, History, HistoryEntry};
use crate::telemetry::TelemetryEvent;

const READ_CHUNK_SIZE: usize = 256;

/// Poll slice used by the blocking monitor loop between cancel checks.
const MONITOR_POLL: Duration = Duration::from_millis(50);

/// What the reader thread delivers on the frame channel.
enum RxEvent {
    /// A framed line, frame marking stripped by classification.
    Frame(String),
    /// Fatal I/O failure; the reader has exited.
    Fault(io::Error),
}

/// Host-side session over one open link.
pub struct Session {
    writer: LinkStream,
    frame_rx: Receiver<RxEvent>,
    telemetry_rx: Receiver<String>,
    /// Out-of-band frames observed during an exchange, queued for the
    /// interleaved drain.
    pending: VecDeque<TelemetryEvent>,
    config: SessionConfig,
    format: &'static dyn FrameFormat,
    connected: bool,
    alive: bool,
    telemetry_enabled: bool,
    history: History,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl Session {
    /// Open a session over a connected stream and probe the device.
    ///
    /// The watchdog probe runs once, immediately; its outcome sets the
    /// `connected` flag but does not fail the open — only a transport
    /// fault does.
    pub fn open(stream: LinkStream, config: SessionConfig) -> Result<Session> {
        let mut reader_half = stream.try_clone()?;
        reader_half.set_read_timeout(Some(config.reader_poll))?;

        let format = config.profile.format();
        let stop = Arc::new(AtomicBool::new(false));
        let (frame_tx, frame_rx) = mpsc::channel();
        let (telemetry_tx, telemetry_rx) = mpsc::channel();

        let reader = thread::Builder::new()
            .name("serlink-reader".to_string())
            .spawn({
                let stop = Arc::clone(&stop);
                move || reader_loop(reader_half, format, frame_tx, telemetry_tx, stop)
            })
            .map_err(TransportError::Io)?;

        let mut session = Session {
            writer: stream,
            frame_rx,
            telemetry_rx,
            pending: VecDeque::new(),
            config,
            format,
            connected: false,
            alive: true,
            telemetry_enabled: false,
            history: History::default(),
            stop,
            reader: Some(reader),
        };

        match session.watchdog() {
            Ok(alive) => debug!(connected = alive, "session opened"),
            Err(SessionError::Transport(err)) => return Err(SessionError::Transport(err)),
            Err(err) => debug!(%err, "watchdog probe failed on open"),
        }
        Ok(session)
    }

    /// Whether the last watchdog probe got an answer.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether the telemetry sink currently receives unframed lines.
    pub fn telemetry_enabled(&self) -> bool {
        self.telemetry_enabled
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Recorded exchanges, oldest first.
    pub fn history(&self) -> &[HistoryEntry] {
        self.history.entries()
    }

    /// Send a command using the configured attempt budget.
    pub fn send(&mut self, command: &str) -> Result<Reply> {
        self.send_with_retries(command, self.config.max_retries)
    }

    /// Send a command with an explicit total attempt budget.
    ///
    /// Each attempt writes the frame once and waits up to the configured
    /// reply timeout. ACK returns immediately; NACK fails immediately
    /// without retrying; telemetry never consumes the attempt. Exhausting
    /// the budget yields [`SessionError::Timeout`].
    pub fn send_with_retries(&mut self, command: &str, retries: u32) -> Result<Reply> {
        if !self.alive {
            return Err(SessionError::Disconnected);
        }
        let wire = self.format.encode(command);
        let retries = retries.max(1);

        for attempt in 0..retries {
            if attempt > 0 {
                thread::sleep(self.config.backoff.delay(attempt - 1));
            }

            // A reply to a previous timed-out attempt must not be misread
            // as the answer to this one.
            self.discard_stale()?;

            if let Err(err) = self
                .writer
                .write_all(wire.as_bytes())
                .and_then(|()| self.writer.flush())
            {
                return Err(self.fault(err));
            }
            self.history.record(Direction::Tx, wire.trim_end());
            trace!(command, attempt, "frame written");

            let deadline = Instant::now() + self.config.reply_timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match self.frame_rx.recv_timeout(remaining) {
                    Ok(RxEvent::Frame(text)) => {
                        self.history.record(Direction::Rx, &text);
                        match Reply::parse(&text) {
                            Some(reply @ Reply::Ack(_)) => {
                                debug!(command, %reply, "acknowledged");
                                return Ok(reply);
                            }
                            Some(reply @ Reply::Nack(_)) => {
                                debug!(command, %reply, "rejected");
                                return Err(SessionError::Rejected(reply));
                            }
                            None => {
                                // Asynchronous frame (RESULT and friends):
                                // informational, keep waiting for the ACK/NACK.
                                debug!(frame = %text, "out-of-band frame during exchange");
                                self.pending.push_back(TelemetryEvent::Frame(text));
                            }
                        }
                    }
                    Ok(RxEvent::Fault(err)) => return Err(self.fault(err)),
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(self.fault(reader_gone()));
                    }
                }
            }
            warn!(command, attempt = attempt + 1, budget = retries, "reply timeout");
        }

        Err(SessionError::Timeout { attempts: retries })
    }

    /// Liveness probe: a single attempt of the configured no-op command.
    ///
    /// Updates and returns the `connected` flag. Invoked automatically on
    /// open; may be invoked on demand to refresh connectivity status.
    pub fn watchdog(&mut self) -> Result<bool> {
        let command = self.config.watchdog_command.clone();
        match self.send_with_retries(&command, 1) {
            Ok(reply) => {
                self.connected = match (&self.config.watchdog_expect, reply.field()) {
                    (Some(expect), Some(data)) => data.contains(expect.as_str()),
                    (Some(_), None) => false,
                    (None, _) => true,
                };
                Ok(self.connected)
            }
            Err(SessionError::Timeout { .. }) | Err(SessionError::Rejected(_)) => {
                self.connected = false;
                Ok(false)
            }
            Err(err) => {
                self.connected = false;
                Err(err)
            }
        }
    }

    /// One-shot wait for a frame whose payload starts with `prefix`.
    ///
    /// Independent of the command retry loop: a single deadline and no
    /// writes. Non-matching frames surface as informational events;
    /// telemetry keeps flowing to its channel untouched.
    pub fn await_tagged(&mut self, prefix: &str, timeout: Duration) -> Result<String> {
        if !self.alive {
            return Err(SessionError::Disconnected);
        }
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SessionError::Timeout { attempts: 1 });
            }
            match self.frame_rx.recv_timeout(remaining) {
                Ok(RxEvent::Frame(text)) => {
                    self.history.record(Direction::Rx, &text);
                    if text.starts_with(prefix) {
                        return Ok(text);
                    }
                    self.pending.push_back(TelemetryEvent::Frame(text));
                }
                Ok(RxEvent::Fault(err)) => return Err(self.fault(err)),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(SessionError::Timeout { attempts: 1 })
                }
                Err(RecvTimeoutError::Disconnected) => return Err(self.fault(reader_gone())),
            }
        }
    }

    /// Send `TELEMETRY_ON`/`TELEMETRY_OFF` and toggle the session-wide
    /// telemetry flag on acknowledgement.
    pub fn enable_telemetry(&mut self, on: bool) -> Result<Reply> {
        let command = if on { "TELEMETRY_ON" } else { "TELEMETRY_OFF" };
        let reply = self.send(command)?;
        self.telemetry_enabled = on;
        Ok(reply)
    }

    /// Toggle the telemetry flag locally, for command conventions (such as
    /// `START`/`STOP`) that imply the device-side switch.
    pub fn set_telemetry_enabled(&mut self, on: bool) {
        self.telemetry_enabled = on;
    }

    /// Interleaved mode: drain every currently-buffered event without
    /// blocking.
    ///
    /// Framed lines are reported as [`TelemetryEvent::Frame`]; unframed
    /// lines are forwarded only while the telemetry flag is set, and
    /// discarded otherwise. Returns immediately when nothing is pending.
    pub fn drain_telemetry(&mut self) -> Vec<TelemetryEvent> {
        let mut events: Vec<TelemetryEvent> = self.pending.drain(..).collect();

        loop {
            match self.frame_rx.try_recv() {
                Ok(RxEvent::Frame(text)) => events.push(TelemetryEvent::Frame(text)),
                Ok(RxEvent::Fault(err)) => {
                    self.mark_fault(&err);
                    break;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        loop {
            match self.telemetry_rx.try_recv() {
                Ok(line) if self.telemetry_enabled => events.push(TelemetryEvent::Line(line)),
                Ok(_) => {} // telemetry disabled: discard
                Err(_) => break,
            }
        }
        events
    }

    /// Exclusive mode: treat the stream purely as a telemetry display.
    ///
    /// Blocks until `duration` elapses (when given) or `cancel` is set.
    /// Every line is surfaced regardless of the telemetry flag — framed
    /// ones as bracketed frame events, never parsed or acted upon.
    /// Cancellation leaves the session intact and reusable.
    pub fn monitor(
        &mut self,
        duration: Option<Duration>,
        cancel: &AtomicBool,
        mut on_event: impl FnMut(&TelemetryEvent),
    ) -> Result<()> {
        if !self.alive {
            return Err(SessionError::Disconnected);
        }
        let deadline = duration.map(|d| Instant::now() + d);

        while !cancel.load(Ordering::SeqCst) {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    break;
                }
            }
            for event in self.pending.drain(..) {
                on_event(&event);
            }
            loop {
                match self.frame_rx.try_recv() {
                    Ok(RxEvent::Frame(text)) => on_event(&TelemetryEvent::Frame(text)),
                    Ok(RxEvent::Fault(err)) => {
                        let fault = self.fault(err);
                        return Err(fault);
                    }
                    Err(_) => break,
                }
            }
            match self.telemetry_rx.recv_timeout(MONITOR_POLL) {
                Ok(line) => on_event(&TelemetryEvent::Line(line)),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Err(self.fault(reader_gone())),
            }
        }
        Ok(())
    }

    /// Stop the reader thread and mark the session closed.
    pub fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.alive = false;
        self.connected = false;
    }

    /// Drain buffered frame events so the next attempt starts clean, and
    /// flush untransmitted output.
    fn discard_stale(&mut self) -> Result<()> {
        loop {
            match self.frame_rx.try_recv() {
                Ok(RxEvent::Frame(text)) => {
                    debug!(frame = %text, "discarding stale frame");
                }
                Ok(RxEvent::Fault(err)) => return Err(self.fault(err)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Err(self.fault(reader_gone())),
            }
        }
        self.writer.clear_output()?;
        Ok(())
    }

    fn fault(&mut self, err: io::Error) -> SessionError {
        self.mark_fault(&err);
        SessionError::Transport(TransportError::Io(err))
    }

    fn mark_fault(&mut self, err: &io::Error) {
        warn!(%err, "transport fault, session disconnected");
        self.history.record(Direction::Fault, err.to_string());
        self.alive = false;
        self.connected = false;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connected", &self.connected)
            .field("alive", &self.alive)
            .field("telemetry_enabled", &self.telemetry_enabled)
            .field("history_len", &self.history.len())
            .finish()
    }
}

fn reader_gone() -> io::Error {
    io::Error::new(ErrorKind::BrokenPipe, "reader thread exited")
}

/// Reader-thread body: pull bytes, split into lines, classify, route.
fn reader_loop(
    mut stream: LinkStream,
    format: &'static dyn FrameFormat,
    frames: Sender<RxEvent>,
    telemetry: Sender<String>,
    stop: Arc<AtomicBool>,
) {
    let mut scanner = LineScanner::new(format);
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let read = match stream.read(&mut chunk) {
            Ok(0) => {
                let _ = frames.send(RxEvent::Fault(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "link closed by peer",
                )));
                return;
            }
            Ok(n) => n,
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(err) => {
                let _ = frames.send(RxEvent::Fault(err));
                return;
            }
        };

        scanner.push(&chunk[..read]);
        while let Some(line) = scanner.next_line() {
            match format.classify(&line) {
                Line::Frame(text) => {
                    trace!(frame = %text, "frame line");
                    if frames.send(RxEvent::Frame(text)).is_err() {
                        return;
                    }
                }
                Line::Telemetry(text) => {
                    trace!(telemetry = %text, "telemetry line");
                    if telemetry.send(text).is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn test_config() -> SessionConfig {
        SessionConfig {
            reply_timeout: Duration::from_millis(100),
            max_retries: 2,
            backoff: crate::Backoff::Fixed(Duration::from_millis(5)),
            reader_poll: Duration::from_millis(5),
            ..SessionConfig::default()
        }
    }

    /// Peer that answers the watchdog probe, then hands back the stream.
    fn open_with_ponging_peer(config: SessionConfig) -> (Session, LinkStream) {
        let (host, mut device) = LinkStream::loopback_pair();
        let answerer = thread::spawn(move || {
            let mut buf = [0u8; 64];
            let mut seen = Vec::new();
            // Read until the PING frame arrives, then answer it.
            loop {
                let n = device.read(&mut buf).unwrap();
                seen.extend_from_slice(&buf[..n]);
                if seen.ends_with(b"#") {
                    break;
                }
            }
            device.write_all(b"ACK|PONG#").unwrap();
            device
        });
        let session = Session::open(host, config).unwrap();
        let device = answerer.join().unwrap();
        (session, device)
    }

    #[test]
    fn open_probes_and_connects() {
        let (session, _device) = open_with_ponging_peer(test_config());
        assert!(session.is_connected());
        // TX of the probe and RX of the pong are both in history.
        assert!(session
            .history()
            .iter()
            .any(|e| e.direction == Direction::Tx && e.text.starts_with("PING")));
        assert!(session
            .history()
            .iter()
            .any(|e| e.direction == Direction::Rx && e.text.starts_with("ACK|PONG")));
    }

    #[test]
    fn open_against_silent_peer_is_not_connected() {
        let (host, _device) = LinkStream::loopback_pair();
        let session = Session::open(host, test_config()).unwrap();
        assert!(!session.is_connected());
    }

    #[test]
    fn telemetry_is_gated_by_the_flag() {
        let (mut session, mut device) = open_with_ponging_peer(test_config());

        device.write_all(b"DIST=17.2\n").unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(session.drain_telemetry().is_empty());

        session.set_telemetry_enabled(true);
        device.write_all(b"DIST=16.8\n").unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(
            session.drain_telemetry(),
            vec![TelemetryEvent::Line("DIST=16.8".to_string())]
        );
    }

    #[test]
    fn drain_surfaces_unsolicited_frames_regardless_of_flag() {
        let (mut session, mut device) = open_with_ponging_peer(test_config());
        device.write_all(b"RESULT|DONE#").unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(
            session.drain_telemetry(),
            vec![TelemetryEvent::Frame("RESULT|DONE".to_string())]
        );
    }

    #[test]
    fn send_after_close_is_disconnected() {
        let (mut session, _device) = open_with_ponging_peer(test_config());
        session.close();
        assert!(matches!(
            session.send("PING"),
            Err(SessionError::Disconnected)
        ));
    }

    #[test]
    fn peer_hangup_is_a_fatal_fault() {
        let (mut session, device) = open_with_ponging_peer(test_config());
        drop(device);
        thread::sleep(Duration::from_millis(30));
        assert!(matches!(
            session.send("PING"),
            Err(SessionError::Transport(_))
        ));
        // And it stays down.
        assert!(matches!(
            session.send("PING"),
            Err(SessionError::Disconnected)
        ));
    }
}
