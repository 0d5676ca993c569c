//! The device-side responder engine.
//!
//! Mirrors the codec on the other end of the link: validates incoming
//! command frames, maps each command to a deterministic reply through a
//! fixed table, and emits exactly one reply frame per valid input frame.
//! Doubles as the firmware simulator for tests and the CLI's `respond`
//! subcommand.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serlink_frame::{FrameFormat, Line, LineScanner, Profile};
use serlink_transport::{LinkStream, TransportError};
use tracing::{debug, trace, warn};

use crate::error::Result;

/// How the responder answers a well-formed frame whose command is not in
/// the table.
///
/// Deployed firmware was observed to blanket-`ACK` unrecognized input, a
/// probable leniency bug; `Strict` is the default, `Lenient` reproduces the
/// observed behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownPolicy {
    /// `NACK|UNKNOWN_COMMAND`.
    #[default]
    Strict,
    /// `ACK`, as observed in the field.
    Lenient,
}

/// Responder configuration.
#[derive(Debug, Clone, Default)]
pub struct ResponderConfig {
    /// Wire framing shared with the host.
    pub profile: Profile,
    /// Unknown-command policy.
    pub unknown_policy: UnknownPolicy,
}

/// PID gains for one wheel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 2.0,
            ki: 0.5,
            kd: 0.1,
        }
    }
}

/// Simulated device state.
///
/// Side-effecting commands update this *before* the acknowledgement goes
/// out, so a status query issued right after reflects the change.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    pub running: bool,
    pub telemetry: bool,
    pub velocity: f64,
    pub vmax: f64,
    pub pid_left: PidGains,
    pub pid_right: PidGains,
    /// Simulated sonar reading, centimeters.
    pub distance_cm: f64,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            running: false,
            telemetry: false,
            velocity: 100.0,
            vmax: 50.0,
            pid_left: PidGains::default(),
            pid_right: PidGains::default(),
            distance_cm: 25.0,
        }
    }
}

/// Device-side peer: validates frames, answers commands.
pub struct Responder {
    config: ResponderConfig,
    format: &'static dyn FrameFormat,
    scanner: LineScanner,
    state: DeviceState,
}

impl Responder {
    pub fn new(config: ResponderConfig) -> Self {
        let format = config.profile.format();
        Self {
            config,
            format,
            scanner: LineScanner::new(format),
            state: DeviceState::default(),
        }
    }

    /// Current device state.
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Handle one complete received line.
    ///
    /// Returns the reply frame to write back, or `None` for lines that are
    /// not candidate frames (telemetry echoes, noise).
    pub fn on_line(&mut self, line: &str) -> Option<String> {
        let text = match self.format.classify(line) {
            Line::Frame(text) => text,
            Line::Telemetry(_) => {
                trace!(line, "ignoring unframed line");
                return None;
            }
        };

        let frame = match self.format.decode_command(&text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, line, "frame failed validation");
                return Some(self.seal("NACK|BAD_CHECKSUM"));
            }
        };

        // The delimited grammar is exactly two fields; a payload with its
        // own separator means the split misfired on line noise.
        if self.config.profile == Profile::Delimited && frame.payload.contains('|') {
            warn!(payload = %frame.payload, "excess fields in frame");
            return Some(self.seal("NACK|BAD_CHECKSUM"));
        }

        let reply = self.execute(frame.payload.trim());
        debug!(command = %frame.payload, reply = %reply, "command handled");
        Some(self.seal(&reply))
    }

    /// Feed raw received bytes; returns a reply frame per complete valid
    /// command frame found.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.scanner.push(bytes);
        let mut replies = Vec::new();
        while let Some(line) = self.scanner.next_line() {
            if let Some(reply) = self.on_line(&line) {
                replies.push(reply);
            }
        }
        replies
    }

    /// One unframed telemetry line derived from current state.
    pub fn telemetry_line(&self) -> String {
        format!(
            "DIST={:.1} VREF={:.1} PWM={}\n",
            self.state.distance_cm,
            self.state.vmax,
            (self.state.velocity as i64).clamp(0, 255)
        )
    }

    /// Map a validated command payload to its reply text.
    fn execute(&mut self, command: &str) -> String {
        match command {
            "PING" => return "ACK|PONG".to_string(),
            "START" => {
                self.state.running = true;
                return "ACK".to_string();
            }
            "STOP" | "S" => {
                self.state.running = false;
                return "ACK".to_string();
            }
            "TELEMETRY_ON" => {
                self.state.telemetry = true;
                return "ACK".to_string();
            }
            "TELEMETRY_OFF" => {
                self.state.telemetry = false;
                return "ACK".to_string();
            }
            "READ_DISTANCE" | "B" => {
                return format!("ACK|{:.0}", self.state.distance_cm);
            }
            "I" => return "ACK|AL=512,DL=0,AR=498,DR=0".to_string(),
            "STATUS" => return self.status_reply(),
            _ => {}
        }

        if let Some((name, arg)) = command.split_once(' ') {
            return self.execute_keyed(name, arg.trim());
        }
        if let Some(arg) = call_argument(command) {
            return self.execute_call(&command[..1], arg);
        }
        // Colon-profile payloads separate fields with '|' (CMD|ARG|SEQ).
        if command.contains('|') {
            let mut fields = command.split('|');
            let name = fields.next().unwrap_or_default().to_string();
            let arg = fields.next().unwrap_or_default().to_string();
            return self.execute_fielded(&name, &arg);
        }

        self.unknown(command)
    }

    /// `CMD|ARG|SEQ` vocabulary of the colon profile.
    fn execute_fielded(&mut self, name: &str, arg: &str) -> String {
        match name {
            "S" | "B" | "I" | "PING" => self.execute(name),
            "H" => "ACK|READY".to_string(),
            "M" | "R" | "V" => {
                if arg.is_empty() {
                    return "NACK|BAD_ARGUMENT".to_string();
                }
                self.execute_call(name, arg)
            }
            _ => self.unknown(name),
        }
    }

    /// `NAME ARG` vocabulary: PID gains and velocity limits.
    fn execute_keyed(&mut self, name: &str, arg: &str) -> String {
        let slot = match name {
            "KP_L" => Some(&mut self.state.pid_left.kp),
            "KI_L" => Some(&mut self.state.pid_left.ki),
            "KD_L" => Some(&mut self.state.pid_left.kd),
            "KP_R" => Some(&mut self.state.pid_right.kp),
            "KI_R" => Some(&mut self.state.pid_right.ki),
            "KD_R" => Some(&mut self.state.pid_right.kd),
            "VMAX" => Some(&mut self.state.vmax),
            _ => None,
        };
        match slot {
            Some(slot) => match arg.parse::<f64>() {
                Ok(value) => {
                    *slot = value;
                    "ACK".to_string()
                }
                Err(_) => "NACK|BAD_ARGUMENT".to_string(),
            },
            None => self.unknown(name),
        }
    }

    /// `NAME(ARG)` vocabulary: motion primitives.
    fn execute_call(&mut self, name: &str, arg: &str) -> String {
        let value: i64 = match arg.parse() {
            Ok(value) => value,
            Err(_) => return "NACK|BAD_ARGUMENT".to_string(),
        };
        match name {
            // Move (cm) and rotate (deg) just acknowledge; the simulator
            // has no kinematics.
            "M" | "R" => "ACK".to_string(),
            "V" => {
                self.state.velocity = value as f64;
                "ACK".to_string()
            }
            _ => self.unknown(name),
        }
    }

    fn status_reply(&self) -> String {
        let s = &self.state;
        format!(
            "ACK|KP_L={},KI_L={},KD_L={},KP_R={},KI_R={},KD_R={},VMAX={},RUN={}",
            s.pid_left.kp,
            s.pid_left.ki,
            s.pid_left.kd,
            s.pid_right.kp,
            s.pid_right.ki,
            s.pid_right.kd,
            s.vmax,
            u8::from(s.running)
        )
    }

    fn unknown(&self, command: &str) -> String {
        match self.config.unknown_policy {
            UnknownPolicy::Strict => {
                debug!(command, "unknown command rejected");
                "NACK|UNKNOWN_COMMAND".to_string()
            }
            UnknownPolicy::Lenient => {
                debug!(command, "unknown command acknowledged (lenient)");
                "ACK".to_string()
            }
        }
    }

    /// Attach the profile's reply framing.
    fn seal(&self, reply: &str) -> String {
        match self.config.profile {
            Profile::Delimited => format!("{reply}#"),
            Profile::ColonHex => format!("{reply}\n"),
        }
    }
}

/// Extract `ARG` from a single-letter `NAME(ARG)` call.
fn call_argument(command: &str) -> Option<&str> {
    let open = command.find('(')?;
    if open != 1 || !command.ends_with(')') {
        return None;
    }
    Some(&command[open + 1..command.len() - 1])
}

/// Options for the simulator loop.
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    /// Emit a telemetry line at this interval while the device is running
    /// with telemetry on.
    pub telemetry_interval: Option<Duration>,
}

const SERVE_POLL: Duration = Duration::from_millis(20);

/// Drive a responder over a stream until cancelled or the peer hangs up.
///
/// Reads available bytes, feeds the responder, writes its replies, and
/// streams telemetry while the run and telemetry flags are both set.
pub fn serve(
    mut stream: LinkStream,
    mut responder: Responder,
    cancel: &AtomicBool,
    options: ServeOptions,
) -> Result<()> {
    stream.set_read_timeout(Some(SERVE_POLL))?;
    let mut chunk = [0u8; 256];
    let mut last_telemetry = Instant::now();

    loop {
        if cancel.load(Ordering::SeqCst) {
            return Ok(());
        }
        match stream.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(n) => {
                for reply in responder.feed(&chunk[..n]) {
                    stream
                        .write_all(reply.as_bytes())
                        .and_then(|()| stream.flush())
                        .map_err(TransportError::Io)?;
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {}
            Err(err) => return Err(TransportError::Io(err).into()),
        }

        if let Some(interval) = options.telemetry_interval {
            let state = responder.state();
            if state.running && state.telemetry && last_telemetry.elapsed() >= interval {
                let line = responder.telemetry_line();
                stream
                    .write_all(line.as_bytes())
                    .and_then(|()| stream.flush())
                    .map_err(TransportError::Io)?;
                last_telemetry = Instant::now();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serlink_frame::Delimited;

    fn responder() -> Responder {
        Responder::new(ResponderConfig::default())
    }

    fn frame(payload: &str) -> String {
        Delimited.encode(payload)
    }

    #[test]
    fn answers_ping_with_pong() {
        let mut r = responder();
        assert_eq!(r.on_line(&frame("PING")), Some("ACK|PONG#".to_string()));
    }

    #[test]
    fn ignores_unframed_lines() {
        let mut r = responder();
        assert_eq!(r.on_line("DIST=17.2 VREF=40"), None);
        assert_eq!(r.on_line("PING|46"), None); // no terminator
    }

    #[test]
    fn corrupted_frame_is_nacked_without_state_change() {
        let mut r = responder();
        let before = r.state().clone();
        // Valid checksum for "VMAX 80" would differ; force a mismatch.
        assert_eq!(
            r.on_line("VMAX 80|1#"),
            Some("NACK|BAD_CHECKSUM#".to_string())
        );
        assert_eq!(r.state(), &before);
    }

    #[test]
    fn missing_checksum_field_is_nacked() {
        let mut r = responder();
        assert_eq!(r.on_line("PING#"), Some("NACK|BAD_CHECKSUM#".to_string()));
    }

    #[test]
    fn side_effects_land_before_the_ack() {
        let mut r = responder();
        assert_eq!(r.on_line(&frame("VMAX 42.5")), Some("ACK#".to_string()));
        assert_eq!(r.state().vmax, 42.5);

        let status = r.on_line(&frame("STATUS")).unwrap();
        assert!(status.contains("VMAX=42.5"));
    }

    #[test]
    fn pid_gains_are_stored_per_wheel() {
        let mut r = responder();
        r.on_line(&frame("KP_L 3.5"));
        r.on_line(&frame("KD_R 0.25"));
        assert_eq!(r.state().pid_left.kp, 3.5);
        assert_eq!(r.state().pid_right.kd, 0.25);
        assert_eq!(r.state().pid_left.kd, 0.1); // untouched default
    }

    #[test]
    fn bad_argument_is_rejected() {
        let mut r = responder();
        assert_eq!(
            r.on_line(&frame("VMAX fast")),
            Some("NACK|BAD_ARGUMENT#".to_string())
        );
        assert_eq!(
            r.on_line(&frame("M(ten)")),
            Some("NACK|BAD_ARGUMENT#".to_string())
        );
    }

    #[test]
    fn call_style_commands_work() {
        let mut r = responder();
        assert_eq!(r.on_line(&frame("V(40)")), Some("ACK#".to_string()));
        assert_eq!(r.state().velocity, 40.0);
        assert_eq!(r.on_line(&frame("M(10)")), Some("ACK#".to_string()));
        assert_eq!(r.on_line(&frame("R(-90)")), Some("ACK#".to_string()));
        assert_eq!(r.on_line(&frame("B")), Some("ACK|25#".to_string()));
    }

    #[test]
    fn telemetry_toggles_update_state() {
        let mut r = responder();
        r.on_line(&frame("TELEMETRY_ON"));
        assert!(r.state().telemetry);
        r.on_line(&frame("TELEMETRY_OFF"));
        assert!(!r.state().telemetry);
    }

    #[test]
    fn strict_policy_nacks_unknown_commands() {
        let mut r = responder();
        assert_eq!(
            r.on_line(&frame("WARP 9")),
            Some("NACK|UNKNOWN_COMMAND#".to_string())
        );
    }

    #[test]
    fn lenient_policy_acks_unknown_commands() {
        let mut r = Responder::new(ResponderConfig {
            unknown_policy: UnknownPolicy::Lenient,
            ..ResponderConfig::default()
        });
        assert_eq!(r.on_line(&frame("WARP 9")), Some("ACK#".to_string()));
    }

    #[test]
    fn feed_reassembles_split_frames() {
        let mut r = responder();
        let wire = frame("PING");
        let (head, tail) = wire.split_at(3);

        assert!(r.feed(head.as_bytes()).is_empty());
        assert_eq!(r.feed(tail.as_bytes()), vec!["ACK|PONG#".to_string()]);
    }

    #[test]
    fn feed_answers_each_frame_once() {
        let mut r = responder();
        let wire = format!("{}{}", frame("PING"), frame("STATUS"));
        let replies = r.feed(wire.as_bytes());
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], "ACK|PONG#");
        assert!(replies[1].starts_with("ACK|KP_L="));
    }

    #[test]
    fn colon_profile_roundtrip() {
        use serlink_frame::ColonHex;
        let mut r = Responder::new(ResponderConfig {
            profile: Profile::ColonHex,
            ..ResponderConfig::default()
        });
        let wire = ColonHex.encode("PING");
        let replies = r.feed(wire.as_bytes());
        assert_eq!(replies, vec!["ACK|PONG\n".to_string()]);
    }

    #[test]
    fn colon_profile_fielded_commands() {
        use serlink_frame::ColonHex;
        let mut r = Responder::new(ResponderConfig {
            profile: Profile::ColonHex,
            ..ResponderConfig::default()
        });

        let replies = r.feed(ColonHex.encode("V|40|1").as_bytes());
        assert_eq!(replies, vec!["ACK\n".to_string()]);
        assert_eq!(r.state().velocity, 40.0);

        let replies = r.feed(ColonHex.encode("H||2").as_bytes());
        assert_eq!(replies, vec!["ACK|READY\n".to_string()]);

        let replies = r.feed(ColonHex.encode("M||3").as_bytes());
        assert_eq!(replies, vec!["NACK|BAD_ARGUMENT\n".to_string()]);
    }

    #[test]
    fn telemetry_line_reflects_state() {
        let mut r = responder();
        r.on_line(&frame("VMAX 40"));
        let line = r.telemetry_line();
        assert!(line.starts_with("DIST=25.0 VREF=40.0"));
        assert!(line.ends_with('\n'));
    }
}
