//! Framing profiles.
//!
//! Two incompatible framings exist in deployed firmware, so the codec is a
//! strategy behind the [`FrameFormat`] trait rather than a hard-coded
//! constant:
//!
//! Delimited (primary):
//! ```text
//! ┌─────────────┬─────┬────────────────────┬─────┐
//! │ payload     │ '|' │ checksum (decimal) │ '#' │
//! └─────────────┴─────┴────────────────────┴─────┘
//! ```
//!
//! ColonHex (variant):
//! ```text
//! ┌─────┬───────────────────┬────────────────────┬──────┐
//! │ ':' │ CMD|ARG|SEQ       │ checksum (2× hex)  │ '\n' │
//! └─────┴───────────────────┴────────────────────┴──────┘
//! ```
//!
//! The checksum is the byte sum of the covered text modulo 256; ColonHex
//! covers the leading colon, Delimited covers the payload only.
//!
//! Replies travel framed but without a checksum field (`ACK|PONG#`,
//! `NACK|BAD_CHECKSUM#`): the `|` there introduces data, not a checksum.
//! Checksum verification therefore applies to command frames, on the
//! responder side — see [`Reply`](crate::Reply) for the response grammar.

use crate::checksum::{byte_sum, render_decimal, render_hex};
use crate::error::{FrameError, Result};

/// Terminator of a delimited-profile frame.
pub const FRAME_TERMINATOR: char = '#';

/// Separator between payload and checksum field.
pub const CHECKSUM_SEPARATOR: char = '|';

/// A validated protocol frame: command payload plus its checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The command payload, checksum field stripped.
    pub payload: String,
    /// The checksum transmitted with (or computed for) the payload.
    pub checksum: u8,
}

/// Classification of one complete received line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// A frame candidate; frame marking kept so decoders can validate it.
    Frame(String),
    /// An unframed, free-form status line. No checksum, informational.
    Telemetry(String),
}

/// A pluggable wire framing.
///
/// Implementations are pure and stateless; sessions and responders on both
/// ends of a link must be configured with the same profile.
pub trait FrameFormat: Send + Sync {
    /// Wrap a command payload into its wire representation. Never fails.
    ///
    /// The payload must not contain the profile's frame marking (`#` for
    /// the delimited profile); the transport layer treats payloads as
    /// opaque and does not escape them.
    fn encode(&self, payload: &str) -> String;

    /// Classify one complete line as a frame candidate or telemetry.
    fn classify(&self, line: &str) -> Line;

    /// Validate a frame candidate produced by [`classify`](Self::classify)
    /// and extract the command payload.
    fn decode_command(&self, text: &str) -> Result<Frame>;

    /// Bytes (besides `\n`) that complete a line in this profile.
    fn extra_line_terminators(&self) -> &'static [u8];
}

/// The primary profile: `payload|decimal_checksum#`.
///
/// Telemetry is any line that does not end with the `#` terminator.
#[derive(Debug, Default, Clone, Copy)]
pub struct Delimited;

impl FrameFormat for Delimited {
    fn encode(&self, payload: &str) -> String {
        let mut frame = String::with_capacity(payload.len() + 5);
        frame.push_str(payload);
        frame.push(CHECKSUM_SEPARATOR);
        frame.push_str(&render_decimal(byte_sum(payload)));
        frame.push(FRAME_TERMINATOR);
        frame
    }

    fn classify(&self, line: &str) -> Line {
        match line.strip_suffix(FRAME_TERMINATOR) {
            Some(text) => Line::Frame(text.to_string()),
            None => Line::Telemetry(line.to_string()),
        }
    }

    fn decode_command(&self, text: &str) -> Result<Frame> {
        let text = text.strip_suffix(FRAME_TERMINATOR).unwrap_or(text);
        let (payload, field) = text
            .rsplit_once(CHECKSUM_SEPARATOR)
            .ok_or_else(|| FrameError::Malformed("missing checksum separator".into()))?;
        let found: u8 = field
            .parse()
            .map_err(|_| FrameError::Malformed(format!("non-numeric checksum field '{field}'")))?;
        let expected = byte_sum(payload);
        if found != expected {
            return Err(FrameError::ChecksumMismatch { expected, found });
        }
        Ok(Frame {
            payload: payload.to_string(),
            checksum: found,
        })
    }

    fn extra_line_terminators(&self) -> &'static [u8] {
        &[FRAME_TERMINATOR as u8]
    }
}

/// The variant profile: `:CMD|ARG|SEQ` + two-digit hex checksum + newline.
///
/// Every line here ends with a newline, so the frame marking is positional
/// instead: command frames start with `:`, reply frames with `ACK`/`NACK`,
/// and everything else is telemetry.
#[derive(Debug, Default, Clone, Copy)]
pub struct ColonHex;

impl FrameFormat for ColonHex {
    fn encode(&self, payload: &str) -> String {
        let mut core = String::with_capacity(payload.len() + 4);
        core.push(':');
        core.push_str(payload);
        let checksum = render_hex(byte_sum(&core));
        core.push_str(&checksum);
        core.push('\n');
        core
    }

    fn classify(&self, line: &str) -> Line {
        if line.starts_with(':') || line.starts_with("ACK") || line.starts_with("NACK") {
            Line::Frame(line.to_string())
        } else {
            Line::Telemetry(line.to_string())
        }
    }

    fn decode_command(&self, text: &str) -> Result<Frame> {
        let core = text.strip_suffix('\n').unwrap_or(text);
        let core = core.strip_suffix('\r').unwrap_or(core);
        if !core.starts_with(':') {
            return Err(FrameError::Malformed("missing leading ':'".into()));
        }
        if core.len() < 3 {
            return Err(FrameError::Malformed("frame shorter than checksum field".into()));
        }
        let split = core.len() - 2;
        if !core.is_char_boundary(split) {
            return Err(FrameError::Malformed("non-ASCII checksum field".into()));
        }
        let (covered, field) = core.split_at(split);
        let found = u8::from_str_radix(field, 16)
            .map_err(|_| FrameError::Malformed(format!("non-hex checksum field '{field}'")))?;
        let expected = byte_sum(covered);
        if found != expected {
            return Err(FrameError::ChecksumMismatch { expected, found });
        }
        Ok(Frame {
            payload: covered[1..].to_string(),
            checksum: found,
        })
    }

    fn extra_line_terminators(&self) -> &'static [u8] {
        &[]
    }
}

/// Profile selector carried in session and responder configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// `payload|decimal_checksum#` — matched by most of the command surface.
    #[default]
    Delimited,
    /// `:CMD|ARG|SEQ` + two-digit hex checksum + newline.
    ColonHex,
}

impl Profile {
    /// The format implementation for this profile.
    pub fn format(self) -> &'static dyn FrameFormat {
        match self {
            Profile::Delimited => &Delimited,
            Profile::ColonHex => &ColonHex,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimited_encode_known_frame() {
        assert_eq!(Delimited.encode("PING"), "PING|46#");
        assert_eq!(Delimited.encode(""), "|0#");
    }

    #[test]
    fn delimited_roundtrip_is_valid() {
        for payload in ["PING", "KP_L 2.5", "M(10)", "CFG(kp=1,ki=0)", "x|y"] {
            let wire = Delimited.encode(payload);
            let text = match Delimited.classify(&wire) {
                Line::Frame(text) => text,
                other => panic!("expected frame, got {other:?}"),
            };
            let frame = Delimited.decode_command(&text).expect("roundtrip should decode");
            assert_eq!(frame.payload, payload);
            assert_eq!(frame.checksum, crate::checksum::byte_sum(payload));
        }
    }

    #[test]
    fn delimited_classifies_unterminated_as_telemetry() {
        // Content that looks frame-like is still telemetry without the terminator.
        for line in ["DIST=17.2 VREF=40 PWM=128", "PING|46", "ACK", "random noise"] {
            assert_eq!(
                Delimited.classify(line),
                Line::Telemetry(line.to_string())
            );
        }
    }

    #[test]
    fn delimited_rejects_missing_separator() {
        let err = Delimited.decode_command("PING").unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn delimited_rejects_non_numeric_checksum() {
        let err = Delimited.decode_command("ACK|PONG").unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    #[test]
    fn delimited_detects_corruption() {
        // Flip one character of the payload; 'Q' != 'P' so the sum moves.
        let err = Delimited.decode_command("QING|46").unwrap_err();
        assert!(matches!(err, FrameError::ChecksumMismatch { .. }));

        // Corrupt the checksum field instead.
        let err = Delimited.decode_command("PING|47").unwrap_err();
        assert!(matches!(
            err,
            FrameError::ChecksumMismatch {
                expected: 46,
                found: 47
            }
        ));
    }

    #[test]
    fn delimited_splits_on_last_separator() {
        // Payload-internal '|' must not confuse the checksum split.
        let wire = Delimited.encode("SET|MODE");
        let Line::Frame(text) = Delimited.classify(&wire) else {
            panic!("expected frame");
        };
        let frame = Delimited.decode_command(&text).unwrap();
        assert_eq!(frame.payload, "SET|MODE");
    }

    #[test]
    fn colon_hex_encode_known_frame() {
        // ':'+'H'+'|'+'|'+'1' = 58+72+124+124+49 = 427 % 256 = 171 = 0xAB
        assert_eq!(ColonHex.encode("H||1"), ":H||1AB\n");
    }

    #[test]
    fn colon_hex_roundtrip_is_valid() {
        for payload in ["M|25|1", "V|40|7", "H||3"] {
            let wire = ColonHex.encode(payload);
            let frame = ColonHex
                .decode_command(wire.trim_end())
                .expect("roundtrip should decode");
            assert_eq!(frame.payload, payload);
        }
    }

    #[test]
    fn colon_hex_classifies_by_prefix() {
        assert!(matches!(ColonHex.classify(":M|10|1A4"), Line::Frame(_)));
        assert!(matches!(ColonHex.classify("ACK|1"), Line::Frame(_)));
        assert!(matches!(ColonHex.classify("NACK|1|TIMEOUT"), Line::Frame(_)));
        assert!(matches!(
            ColonHex.classify("battery low"),
            Line::Telemetry(_)
        ));
    }

    #[test]
    fn colon_hex_detects_corruption() {
        let wire = ColonHex.encode("M|25|1");
        let mut corrupted = wire.trim_end().to_string();
        // Replace the argument without fixing the checksum.
        corrupted = corrupted.replacen("25", "26", 1);
        let err = ColonHex.decode_command(&corrupted).unwrap_err();
        assert!(matches!(err, FrameError::ChecksumMismatch { .. }));
    }

    #[test]
    fn colon_hex_rejects_short_and_unprefixed() {
        assert!(matches!(
            ColonHex.decode_command("M|25|1A4").unwrap_err(),
            FrameError::Malformed(_)
        ));
        assert!(matches!(
            ColonHex.decode_command(":A").unwrap_err(),
            FrameError::Malformed(_)
        ));
    }

    #[test]
    fn profile_selector_resolves_formats() {
        assert_eq!(Profile::default(), Profile::Delimited);
        assert_eq!(Profile::Delimited.format().encode("PING"), "PING|46#");
        assert!(Profile::ColonHex.format().encode("H||1").starts_with(':'));
    }
}
