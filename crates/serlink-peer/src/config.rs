//! Session configuration.

use std::time::Duration;

use serlink_frame::Profile;

/// Inter-attempt delay policy.
///
/// The primary firmware pauses a fixed 100 ms between attempts; the
/// colon-profile variant doubles a 300 ms base instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Constant pause between attempts.
    Fixed(Duration),
    /// `base * factor^n` after the n-th timed-out attempt, capped.
    Exponential { base: Duration, factor: u32 },
}

/// Ceiling for exponential delays.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

impl Backoff {
    /// Delay to apply after `timed_out_attempts` attempts have expired.
    pub fn delay(&self, timed_out_attempts: u32) -> Duration {
        match *self {
            Backoff::Fixed(pause) => pause,
            Backoff::Exponential { base, factor } => {
                let exp = timed_out_attempts.min(16);
                let multiplier = u64::from(factor).saturating_pow(exp);
                base.saturating_mul(multiplier.min(u64::from(u32::MAX)) as u32)
                    .min(MAX_BACKOFF)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed(Duration::from_millis(100))
    }
}

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Wire framing shared with the device.
    pub profile: Profile,
    /// Bounded wait for a reply, per attempt.
    pub reply_timeout: Duration,
    /// Total attempt budget for [`send`](crate::Session::send) — the first
    /// transmission counts.
    pub max_retries: u32,
    /// Inter-attempt delay policy.
    pub backoff: Backoff,
    /// No-op command used as the liveness probe.
    pub watchdog_command: String,
    /// Substring expected in the probe's ACK data, if any.
    pub watchdog_expect: Option<String>,
    /// Read-timeout tick of the reader thread; bounds shutdown latency.
    pub reader_poll: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            profile: Profile::default(),
            reply_timeout: Duration::from_secs(1),
            max_retries: 3,
            backoff: Backoff::default(),
            watchdog_command: "PING".to_string(),
            watchdog_expect: Some("PONG".to_string()),
            reader_poll: Duration::from_millis(50),
        }
    }
}
