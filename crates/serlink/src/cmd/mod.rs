use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use serlink_frame::Profile;
use serlink_peer::{Backoff, SessionConfig};
use serlink_transport::LinkStream;

use crate::exit::{transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod monitor;
pub mod respond;
pub mod send;
pub mod version;
pub mod watchdog;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one command and print the reply.
    Send(SendArgs),
    /// Probe device liveness.
    Watchdog(WatchdogArgs),
    /// Stream telemetry until interrupted or a duration elapses.
    Monitor(MonitorArgs),
    /// Run the device simulator on a port.
    Respond(RespondArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Watchdog(args) => watchdog::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        Command::Respond(args) => respond::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ProfileArg {
    /// `payload|decimal_checksum#`
    Delimited,
    /// `:CMD|ARG|SEQ` + two-digit hex checksum + newline
    ColonHex,
}

impl From<ProfileArg> for Profile {
    fn from(arg: ProfileArg) -> Profile {
        match arg {
            ProfileArg::Delimited => Profile::Delimited,
            ProfileArg::ColonHex => Profile::ColonHex,
        }
    }
}

/// Connection arguments shared by every subcommand that opens a port.
#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Serial device to open (e.g. /dev/ttyUSB0).
    pub port: String,
    /// Baud rate.
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,
    /// Wire framing profile; must match the device.
    #[arg(long, value_enum, default_value = "delimited")]
    pub profile: ProfileArg,
    /// Per-attempt reply timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "1s")]
    pub timeout: String,
    /// Total attempt budget per command.
    #[arg(long, default_value_t = 3)]
    pub retries: u32,
}

impl LinkArgs {
    pub fn open_stream(&self) -> CliResult<LinkStream> {
        LinkStream::open_serial(&self.port, self.baud)
            .map_err(|err| transport_error("open failed", err))
    }

    pub fn session_config(&self) -> CliResult<SessionConfig> {
        let profile = Profile::from(self.profile);
        // The colon-profile firmware expects doubling backoff; the primary
        // profile pauses a fixed beat.
        let backoff = match profile {
            Profile::Delimited => Backoff::Fixed(Duration::from_millis(100)),
            Profile::ColonHex => Backoff::Exponential {
                base: Duration::from_millis(300),
                factor: 2,
            },
        };
        Ok(SessionConfig {
            profile,
            reply_timeout: parse_duration(&self.timeout)?,
            max_retries: self.retries,
            backoff,
            ..SessionConfig::default()
        })
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Command payload, e.g. "PING" or "KP_L 2.5".
    pub command: String,
    /// Write the exchange history to this file afterwards (JSON lines).
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct WatchdogArgs {
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Stop after this long (e.g. 30s); runs until Ctrl-C otherwise.
    #[arg(long)]
    pub duration: Option<String>,
}

#[derive(Args, Debug)]
pub struct RespondArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Acknowledge unknown commands instead of rejecting them.
    #[arg(long)]
    pub lenient: bool,
    /// Emit simulated telemetry at this interval while running.
    #[arg(long, value_name = "DUR", default_value = "250ms")]
    pub telemetry_interval: String,
}

#[derive(Args, Debug, Default)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn colon_profile_selects_exponential_backoff() {
        let args = LinkArgs {
            port: "/dev/ttyUSB0".to_string(),
            baud: 9600,
            profile: ProfileArg::ColonHex,
            timeout: "1s".to_string(),
            retries: 3,
        };
        let config = args.session_config().unwrap();
        assert!(matches!(config.backoff, Backoff::Exponential { .. }));
    }
}
