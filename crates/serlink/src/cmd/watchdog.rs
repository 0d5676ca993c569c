use serlink_peer::Session;

use crate::cmd::WatchdogArgs;
use crate::exit::{session_error, CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::{print_watchdog, OutputFormat};

pub fn run(args: WatchdogArgs, format: OutputFormat) -> CliResult<i32> {
    let stream = args.link.open_stream()?;
    let config = args.link.session_config()?;
    let mut session =
        Session::open(stream, config).map_err(|err| session_error("open failed", err))?;

    // Open already probed once; probe again on demand for a fresh answer.
    let connected = session
        .watchdog()
        .map_err(|err| session_error("watchdog failed", err))?;

    print_watchdog(connected, format);
    if connected {
        Ok(SUCCESS)
    } else {
        Ok(HEALTH_CHECK_FAILED)
    }
}
