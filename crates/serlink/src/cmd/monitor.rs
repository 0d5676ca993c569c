use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serlink_peer::Session;

use crate::cmd::{parse_duration, MonitorArgs};
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_event, OutputFormat};

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let duration = args.duration.as_deref().map(parse_duration).transpose()?;

    let stream = args.link.open_stream()?;
    let config = args.link.session_config()?;
    let mut session =
        Session::open(stream, config).map_err(|err| session_error("open failed", err))?;

    let cancel = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(Arc::clone(&cancel))?;

    session
        .monitor(duration, &cancel, |event| print_event(event, format))
        .map_err(|err| session_error("monitor failed", err))?;

    Ok(SUCCESS)
}

fn install_ctrlc_handler(cancel: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        cancel.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
