use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serlink_frame::Profile;
use serlink_peer::{serve, Responder, ResponderConfig, ServeOptions, UnknownPolicy};

use crate::cmd::{parse_duration, RespondArgs};
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: RespondArgs) -> CliResult<i32> {
    let telemetry_interval = parse_duration(&args.telemetry_interval)?;
    let stream = args.link.open_stream()?;

    let responder = Responder::new(ResponderConfig {
        profile: Profile::from(args.link.profile),
        unknown_policy: if args.lenient {
            UnknownPolicy::Lenient
        } else {
            UnknownPolicy::Strict
        },
    });

    let cancel = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(Arc::clone(&cancel))?;

    tracing::info!(port = %args.link.port, "simulator listening");
    serve(
        stream,
        responder,
        &cancel,
        ServeOptions {
            telemetry_interval: Some(telemetry_interval),
        },
    )
    .map_err(|err| session_error("simulator failed", err))?;

    Ok(SUCCESS)
}

fn install_ctrlc_handler(cancel: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        cancel.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
