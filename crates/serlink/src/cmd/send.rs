use std::fs::File;
use std::io::Write;

use serlink_peer::Session;

use crate::cmd::SendArgs;
use crate::exit::{io_error, session_error, CliResult, SUCCESS};
use crate::output::{print_event, print_reply, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let stream = args.link.open_stream()?;
    let config = args.link.session_config()?;
    let mut session =
        Session::open(stream, config).map_err(|err| session_error("open failed", err))?;

    let outcome = session.send(&args.command);

    // Surface whatever else arrived around the exchange before reporting.
    for event in session.drain_telemetry() {
        print_event(&event, format);
    }

    let result = match outcome {
        Ok(reply) => {
            print_reply(&args.command, &reply, format);
            Ok(SUCCESS)
        }
        Err(err) => Err(session_error("send failed", err)),
    };

    if let Some(path) = &args.log_file {
        write_log(path, session.history())?;
    }

    result
}

fn write_log(path: &std::path::Path, entries: &[serlink_peer::HistoryEntry]) -> CliResult<()> {
    let mut file = File::create(path)
        .map_err(|err| io_error(&format!("failed creating {}", path.display()), err))?;
    for entry in entries {
        let line = serde_json::to_string(entry)
            .map_err(|err| io_error("failed encoding history entry", std::io::Error::other(err)))?;
        writeln!(file, "{line}")
            .map_err(|err| io_error(&format!("failed writing {}", path.display()), err))?;
    }
    Ok(())
}
