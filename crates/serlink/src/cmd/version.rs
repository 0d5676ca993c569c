use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    println!("serlink {}", env!("CARGO_PKG_VERSION"));
    if args.extended {
        println!("profiles: delimited, colon-hex");
        if let Some(target) = option_env!("TARGET") {
            println!("target: {target}");
        }
    }
    Ok(SUCCESS)
}
