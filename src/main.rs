use std::process::exit;

use clap::Parser;
use log::{error, info, warn};

use crate::config::cmd::CmdArgs;
use crate::subcmd::build::{print_build_failed, BuildCommand};

mod builder;
mod config;
mod init;
mod reg;
mod subcmd;
#[cfg(test)]
mod test_util;
mod util;
mod version;

fn main() {
    let args = CmdArgs::parse();
    init::init(args.log_level.as_deref());
    let info = version::get();
    info!("icrbuild {}", &info);
    match version::parse_version(info.version) {
        Ok(version) if !version.pre.is_empty() => warn!("Running pre-release build {}", version),
        Ok(_) => {}
        Err(err) => warn!("{:#}", err),
    }

    if let Err(err) = BuildCommand::build(&args) {
        error!("{:?}", err);
        print_build_failed(&err);
        exit(1);
    }
}
