//! CLI parse tests.

use super::{Cli, CliCommand};
use clap::Parser;

pub(super) fn parse(args: &[&str]) -> CliCommand {
    let cli = Cli::try_parse_from(args).unwrap();
    cli.command
}


#[allow(dead_code)]
#[path = "../../../../bloater-core/tests/common/status_server.rs"]
pub(super) mod status_server;
