mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    // Parse CLI and dispatch; logging is initialized once the data dir is known.
    if let Err(err) = CliCommand::run_from_args().await {
        eprintln!("bloater error: {:#}", err);
        std::process::exit(1);
    }
}
