//! Main entry point for the unpack CLI app

use std::process::ExitCode;
use unpack::{cli, cli_runner, logging};

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    logging::init_logger(args.verbose);

    if let Err(e) = cli_runner::run_cli_app(args).await {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
