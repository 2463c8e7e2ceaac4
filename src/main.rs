//! tracesplit CLI: split trace directories into chunks, pgzip them back.

use std::process::ExitCode;

use clap::Parser;
use tracesplit::engine::arg_parser::{Cli, Commands};
use tracesplit::engine::{handle_info, handle_pgzip, handle_read, handle_split};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let outcome = match &cli.command {
        Commands::Split(args) => handle_split(args),
        Commands::Pgzip(args) => handle_pgzip(args),
        Commands::Read(args) => handle_read(args),
        Commands::Info(args) => handle_info(args),
    };
    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
