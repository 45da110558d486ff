//! Command line companion of the capture gate.
//!
//! ```text
//! capture-gate simulate <SCENARIO> [--state <FILE>] [--pretty]
//! capture-gate validate <CONFIG>
//! ```
//!
//! `simulate` replays a scenario file against an in-memory host and prints one JSON status report
//! per `check` step. `validate` compiles every URL pattern of a remote configuration and fails if
//! any of them is invalid.

mod cli;
mod scenario;

use std::process;

use clap::Parser;

use crate::cli::Cli;

fn main() {
    let cli = Cli::parse();
    capture_gate_log::init(&cli.log_config());

    let exit_code = match cli.run() {
        Ok(()) => 0,
        Err(error) => {
            capture_gate_log::ensure_error(&error);
            1
        }
    };

    process::exit(exit_code);
}
