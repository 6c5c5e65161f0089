//! nstools - namespace dependency tracking and selective reload

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = nstools::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
