//! `ink` binary entry point.

use std::process::ExitCode;

fn main() -> ExitCode {
    match inkpress::cli::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
