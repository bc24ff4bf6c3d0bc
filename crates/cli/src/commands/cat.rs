//! cat command - Display entry contents
//!
//! Writes the content of every entry to stdout, in arrival order.

use std::io::{self, Write};

use clap::Args;
use futures::StreamExt;

use super::LocatorArgs;
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Display entry contents
#[derive(Args, Debug)]
pub struct CatArgs {
    #[command(flatten)]
    pub target: LocatorArgs,
}

/// Execute the cat command
pub async fn execute(args: CatArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let locator = match args.target.locator() {
        Ok(locator) => locator,
        Err(e) => return super::fail(&formatter, &e.to_string(), &e),
    };

    let transports = match super::transports() {
        Ok(t) => t,
        Err(e) => return super::fail(&formatter, &format!("Failed to create HTTP client: {e}"), &e),
    };

    let mut entries = locator.fetch(&transports);
    let mut stdout = io::stdout();

    while let Some(next) = entries.next().await {
        match next {
            Ok(entry) => {
                // Bypass the formatter to preserve binary data
                if let Err(e) = stdout.write_all(&entry.content) {
                    formatter.error(&format!("Failed to write to stdout: {e}"));
                    return ExitCode::GeneralError;
                }
            }
            Err(e) => {
                let _ = stdout.flush();
                return super::fail(&formatter, &e.to_string(), &e);
            }
        }
    }

    if let Err(e) = stdout.flush() {
        formatter.error(&format!("Failed to write to stdout: {e}"));
        return ExitCode::GeneralError;
    }

    ExitCode::Success
}
