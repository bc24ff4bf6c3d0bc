//! parse command - Validate a locator without fetching

use clap::Args;
use serde::Serialize;

use arl_core::{Descriptor, parse_locator};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Validate a locator and print its parts
#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Locator: https://... or [method,destination(,auth-kind,auth-payload)]
    pub locator: String,
}

/// Descriptor as printed; the auth payload is never included
#[derive(Debug, Serialize)]
struct ParseOutput {
    method: String,
    destination: String,
    auth: Option<String>,
    normalized: String,
}

impl From<&Descriptor> for ParseOutput {
    fn from(descriptor: &Descriptor) -> Self {
        Self {
            method: descriptor.method().to_string(),
            destination: descriptor.destination().to_string(),
            auth: descriptor.auth_kind().map(|k| k.to_string()),
            normalized: descriptor.to_string(),
        }
    }
}

/// Execute the parse command
pub fn execute(args: ParseArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let descriptor = match parse_locator(&args.locator) {
        Ok(d) => d,
        Err(e) => return super::fail(&formatter, &e.to_string(), &e),
    };

    let output = ParseOutput::from(&descriptor);
    if formatter.is_json() {
        formatter.json(&output);
    } else {
        formatter.println(&format!("Method:      {}", output.method));
        formatter.println(&format!("Destination: {}", output.destination));
        formatter.println(&format!(
            "Auth:        {}",
            output.auth.as_deref().unwrap_or("none")
        ));
        formatter.println(&format!("Locator:     {}", output.normalized));
    }

    ExitCode::Success
}
