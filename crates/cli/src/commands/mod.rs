//! CLI command definitions and execution
//!
//! This module contains all CLI commands and their implementations, plus
//! the option and transport wiring shared by the commands that fetch.

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use arl_core::{ConfigManager, Error, FetchOptions, Locator, Result, Transports};
use arl_http::ReqwestFetcher;
use arl_s3::S3Connector;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

mod cat;
mod completions;
mod fetch;
mod parse;

/// arl - Authenticated Resource Locator
///
/// Fetch remote resources named by one compact locator string, unpacking
/// tar and zip archives into their member files.
#[derive(Parser, Debug)]
#[command(name = "arl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format: human-readable or JSON
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value = "false")]
    pub no_color: bool,

    /// Disable progress spinner
    #[arg(long, global = true, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch every entry of a locator
    Fetch(fetch::FetchCmdArgs),

    /// Write the content of every entry to stdout
    Cat(cat::CatArgs),

    /// Validate a locator and print its parts without fetching
    Parse(parse::ParseArgs),

    /// Generate shell completion scripts
    Completions(completions::CompletionsArgs),
}

/// Locator plus the fetch options that can override the config file
#[derive(Args, Debug, Clone)]
pub struct LocatorArgs {
    /// Locator: https://... or [method,destination(,auth-kind,auth-payload)]
    pub locator: String,

    /// Maximum size in bytes of any single resource
    #[arg(long, env = "ARL_MAX_SIZE")]
    pub max_size: Option<u64>,

    /// Maximum number of parallel downloads
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Per-download timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl LocatorArgs {
    /// Layer the flags over `base`
    pub fn apply(&self, mut base: FetchOptions) -> FetchOptions {
        if let Some(max_size) = self.max_size {
            base.max_size = Some(max_size);
        }
        if let Some(max_concurrent) = self.max_concurrent {
            base.max_concurrent = max_concurrent;
        }
        if let Some(timeout) = self.timeout {
            base.item_timeout = Some(Duration::from_secs(timeout));
        }
        base
    }

    /// Load file defaults, apply flags and parse the locator
    pub fn locator(&self) -> Result<Locator> {
        let config = ConfigManager::new()?.load()?;
        Locator::with_options(&self.locator, self.apply(config.defaults.to_options()))
    }
}

/// Production transports: reqwest for HTTP, aws-sdk-s3 for object stores
pub fn transports() -> Result<Transports> {
    Ok(Transports::new(
        Arc::new(ReqwestFetcher::new()?),
        Arc::new(S3Connector),
    ))
}

/// Report a failed command and return the exit code its error maps to
pub(crate) fn fail(formatter: &Formatter, message: &str, error: &Error) -> ExitCode {
    let code = ExitCode::from(error);
    tracing::debug!(exit_code = code.as_i32(), "command failed");
    formatter.error(&failure_message(message, code));
    code
}

fn failure_message(message: &str, code: ExitCode) -> String {
    format!("{message} [{code}]")
}

/// Execute the CLI command and return an exit code
pub async fn execute(cli: Cli) -> ExitCode {
    let output_config = OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        no_progress: cli.no_progress,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Fetch(args) => fetch::execute(args, output_config).await,
        Commands::Cat(args) => cat::execute(args, output_config).await,
        Commands::Parse(args) => parse::execute(args, output_config),
        Commands::Completions(args) => completions::execute(args),
    }
}
