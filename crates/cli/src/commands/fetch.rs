//! fetch command - Resolve a locator and list or save its entries
//!
//! Entries are reported as they arrive. With `--output-dir` each one is
//! also written beneath the directory.

use std::path::{Component, Path, PathBuf};

use clap::Args;
use futures::StreamExt;
use serde::Serialize;

use arl_core::{Entry, Error};

use super::LocatorArgs;
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, ProgressBar};

/// Fetch every entry of a locator
#[derive(Args, Debug)]
pub struct FetchCmdArgs {
    #[command(flatten)]
    pub target: LocatorArgs,

    /// Write each entry beneath this directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct EntryOutput<'a> {
    path: &'a str,
    size_bytes: usize,
    size_human: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    written_to: Option<String>,
}

#[derive(Debug, Serialize)]
struct SummaryOutput {
    status: &'static str,
    entries: u64,
    total_bytes: u64,
}

/// Execute the fetch command
pub async fn execute(args: FetchCmdArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config.clone());

    let locator = match args.target.locator() {
        Ok(locator) => locator,
        Err(e) => return super::fail(&formatter, &e.to_string(), &e),
    };

    let transports = match super::transports() {
        Ok(t) => t,
        Err(e) => return super::fail(&formatter, &format!("Failed to create HTTP client: {e}"), &e),
    };

    let mut progress = ProgressBar::spinner(&output_config, &format!("Fetching {}", locator.descriptor()));
    let mut entries = locator.fetch(&transports);

    loop {
        let next = tokio::select! {
            next = entries.next() => next,
            _ = tokio::signal::ctrl_c() => {
                progress.finish_and_clear();
                formatter.error("Interrupted");
                return ExitCode::Interrupted;
            }
        };

        let entry = match next {
            Some(Ok(entry)) => entry,
            Some(Err(e)) => {
                progress.finish_and_clear();
                return super::fail(&formatter, &e.to_string(), &e);
            }
            None => break,
        };

        progress.record(entry.content.len() as u64);

        let written_to = match &args.output_dir {
            Some(dir) => match save(dir, &entry).await {
                Ok(path) => Some(path.display().to_string()),
                Err(e) => {
                    progress.finish_and_clear();
                    return super::fail(&formatter, &format!("Failed to write {}: {e}", entry.path), &e);
                }
            },
            None => None,
        };

        report(&formatter, &entry, written_to);
    }

    progress.finish_and_clear();

    if formatter.is_json() {
        formatter.json_line(&SummaryOutput {
            status: "success",
            entries: progress.entries(),
            total_bytes: progress.bytes(),
        });
    } else {
        formatter.success(&format!(
            "Fetched {} entries ({})",
            progress.entries(),
            humansize::format_size(progress.bytes(), humansize::BINARY)
        ));
    }

    ExitCode::Success
}

fn report(formatter: &Formatter, entry: &Entry, written_to: Option<String>) {
    let size_human = humansize::format_size(entry.content.len(), humansize::BINARY);

    if formatter.is_json() {
        formatter.json_line(&EntryOutput {
            path: &entry.path,
            size_bytes: entry.content.len(),
            size_human,
            written_to,
        });
    } else {
        let line = match written_to {
            Some(target) => format!("{} -> {target} ({size_human})", entry.path),
            None => format!("{} ({size_human})", entry.path),
        };
        formatter.println(&line);
    }
}

async fn save(dir: &Path, entry: &Entry) -> Result<PathBuf, Error> {
    let target = output_path(dir, &entry.path)
        .ok_or_else(|| Error::Syntax(format!("entry path '{}' has no usable components", entry.path)))?;

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&target, &entry.content).await?;
    Ok(target)
}

/// Map an entry path to a file beneath `dir`
///
/// The URL scheme is dropped and `..`, `.` and root components are ignored,
/// so the result never escapes `dir`.
fn output_path(dir: &Path, entry_path: &str) -> Option<PathBuf> {
    let relative = entry_path
        .split_once("://")
        .map_or(entry_path, |(_, rest)| rest);

    let mut target = dir.to_path_buf();
    let mut pushed = false;
    for component in Path::new(relative).components() {
        if let Component::Normal(part) = component {
            target.push(part);
            pushed = true;
        }
    }

    pushed.then_some(target)
}
