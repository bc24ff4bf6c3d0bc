//! Fetch progress indication
//!
//! Entry counts and byte totals are unknown until a locator is drained, so
//! progress is a spinner with a running tally.

use super::OutputConfig;

/// Spinner wrapper
///
/// In quiet or JSON mode, progress is suppressed.
#[derive(Debug)]
pub struct ProgressBar {
    bar: Option<indicatif::ProgressBar>,
    entries: u64,
    bytes: u64,
}

impl ProgressBar {
    /// Create a spinner for indeterminate progress
    pub fn spinner(config: &OutputConfig, message: &str) -> Self {
        let bar = if config.quiet || config.json || config.no_progress {
            None
        } else {
            let bar = indicatif::ProgressBar::new_spinner();
            if let Ok(style) = indicatif::ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
                bar.set_style(style);
            }
            bar.set_message(message.to_string());
            bar.enable_steady_tick(std::time::Duration::from_millis(100));
            Some(bar)
        };

        Self {
            bar,
            entries: 0,
            bytes: 0,
        }
    }

    /// Count one more entry of `size` bytes
    pub fn record(&mut self, size: u64) {
        self.entries += 1;
        self.bytes += size;
        if let Some(bar) = &self.bar {
            bar.set_message(format!(
                "{} entries, {}",
                self.entries,
                humansize::format_size(self.bytes, humansize::BINARY)
            ));
        }
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Finish and clear the spinner
    pub fn finish_and_clear(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    /// Check if the spinner is visible
    pub fn is_visible(&self) -> bool {
        self.bar.is_some()
    }
}
