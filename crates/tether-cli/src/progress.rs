//! Transfer progress display with progress bars.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::Path;

/// One bar per active download.
pub struct TransferBars {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
    style: ProgressStyle,
}

impl TransferBars {
    /// Create an empty set of bars
    #[must_use]
    pub fn new() -> Self {
        let style = ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
            style,
        }
    }

    /// Update the bar for `id`, creating it on first sight
    pub fn update(&mut self, id: &str, bytes: u64, total: u64) {
        let bar = self.bars.entry(id.to_owned()).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new(total));
            bar.set_style(self.style.clone());
            bar.set_message(format!("Receiving: {id}"));
            bar
        });
        bar.set_length(total);
        bar.set_position(bytes);
    }

    /// Finish the bar for `id` with the saved path
    pub fn complete(&mut self, id: &str, path: &Path) {
        let message = format!("Saved: {}", path.display());
        match self.bars.remove(id) {
            Some(bar) => bar.finish_with_message(message),
            None => {
                let _ = self.multi.println(message);
            }
        }
    }

    /// Abandon the bar for `id` (for errors)
    pub fn fail(&mut self, id: &str, error: &str) {
        let message = format!("Failed: {id}: {error}");
        match self.bars.remove(id) {
            Some(bar) => bar.abandon_with_message(message),
            None => {
                let _ = self.multi.println(message);
            }
        }
    }

    /// Print a line above the bars
    pub fn println(&self, line: impl AsRef<str>) {
        if self.multi.println(line.as_ref()).is_err() {
            println!("{}", line.as_ref());
        }
    }
}

impl Default for TransferBars {
    fn default() -> Self {
        Self::new()
    }
}

/// Format bytes in human-readable format
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{size:.2} {}", UNITS[unit_idx])
}
