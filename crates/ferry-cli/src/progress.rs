//! Transfer progress display with progress bars.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TEMPLATE: &str = "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

/// Transfer progress bar
pub struct TransferProgress {
    bar: ProgressBar,
}

impl TransferProgress {
    /// Create a progress bar for `total_bytes`
    #[must_use]
    pub fn new(total_bytes: u64, label: &str) -> Self {
        let bar = ProgressBar::new(total_bytes);
        let style = ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message(label.to_string());

        Self { bar }
    }

    /// Update progress
    pub fn update(&self, transferred_bytes: u64) {
        self.bar.set_position(transferred_bytes);
    }

    /// Finish with a message, leaving the bar full
    pub fn finish_with_message(&self, msg: String) {
        let total = self.bar.length().unwrap_or(0);
        self.bar.set_position(total);
        self.bar.finish_with_message(msg);
    }

    /// Abandon the progress bar (for errors and cancellation)
    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

/// Format duration in human-readable format
///
/// # Example
///
/// ```ignore
/// assert_eq!(format_duration(Duration::from_secs(30)), "30s");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();

    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Average rate over `elapsed`, e.g. `"12.5 MiB/s"`
#[must_use]
pub fn format_rate(bytes: u64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs <= f64::EPSILON {
        return "-".to_string();
    }
    format!("{}/s", ferry_files::human_bytes((bytes as f64 / secs) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m");
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(1024, Duration::ZERO), "-");
        let rate = format_rate(2 * 1024 * 1024, Duration::from_secs(2));
        assert!(rate.ends_with("/s"));
        assert!(rate.contains("MiB"));
    }

    #[test]
    fn test_progress_bar_lifecycle() {
        let progress = TransferProgress::new(1000, "test.bin");
        progress.update(500);
        progress.finish_with_message("done".to_string());

        let failed = TransferProgress::new(10, "other.bin");
        failed.update(3);
        failed.abandon();
    }
}
