use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

use crate::config::PROGRESS_REFRESH_HZ;

/// Statistics gathered while a batch is being loaded
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub rows_loaded: u64,
    pub bytes_processed: u64,
    pub statement_durations_us: Vec<u64>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successfully executed row statement
    pub fn record_row(&mut self, duration: Duration) {
        self.rows_loaded += 1;
        self.statement_durations_us
            .push(duration.as_micros().min(u64::MAX as u128) as u64);
    }

    pub fn record_bytes(&mut self, bytes: u64) {
        self.bytes_processed += bytes;
    }

    /// Calculate percentile from statement durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.statement_durations_us.is_empty() {
            return None;
        }

        let mut sorted = self.statement_durations_us.clone();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let index = index.saturating_sub(1).min(sorted.len() - 1);

        Some(sorted[index])
    }

    /// Get p50, p90, p99 percentiles
    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        (
            self.percentile(50.0),
            self.percentile(90.0),
            self.percentile(99.0),
        )
    }
}

/// Terminal progress for a running load; draws nothing in quiet mode
pub struct LoadProgress {
    bar: ProgressBar,
}

impl LoadProgress {
    /// Progress over a known number of rows
    pub fn rows(total_rows: u64, quiet: bool) -> Self {
        let bar = Self::bar(total_rows, quiet);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "[{elapsed_precise}] Rows: [{bar:30.green/blue}] {human_pos}/{human_len} ({percent}%) | {per_sec}",
        ) {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self { bar }
    }

    /// Progress over the bytes of a streamed file
    pub fn bytes(total_bytes: u64, quiet: bool) -> Self {
        let bar = Self::bar(total_bytes, quiet);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "[{elapsed_precise}] Bytes: [{bar:30.yellow/blue}] {bytes}/{total_bytes} ({percent}%) | {bytes_per_sec}",
        ) {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self { bar }
    }

    fn bar(len: u64, quiet: bool) -> ProgressBar {
        if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::with_draw_target(
                Some(len),
                ProgressDrawTarget::stderr_with_hz(PROGRESS_REFRESH_HZ),
            )
        }
    }

    pub fn advance(&self, delta: u64) {
        self.bar.inc(delta);
    }

    pub fn finish(&self) {
        self.bar.finish();
    }

    /// Leave the bar where it stopped, for failed loads
    pub fn abandon(&self) {
        self.bar.abandon();
    }
}
