//! Live progress bar for a draining stage.
//!
//! One bar per stage, advanced once per drained outcome, with a status line
//! showing successes, failures, live P95 latency and running workers. Drawn
//! on stderr; indicatif hides it when stderr is not a terminal.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::loadtest::metrics::LiveSnapshot;

const BAR_TEMPLATE: &str =
    "{spinner:.cyan} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {wide_msg}";

/// Progress bar tracking outcomes drained for one stage.
pub struct StageProgress {
    bar: ProgressBar,
    label: String,
}

impl StageProgress {
    /// Create a bar expecting `total` outcomes.
    pub fn new(total: u64, label: &str) -> Self {
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .progress_chars("=> ");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar,
            label: label.to_string(),
        }
    }

    /// Format the status message shown right of the bar.
    ///
    /// Failures are red once non-zero; a P95 above one second is yellow.
    pub fn format_status(label: &str, snap: &LiveSnapshot, active_workers: u32) -> String {
        let ok = snap.completed - snap.failures;
        let failed = if snap.failures > 0 {
            snap.failures.to_string().red().to_string()
        } else {
            snap.failures.to_string()
        };
        let p95 = format!("{}ms", snap.p95_ms);
        let p95 = if snap.p95_ms > 1000 {
            p95.yellow().to_string()
        } else {
            p95.green().to_string()
        };
        format!(
            "[{label}]  ok: {}  |  failed: {failed}  |  p95: {p95}  |  workers: {active_workers}",
            ok.to_string().green()
        )
    }

    /// Advance by one outcome and refresh the status line.
    pub fn advance(&self, snap: &LiveSnapshot, active_workers: u32) {
        self.bar.inc(1);
        self.bar
            .set_message(Self::format_status(&self.label, snap, active_workers));
    }

    /// Remove the bar from the terminal.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
