use gft_core::session::{Progress, Tick};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// indicatif-backed progress; every bar is hidden in quiet mode.
pub struct Bars {
    hidden: bool,
}

impl Bars {
    pub fn new(hidden: bool) -> Self {
        Self { hidden }
    }

    fn make(&self, label: &str, total: u64, template: &str) -> ProgressBar {
        if self.hidden {
            return ProgressBar::hidden();
        }
        let pb = if total == 0 {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::with_template(template)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
            );
            pb
        };
        pb.set_prefix(label.to_string());
        pb
    }
}

struct BarTick(ProgressBar);

impl Tick for BarTick {
    fn inc(&self, n: u64) {
        self.0.inc(n);
    }
    fn finish(&self) {
        self.0.finish_and_clear();
    }
}

impl Progress for Bars {
    fn batch(&self, label: &str, total: u64) -> Box<dyn Tick> {
        Box::new(BarTick(self.make(
            label,
            total,
            "{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len}",
        )))
    }

    fn bytes(&self, label: &str, total: u64) -> Box<dyn Tick> {
        Box::new(BarTick(self.make(
            label,
            total,
            "{prefix:.bold} [{bar:40.cyan/blue}] {binary_bytes}/{binary_total_bytes} {binary_bytes_per_sec}",
        )))
    }
}
