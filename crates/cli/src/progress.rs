//! Terminal progress bars for merge runs.

use std::cell::RefCell;

use indicatif::{ProgressBar, ProgressStyle};

use sitemerge_core::merge::{Phase, ProgressSink};

/// One `indicatif` bar per merge phase.
#[derive(Default)]
pub struct BarProgress {
    bar: RefCell<Option<ProgressBar>>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Reconcile => "Merging",
        Phase::Cleanup => "Cleaning up",
    }
}

impl ProgressSink for BarProgress {
    fn begin(&self, phase: Phase, total: usize) {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template("{prefix:>12.cyan.bold} [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_prefix(phase_label(phase));
        *self.bar.borrow_mut() = Some(bar);
    }

    fn advance(&self, _phase: Phase, completed: usize, _total: usize) {
        if let Some(bar) = self.bar.borrow().as_ref() {
            bar.set_position(completed as u64);
        }
    }

    fn finish(&self, _phase: Phase) {
        if let Some(bar) = self.bar.borrow_mut().take() {
            bar.finish();
        }
    }
}

impl Drop for BarProgress {
    fn drop(&mut self) {
        // An aborted phase never reaches `finish`.
        if let Some(bar) = self.bar.get_mut().take() {
            bar.abandon();
        }
    }
}
