//! Progress reporting and cooperative cancellation.
//!
//! Batch operations poll [`Feedback::is_cancelled`] once per outer iteration
//! and return whatever they have gathered so far when it flips.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use crate::error::RecordWarning;

pub trait Feedback {
    /// Report progress in percent (0-100)
    fn set_progress(&self, percent: u8);

    fn is_cancelled(&self) -> bool;

    fn record_warning(&self, warning: &RecordWarning) {
        warn!("Skipping {}", warning);
    }
}

/// Percentage of `done` out of `total`, scaled into `[from, to]`
pub fn scaled_percent(done: usize, total: usize, from: u8, to: u8) -> u8 {
    if total == 0 {
        return to;
    }
    let span = to.saturating_sub(from) as f64;
    let frac = (done as f64 / total as f64).clamp(0.0, 1.0);
    from + (frac * span) as u8
}

/// Never cancels and discards progress
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl Feedback for Silent {
    fn set_progress(&self, _percent: u8) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shared cancel flag that also remembers the last reported progress
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
    progress: Arc<AtomicU8>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }
}

impl Feedback for CancelFlag {
    fn set_progress(&self, percent: u8) {
        self.progress.store(percent.min(100), Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Terminal progress bar for the command-line tool
pub struct ProgressBarFeedback {
    bar: ProgressBar,
    cancel: CancelFlag,
}

impl ProgressBarFeedback {
    pub fn new(message: &str, cancel: CancelFlag) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_message(message.to_string());
        Self { bar, cancel }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Feedback for ProgressBarFeedback {
    fn set_progress(&self, percent: u8) {
        self.bar.set_position(percent.min(100) as u64);
        self.cancel.set_progress(percent);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn record_warning(&self, warning: &RecordWarning) {
        self.bar.suspend(|| warn!("Skipping {}", warning));
    }
}

/// Reports "not cancelled" for the first `polls` checks, then cancels
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct CancelAfter {
    remaining: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl CancelAfter {
    pub(crate) fn new(polls: usize) -> Self {
        Self {
            remaining: std::sync::atomic::AtomicUsize::new(polls),
        }
    }
}

#[cfg(test)]
impl Feedback for CancelAfter {
    fn set_progress(&self, _percent: u8) {}

    fn is_cancelled(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_percent() {
        assert_eq!(scaled_percent(0, 10, 0, 100), 0);
        assert_eq!(scaled_percent(5, 10, 0, 100), 50);
        assert_eq!(scaled_percent(10, 10, 40, 70), 70);
        assert_eq!(scaled_percent(0, 0, 0, 40), 40);
    }

    #[test]
    fn test_cancel_flag_shared() {
        let flag = CancelFlag::new();
        let handle = flag.clone();
        assert!(!flag.is_cancelled());
        handle.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_cancel_flag_from_handler_thread() {
        let flag = CancelFlag::new();
        let handle = flag.clone();
        std::thread::spawn(move || handle.cancel()).join().unwrap();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_cancel_after_counts_polls() {
        let feedback = CancelAfter::new(2);
        assert!(!feedback.is_cancelled());
        assert!(!feedback.is_cancelled());
        assert!(feedback.is_cancelled());
        assert!(feedback.is_cancelled());
    }

    #[test]
    fn test_cancel_flag_progress_clamped() {
        let flag = CancelFlag::new();
        flag.set_progress(150);
        assert_eq!(flag.progress(), 100);
    }
}
