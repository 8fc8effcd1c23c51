use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Arc, Mutex};

/// Callback receiving an integer percentage in `0..=100`
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// A callback that drops every update
pub fn noop() -> ProgressFn {
    Arc::new(|_| {})
}

/// Turns raw progress readings into a clean percentage stream.
///
/// Readings are clamped to `0..=100`, anything lower than what was already
/// reported is swallowed, and duplicates are not re-emitted. `finish` always
/// leaves the observer at 100.
pub struct ProgressTracker {
    last: Mutex<Option<u8>>,
    sink: ProgressFn,
}

impl ProgressTracker {
    pub fn new(sink: ProgressFn) -> Self {
        Self {
            last: Mutex::new(None),
            sink,
        }
    }

    /// Report the starting point (0)
    pub fn start(&self) {
        self.report(0);
    }

    /// Report a fraction in `[0, 1]`; out of range and NaN readings are clamped
    pub fn report_fraction(&self, fraction: f64) {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        self.report((fraction * 100.0).round() as u8);
    }

    /// Report `done` out of `total` units
    pub fn report_ratio(&self, done: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = (done.min(total) as u128 * 100 / total as u128) as u8;
        self.report(percent);
    }

    /// Emit 100 unless it has already been observed
    pub fn finish(&self) {
        self.report(100);
    }

    /// Last percentage delivered to the sink
    pub fn last(&self) -> Option<u8> {
        *self.last.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn report(&self, percent: u8) {
        let percent = percent.min(100);
        {
            let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
            if matches!(*last, Some(prev) if prev >= percent) {
                return;
            }
            *last = Some(percent);
        }
        (self.sink)(percent);
    }
}

/// Percentage bar used by the CLI for transcode and upload phases
pub fn percent_bar(message: &'static str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.set_message(message);
    bar
}

/// Spinner for requests without measurable progress
pub fn spinner(message: &'static str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));
    spinner
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> (ProgressFn, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: ProgressFn = Arc::new(move |p| sink_seen.lock().unwrap().push(p));
        (sink, seen)
    }

    #[test]
    fn test_tracker_is_monotonic_and_bounded() {
        let (sink, seen) = recording();
        let tracker = ProgressTracker::new(sink);

        tracker.start();
        tracker.report_fraction(0.25);
        tracker.report_fraction(0.10);
        tracker.report_fraction(0.25);
        tracker.report_fraction(7.0);
        tracker.report_fraction(-1.0);
        tracker.finish();

        assert_eq!(*seen.lock().unwrap(), vec![0, 25, 100]);
    }

    #[test]
    fn test_tracker_ratio() {
        let (sink, seen) = recording();
        let tracker = ProgressTracker::new(sink);

        tracker.report_ratio(0, 0);
        tracker.report_ratio(1, 3);
        tracker.report_ratio(2, 3);
        tracker.report_ratio(5, 3);
        tracker.finish();

        assert_eq!(*seen.lock().unwrap(), vec![33, 66, 100]);
        assert_eq!(tracker.last(), Some(100));
    }

    #[test]
    fn test_finish_without_readings_still_reaches_100() {
        let (sink, seen) = recording();
        let tracker = ProgressTracker::new(sink);
        tracker.report_fraction(f64::NAN);
        tracker.finish();
        assert_eq!(*seen.lock().unwrap(), vec![0, 100]);
    }
}
