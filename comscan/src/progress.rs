//! Scan progress accounting.

use parking_lot::Mutex;

use crate::identifier::PortIdentifier;

/// Thread-safe counter of processed vs. total discovery targets.
///
/// Each population phase of a record signals once. A target counts as
/// processed when all phases requested for the scan have signalled for it,
/// so `processed_count` and `progress_percent` line up with whole targets
/// whether the scan runs one phase (summary) or two (summary + detailed).
#[derive(Debug)]
pub struct ProgressTracker {
    state: Mutex<ProgressState>,
}

#[derive(Debug)]
struct ProgressState {
    total_targets: usize,
    phases_per_target: usize,
    signals: usize,
    current_target: Option<PortIdentifier>,
}

impl ProgressTracker {
    /// Create a tracker for `total_targets`, each reached through
    /// `phases_per_target` population phases (at least one).
    pub fn new(total_targets: usize, phases_per_target: usize) -> Self {
        Self {
            state: Mutex::new(ProgressState {
                total_targets,
                phases_per_target: phases_per_target.max(1),
                signals: 0,
                current_target: None,
            }),
        }
    }

    /// Record that one population phase finished for `target`.
    pub fn signal(&self, target: &PortIdentifier) {
        let mut state = self.state.lock();
        let ceiling = state.total_targets * state.phases_per_target;
        if state.signals < ceiling {
            state.signals += 1;
        }
        state.current_target = Some(target.clone());
    }

    /// Number of targets discovered for this scan.
    pub fn total_targets(&self) -> usize {
        self.state.lock().total_targets
    }

    /// Number of targets whose every phase has signalled.
    pub fn processed_count(&self) -> usize {
        let state = self.state.lock();
        state.signals / state.phases_per_target
    }

    /// Target named by the most recent signal.
    pub fn current_target(&self) -> Option<PortIdentifier> {
        self.state.lock().current_target.clone()
    }

    /// Completion in percent, `0.0` when there are no targets.
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_percent(&self) -> f64 {
        let state = self.state.lock();
        let steps = state.total_targets * state.phases_per_target;
        if steps == 0 {
            return 0.0;
        }
        state.signals as f64 / steps as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_empty_tracker_reports_zero() {
        let tracker = ProgressTracker::new(0, 1);
        assert_eq!(tracker.progress_percent(), 0.0);
        assert_eq!(tracker.processed_count(), 0);
        assert!(tracker.current_target().is_none());
    }

    #[test]
    fn test_single_phase_progress() {
        let tracker = ProgressTracker::new(4, 1);
        let port = PortIdentifier::new("COM1");

        tracker.signal(&port);
        assert_eq!(tracker.processed_count(), 1);
        assert_eq!(tracker.progress_percent(), 25.0);
        assert_eq!(tracker.current_target(), Some(port));
    }

    #[test]
    fn test_two_phase_counts_whole_targets() {
        let tracker = ProgressTracker::new(2, 2);
        let com1 = PortIdentifier::new("COM1");
        let com3 = PortIdentifier::new("COM3");

        tracker.signal(&com1);
        assert_eq!(tracker.processed_count(), 0);
        assert_eq!(tracker.progress_percent(), 25.0);

        tracker.signal(&com1);
        assert_eq!(tracker.processed_count(), 1);
        assert_eq!(tracker.progress_percent(), 50.0);

        tracker.signal(&com3);
        tracker.signal(&com3);
        assert_eq!(tracker.processed_count(), 2);
        assert_eq!(tracker.progress_percent(), 100.0);
    }

    #[test]
    fn test_extra_signals_do_not_overshoot() {
        let tracker = ProgressTracker::new(1, 1);
        let port = PortIdentifier::new("COM1");
        tracker.signal(&port);
        tracker.signal(&port);
        assert_eq!(tracker.processed_count(), 1);
        assert_eq!(tracker.progress_percent(), 100.0);
    }

    #[test]
    fn test_concurrent_signals_are_counted() {
        let tracker = Arc::new(ProgressTracker::new(64, 1));
        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for i in 0..8 {
                        tracker.signal(&PortIdentifier::new(format!("COM{}", worker * 8 + i)));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(tracker.processed_count(), 64);
        assert_eq!(tracker.progress_percent(), 100.0);
    }
}
