//! Maps playback time onto the active span.

use crate::timeline::Timeline;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Trailing-edge throttle.
///
/// The first offer opens a window; later offers inside it replace the
/// pending value. When the window closes the last value fires exactly once.
#[derive(Debug)]
pub struct Throttle<T> {
    interval: Duration,
    deadline: Option<Instant>,
    pending: Option<T>,
}

impl<T> Throttle<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
            pending: None,
        }
    }

    /// Queue `value`. Returns the deadline when this call opened a window.
    pub fn offer(&mut self, now: Instant, value: T) -> Option<Instant> {
        self.pending = Some(value);
        if self.deadline.is_some() {
            return None;
        }
        let deadline = now + self.interval;
        self.deadline = Some(deadline);
        Some(deadline)
    }

    /// Take the pending value if its window has closed.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.pending.take()
            }
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.deadline = None;
        self.pending = None;
    }
}

#[derive(Debug)]
pub struct ClockTracker {
    current: Option<usize>,
    last: Option<usize>,
    throttle: Throttle<f64>,
}

impl ClockTracker {
    pub fn new(throttle_interval: Duration) -> Self {
        Self {
            current: None,
            last: None,
            throttle: Throttle::new(throttle_interval),
        }
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn last(&self) -> Option<usize> {
        self.last
    }

    pub fn throttle_mut(&mut self) -> &mut Throttle<f64> {
        &mut self.throttle
    }

    /// Scan the timeline for `time`. Returns the new index on a transition.
    ///
    /// Time in a gap between spans keeps the previous span current.
    pub fn evaluate(&mut self, timeline: &Timeline, time: f64) -> Option<usize> {
        let index = timeline.find_active(time)?;
        if self.current == Some(index) {
            return None;
        }
        self.activate(index);
        debug!(index, time, "Current sentence changed");
        Some(index)
    }

    /// Make `index` current unconditionally, shifting the previous one.
    pub fn activate(&mut self, index: usize) {
        if self.current != Some(index) {
            self.last = self.current;
        }
        self.current = Some(index);
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.last = None;
        self.throttle.reset();
    }
}
