//! Lookahead demand for translation and dubbing.
//!
//! Both demand functions look at `[current, min(current + 2 * window, last)]`.
//! Small rounds are deferred until enough candidates accumulate, unless the
//! window already touches the end of the timeline.

use crate::timeline::{Sentence, Timeline};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::time::Instant;

/// Indices with a request currently running in one pipeline.
#[derive(Debug, Default, Clone)]
pub struct InFlight {
    indices: BTreeSet<usize>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    pub fn insert_all(&mut self, indices: &[usize]) {
        self.indices.extend(indices.iter().copied());
    }

    pub fn remove_all(&mut self, indices: &[usize]) {
        for index in indices {
            self.indices.remove(index);
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn clear(&mut self) {
        self.indices.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl BackoffPolicy {
    /// `base * 2^(failures - 1)`, capped.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy)]
struct RetryEntry {
    failures: u32,
    not_before: Instant,
}

/// Per-index failure memory for the translation pipeline.
#[derive(Debug)]
pub struct RetryLedger {
    policy: BackoffPolicy,
    entries: HashMap<usize, RetryEntry>,
}

impl RetryLedger {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
        }
    }

    pub fn record_failure(&mut self, indices: &[usize], now: Instant) {
        for &index in indices {
            let failures = self
                .entries
                .get(&index)
                .map_or(1, |entry| entry.failures.saturating_add(1));
            let not_before = now + self.policy.delay_for(failures);
            self.entries.insert(index, RetryEntry { failures, not_before });
        }
    }

    pub fn record_success(&mut self, indices: &[usize]) {
        for index in indices {
            self.entries.remove(index);
        }
    }

    pub fn is_backing_off(&self, index: usize, now: Instant) -> bool {
        self.entries
            .get(&index)
            .is_some_and(|entry| now < entry.not_before)
    }

    pub fn failures(&self, index: usize) -> u32 {
        self.entries.get(&index).map_or(0, |entry| entry.failures)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Collect qualifying indices in the lookahead window, applying the
/// batching-skip policy. `None` means "nothing to dispatch this round".
fn window_demand(
    timeline: &Timeline,
    current: Option<usize>,
    window: usize,
    qualifies: impl Fn(usize, &Sentence) -> bool,
) -> Option<Vec<usize>> {
    if window == 0 {
        return None;
    }
    let current = current?;
    let range = timeline.lookahead(current, window)?;
    let reaches_end = timeline.reaches_end(&range);
    let indices: Vec<usize> = range
        .filter(|&index| timeline.get(index).is_some_and(|s| qualifies(index, s)))
        .collect();
    if indices.len() < window && !reaches_end {
        return None;
    }
    if indices.is_empty() {
        return None;
    }
    Some(indices)
}

/// Spans in the window still lacking a final translation.
pub fn translation_demand(
    timeline: &Timeline,
    current: Option<usize>,
    window: usize,
    in_flight: &InFlight,
    retry: &RetryLedger,
    now: Instant,
) -> Option<Vec<usize>> {
    window_demand(timeline, current, window, |index, sentence| {
        !sentence.translation().is_final()
            && !in_flight.contains(index)
            && !retry.is_backing_off(index, now)
    })
}

/// Spans in the window with missing or stale audio.
///
/// Spans whose translation is in flight wait for the new text.
pub fn dub_demand(
    timeline: &Timeline,
    current: Option<usize>,
    window: usize,
    dub_in_flight: &InFlight,
    translation_in_flight: &InFlight,
) -> Option<Vec<usize>> {
    window_demand(timeline, current, window, |index, sentence| {
        sentence.dub_text().is_some()
            && (sentence.audio().is_none() || sentence.audio_is_stale())
            && !dub_in_flight.contains(index)
            && !translation_in_flight.contains(index)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SentenceAudio;
    use std::sync::Arc;

    fn timeline(count: usize) -> Timeline {
        Timeline::new(
            (0..count)
                .map(|i| Sentence::new(i as f64, i as f64 + 1.0, format!("Line {i}.")))
                .collect(),
        )
    }

    fn ledger() -> RetryLedger {
        RetryLedger::new(BackoffPolicy {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        })
    }

    #[test]
    fn zero_window_disables_demand() {
        let timeline = timeline(10);
        let now = Instant::now();
        assert_eq!(
            translation_demand(&timeline, Some(0), 0, &InFlight::new(), &ledger(), now),
            None
        );
        assert_eq!(
            translation_demand(&timeline, None, 3, &InFlight::new(), &ledger(), now),
            None
        );
    }

    #[test]
    fn full_window_dispatches_all_missing() {
        let timeline = timeline(10);
        let demand = translation_demand(
            &timeline,
            Some(2),
            3,
            &InFlight::new(),
            &ledger(),
            Instant::now(),
        );
        assert_eq!(demand, Some(vec![2, 3, 4, 5, 6, 7, 8]));
    }

    #[test]
    fn small_rounds_are_deferred_until_the_window_reaches_the_end() {
        // Window of 3 from index 0 covers 0..=6; only two spans lack text.
        let mut spans: Vec<Sentence> = (0..10)
            .map(|i| Sentence::new(i as f64, i as f64 + 1.0, format!("Line {i}.")).with_translation("译"))
            .collect();
        spans[4] = Sentence::new(4.0, 5.0, "Line 4.");
        spans[5] = Sentence::new(5.0, 6.0, "Line 5.");
        let timeline = Timeline::new(spans);
        let now = Instant::now();
        assert_eq!(
            translation_demand(&timeline, Some(0), 3, &InFlight::new(), &ledger(), now),
            None
        );

        // Shortening the timeline so the window touches the end releases the batch.
        let mut spans: Vec<Sentence> = (0..7)
            .map(|i| Sentence::new(i as f64, i as f64 + 1.0, format!("Line {i}.")).with_translation("译"))
            .collect();
        spans[4] = Sentence::new(4.0, 5.0, "Line 4.");
        spans[5] = Sentence::new(5.0, 6.0, "Line 5.");
        let timeline = Timeline::new(spans);
        assert_eq!(
            translation_demand(&timeline, Some(0), 3, &InFlight::new(), &ledger(), now),
            Some(vec![4, 5])
        );
    }

    #[test]
    fn in_flight_and_backing_off_indices_count_as_covered() {
        let timeline = timeline(4);
        let now = Instant::now();
        let mut in_flight = InFlight::new();
        in_flight.insert_all(&[0, 1]);
        let mut retry = ledger();
        retry.record_failure(&[2], now);

        assert_eq!(
            translation_demand(&timeline, Some(0), 2, &in_flight, &retry, now),
            Some(vec![3])
        );
        assert_eq!(
            translation_demand(
                &timeline,
                Some(0),
                2,
                &in_flight,
                &retry,
                now + Duration::from_secs(3)
            ),
            Some(vec![2, 3])
        );
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = BackoffPolicy {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));

        let mut retry = RetryLedger::new(policy);
        let now = Instant::now();
        retry.record_failure(&[7], now);
        retry.record_failure(&[7], now);
        assert_eq!(retry.failures(7), 2);
        assert!(retry.is_backing_off(7, now + Duration::from_secs(3)));
        retry.record_success(&[7]);
        assert!(!retry.is_backing_off(7, now));
    }

    #[test]
    fn dub_demand_picks_missing_and_stale_audio() {
        let mut timeline = Timeline::new(vec![
            Sentence::new(0.0, 1.0, "A.").with_translation("甲"),
            Sentence::new(1.0, 2.0, "B.").with_translation("乙"),
            Sentence::new(2.0, 3.0, "C."),
            Sentence::new(3.0, 4.0, "D.").with_reference("丁"),
        ]);
        timeline.bind_audio(0, Arc::new(SentenceAudio::new(0.0, 1.0, "甲")));
        timeline.bind_audio(1, Arc::new(SentenceAudio::new(1.0, 2.0, "旧")));

        let demand = dub_demand(&timeline, Some(0), 2, &InFlight::new(), &InFlight::new());
        assert_eq!(demand, Some(vec![1, 3]));

        let mut translating = InFlight::new();
        translating.insert_all(&[3]);
        let demand = dub_demand(&timeline, Some(0), 2, &InFlight::new(), &translating);
        assert_eq!(demand, Some(vec![1]));
    }
}
