//! Batched translation of timeline spans.

use crate::audio::SentenceAudio;
use crate::error::TranslationError;
use crate::events::{EventBus, SessionEvent};
use crate::scheduler::{BackoffPolicy, InFlight, RetryLedger};
use crate::timeline::Timeline;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;
use tracing::{info, warn};

/// Session context sent along with every batch to bias translation quality.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationContext {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationOutput {
    pub texts: Vec<String>,
    pub total_tokens: Option<u64>,
}

#[async_trait]
pub trait Translator: Send + Sync {
    /// Must return one text per input, in order.
    async fn translate_batch(
        &self,
        texts: &[String],
        context: &TranslationContext,
    ) -> Result<TranslationOutput, TranslationError>;
}

/// One dispatched translation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationBatch {
    pub indices: Vec<usize>,
    pub texts: Vec<String>,
}

/// Result of applying a successful batch.
#[derive(Debug, Default)]
pub struct AppliedTranslation {
    pub indices: Vec<usize>,
    /// Audio that no longer matches its span's text.
    pub invalidated: Vec<Arc<SentenceAudio>>,
}

pub struct TranslationPipeline {
    in_flight: InFlight,
    retry: RetryLedger,
    tokens_used: Arc<AtomicU64>,
}

impl TranslationPipeline {
    pub fn new(policy: BackoffPolicy, tokens_used: Arc<AtomicU64>) -> Self {
        Self {
            in_flight: InFlight::new(),
            retry: RetryLedger::new(policy),
            tokens_used,
        }
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    pub fn retry(&self) -> &RetryLedger {
        &self.retry
    }

    pub fn tokens_used(&self) -> u64 {
        self.tokens_used.load(Ordering::Relaxed)
    }

    /// Mark `indices` pending and build the outgoing batch.
    ///
    /// Spans that are already final or already in flight are skipped; `None`
    /// when nothing is left to send.
    pub fn begin(
        &mut self,
        timeline: &mut Timeline,
        indices: &[usize],
        events: &EventBus,
    ) -> Option<TranslationBatch> {
        let mut batch = TranslationBatch {
            indices: Vec::with_capacity(indices.len()),
            texts: Vec::with_capacity(indices.len()),
        };
        for &index in indices {
            if self.in_flight.contains(index) || batch.indices.contains(&index) {
                continue;
            }
            let Some(sentence) = timeline.get(index) else {
                continue;
            };
            if sentence.translation().is_final() {
                continue;
            }
            let source = sentence.source_text.clone();
            timeline.mark_pending(index);
            batch.indices.push(index);
            batch.texts.push(source);
        }
        if batch.indices.is_empty() {
            return None;
        }
        self.in_flight.insert_all(&batch.indices);
        info!(indices = ?batch.indices, "Dispatching translation batch");
        events.emit(SessionEvent::TranslateSentencesStart(batch.indices.clone()));
        Some(batch)
    }

    /// Apply a finished batch. A malformed or failed response rejects the
    /// whole batch and leaves the spans pending.
    pub fn complete(
        &mut self,
        timeline: &mut Timeline,
        batch: &TranslationBatch,
        outcome: Result<TranslationOutput, TranslationError>,
        events: &EventBus,
        now: Instant,
    ) -> Result<AppliedTranslation, TranslationError> {
        self.in_flight.remove_all(&batch.indices);

        let outcome = outcome.and_then(|output| {
            if let Some(tokens) = output.total_tokens.filter(|tokens| *tokens > 0) {
                let total = self.tokens_used.fetch_add(tokens, Ordering::Relaxed) + tokens;
                info!(tokens, total, "Translator token usage");
                events.emit(SessionEvent::TokenUsageChange);
            }
            if output.texts.len() != batch.indices.len() {
                return Err(TranslationError::LengthMismatch {
                    expected: batch.indices.len(),
                    actual: output.texts.len(),
                });
            }
            Ok(output.texts)
        });

        let texts = match outcome {
            Ok(texts) => texts,
            Err(err) => {
                warn!(indices = ?batch.indices, "Translation batch failed: {err}");
                self.retry.record_failure(&batch.indices, now);
                events.emit(SessionEvent::TranslateSentencesFailed {
                    indices: batch.indices.clone(),
                    reason: err.to_string(),
                });
                return Err(err);
            }
        };

        self.retry.record_success(&batch.indices);
        let mut applied = AppliedTranslation::default();
        for (&index, text) in batch.indices.iter().zip(texts) {
            if index >= timeline.len() {
                continue;
            }
            if let Some(stale) = timeline.set_translation(index, text) {
                applied.invalidated.push(stale);
            }
            applied.indices.push(index);
            events.emit(SessionEvent::TranslateSentenceChange(index));
        }
        info!(count = applied.indices.len(), "Applied translation batch");
        events.emit(SessionEvent::TranslateSentencesEnd(batch.indices.clone()));
        Ok(applied)
    }

    pub fn clear(&mut self) {
        self.in_flight.clear();
        self.retry.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::timeline::{Sentence, Translation};
    use std::time::Duration;

    fn pipeline() -> TranslationPipeline {
        TranslationPipeline::new(
            BackoffPolicy {
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(60),
            },
            Arc::new(AtomicU64::new(0)),
        )
    }

    fn scenario() -> Timeline {
        Timeline::new(vec![
            Sentence::new(0.0, 2.0, "Hi."),
            Sentence::new(2.0, 5.0, "Bye."),
        ])
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn begin_sets_placeholders_before_any_io() {
        let mut timeline = scenario();
        let bus = EventBus::new();
        let mut rx = bus.subscribe_all();
        let mut pipeline = pipeline();

        let batch = pipeline
            .begin(&mut timeline, &[0, 1], &bus)
            .expect("two untranslated spans should dispatch");
        assert_eq!(batch.texts, vec!["Hi.".to_string(), "Bye.".to_string()]);
        assert!(timeline.iter().all(|s| *s.translation() == Translation::Pending));
        assert!(pipeline.in_flight().contains(0));
        assert_eq!(drain(&mut rx), vec![SessionEvent::TranslateSentencesStart(vec![0, 1])]);

        assert!(pipeline.begin(&mut timeline, &[0, 1], &bus).is_none());
    }

    #[test]
    fn successful_batch_writes_back_in_order() {
        let mut timeline = scenario();
        let bus = EventBus::new();
        let mut pipeline = pipeline();
        let batch = pipeline
            .begin(&mut timeline, &[0, 1], &bus)
            .expect("batch should dispatch");
        let mut rx = bus.subscribe(&[
            EventKind::TranslateSentenceChange,
            EventKind::TranslateSentencesEnd,
            EventKind::TokenUsageChange,
        ]);

        let applied = pipeline
            .complete(
                &mut timeline,
                &batch,
                Ok(TranslationOutput {
                    texts: vec!["嗨".to_string(), "再见".to_string()],
                    total_tokens: Some(42),
                }),
                &bus,
                Instant::now(),
            )
            .expect("well-formed response should apply");

        assert_eq!(applied.indices, vec![0, 1]);
        assert_eq!(timeline.get(0).and_then(|s| s.translation().final_text()), Some("嗨"));
        assert_eq!(timeline.get(1).and_then(|s| s.translation().final_text()), Some("再见"));
        assert_eq!(
            drain(&mut rx),
            vec![
                SessionEvent::TokenUsageChange,
                SessionEvent::TranslateSentenceChange(0),
                SessionEvent::TranslateSentenceChange(1),
                SessionEvent::TranslateSentencesEnd(vec![0, 1]),
            ]
        );
        assert_eq!(pipeline.tokens_used(), 42);
        assert!(pipeline.in_flight().is_empty());
    }

    #[test]
    fn length_mismatch_rejects_whole_batch() {
        let mut timeline = scenario();
        let bus = EventBus::new();
        let mut pipeline = pipeline();
        let batch = pipeline
            .begin(&mut timeline, &[0, 1], &bus)
            .expect("batch should dispatch");
        let mut rx = bus.subscribe(&[EventKind::TranslateSentencesFailed]);
        let now = Instant::now();

        let err = pipeline
            .complete(
                &mut timeline,
                &batch,
                Ok(TranslationOutput {
                    texts: vec!["嗨".to_string()],
                    total_tokens: None,
                }),
                &bus,
                now,
            )
            .expect_err("short response should be rejected");

        assert!(matches!(
            err,
            TranslationError::LengthMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert!(timeline.iter().all(|s| *s.translation() == Translation::Pending));
        assert!(pipeline.retry().is_backing_off(0, now));
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [SessionEvent::TranslateSentencesFailed { indices, .. }] if indices == &vec![0, 1]
        ));
    }

    #[test]
    fn final_spans_are_skipped_at_dispatch() {
        let mut timeline = Timeline::new(vec![
            Sentence::new(0.0, 2.0, "Hi.").with_translation("嗨"),
            Sentence::new(2.0, 5.0, "Bye."),
        ]);
        let bus = EventBus::new();
        let mut pipeline = pipeline();
        let batch = pipeline
            .begin(&mut timeline, &[0, 1, 1, 9], &bus)
            .expect("one span still needs translation");
        assert_eq!(batch.indices, vec![1]);
    }
}
