//! In-memory collaborators for unit tests.

use crate::audio::{AudioAsset, SpeechSynthesizer};
use crate::error::{SynthesisError, TranslationError};
use crate::providers::PlayheadClock;
use crate::surface::{CaptionCue, CaptionTrack, VideoSurface};
use crate::translation::{TranslationContext, TranslationOutput, Translator};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every control call; the playhead follows tokio time.
#[derive(Clone)]
pub(crate) struct FakeAsset {
    clock: Arc<Mutex<PlayheadClock>>,
    plays: Arc<AtomicUsize>,
    pauses: Arc<AtomicUsize>,
    restarts: Arc<AtomicUsize>,
}

impl FakeAsset {
    fn new(duration: Duration) -> Self {
        Self {
            clock: Arc::new(Mutex::new(PlayheadClock::new(duration))),
            plays: Arc::default(),
            pauses: Arc::default(),
            restarts: Arc::default(),
        }
    }

    pub(crate) fn rate(&self) -> f32 {
        self.clock.lock().expect("clock lock").rate()
    }

    /// Calls to `play` plus calls to `restart`.
    pub(crate) fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub(crate) fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    pub(crate) fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }
}

impl AudioAsset for FakeAsset {
    fn duration(&self) -> Duration {
        self.clock.lock().expect("clock lock").duration()
    }

    fn set_playback_rate(&self, rate: f32) {
        self.clock.lock().expect("clock lock").set_rate(rate);
    }

    fn play(&self) {
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.clock.lock().expect("clock lock").play();
    }

    fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        self.clock.lock().expect("clock lock").pause();
    }

    fn restart(&self) {
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.restarts.fetch_add(1, Ordering::SeqCst);
        self.clock.lock().expect("clock lock").restart();
    }

    fn is_finished(&self) -> bool {
        self.clock.lock().expect("clock lock").is_finished()
    }
}

/// Tracks how many callers are inside the provider at once.
#[derive(Clone, Default)]
pub(crate) struct Concurrency {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Concurrency {
    fn enter(&self) {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakeSynthesizer {
    duration: Duration,
    delay: Duration,
    fail_all: bool,
    fail_texts: Arc<Mutex<Vec<String>>>,
    calls: Arc<Mutex<Vec<String>>>,
    assets: Arc<Mutex<Vec<(String, FakeAsset)>>>,
    concurrency: Concurrency,
}

impl FakeSynthesizer {
    pub(crate) fn with_duration(duration: Duration) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub(crate) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn fail_text(&self, text: &str) {
        self.fail_texts.lock().expect("fail lock").push(text.to_string());
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(crate) fn last_asset(&self) -> Option<FakeAsset> {
        self.assets
            .lock()
            .expect("assets lock")
            .last()
            .map(|(_, asset)| asset.clone())
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.concurrency.peak()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Box<dyn AudioAsset>, SynthesisError> {
        self.calls.lock().expect("calls lock").push(text.to_string());
        self.concurrency.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.concurrency.leave();
        let fails = self.fail_all
            || self
                .fail_texts
                .lock()
                .expect("fail lock")
                .iter()
                .any(|t| t == text);
        if fails {
            return Err(SynthesisError::Provider(format!("refused: {text}")));
        }
        let asset = FakeAsset::new(self.duration);
        self.assets
            .lock()
            .expect("assets lock")
            .push((text.to_string(), asset.clone()));
        Ok(Box::new(asset))
    }
}

type Responder = dyn Fn(&[String]) -> Result<TranslationOutput, TranslationError> + Send + Sync;

/// Translator answering from a queue of scripted replies, falling back to a
/// default responder.
#[derive(Clone)]
pub(crate) struct FakeTranslator {
    delay: Duration,
    scripted: Arc<Mutex<VecDeque<Result<TranslationOutput, String>>>>,
    fallback: Arc<Responder>,
    calls: Arc<Mutex<Vec<(Vec<String>, TranslationContext)>>>,
    concurrency: Concurrency,
}

impl FakeTranslator {
    /// Replies `"<text>-zh"` for every input.
    pub(crate) fn echo() -> Self {
        Self {
            delay: Duration::ZERO,
            scripted: Arc::default(),
            fallback: Arc::new(|texts: &[String]| -> Result<TranslationOutput, TranslationError> {
                Ok(TranslationOutput {
                    texts: texts.iter().map(|t| format!("{t}-zh")).collect(),
                    total_tokens: Some(10),
                })
            }),
            calls: Arc::default(),
            concurrency: Concurrency::default(),
        }
    }

    pub(crate) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn script(&self, reply: Result<TranslationOutput, String>) {
        self.scripted.lock().expect("script lock").push_back(reply);
    }

    pub(crate) fn calls(&self) -> Vec<(Vec<String>, TranslationContext)> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.concurrency.peak()
    }
}

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate_batch(
        &self,
        texts: &[String],
        context: &TranslationContext,
    ) -> Result<TranslationOutput, TranslationError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((texts.to_vec(), context.clone()));
        self.concurrency.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.concurrency.leave();
        let scripted = self.scripted.lock().expect("script lock").pop_front();
        match scripted {
            Some(Ok(output)) => Ok(output),
            Some(Err(reason)) => Err(TranslationError::Provider(reason)),
            None => (self.fallback)(texts),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeCue {
    text: Mutex<String>,
}

impl FakeCue {
    pub(crate) fn text(&self) -> String {
        self.text.lock().expect("cue lock").clone()
    }
}

impl CaptionCue for FakeCue {
    fn set_text(&self, text: &str) {
        *self.text.lock().expect("cue lock") = text.to_string();
    }
}

#[derive(Default)]
pub(crate) struct FakeTrack {
    cues: Mutex<Vec<Arc<FakeCue>>>,
    showing: AtomicBool,
}

impl FakeTrack {
    pub(crate) fn cue_texts(&self) -> Vec<String> {
        self.cues
            .lock()
            .expect("track lock")
            .iter()
            .map(|cue| cue.text())
            .collect()
    }

    pub(crate) fn is_showing(&self) -> bool {
        self.showing.load(Ordering::SeqCst)
    }
}

impl CaptionTrack for FakeTrack {
    fn add_cue(&self, _start: f64, _end: f64, text: &str) -> Arc<dyn CaptionCue> {
        let cue = Arc::new(FakeCue {
            text: Mutex::new(text.to_string()),
        });
        self.cues.lock().expect("track lock").push(Arc::clone(&cue));
        cue
    }

    fn set_showing(&self, showing: bool) {
        self.showing.store(showing, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct FakeSurface {
    time: Mutex<f64>,
    seeks: Mutex<Vec<f64>>,
    tracks: Mutex<HashMap<String, Arc<FakeTrack>>>,
}

impl FakeSurface {
    pub(crate) fn at(time: f64) -> Self {
        Self {
            time: Mutex::new(time),
            ..Self::default()
        }
    }

    pub(crate) fn seeks(&self) -> Vec<f64> {
        self.seeks.lock().expect("seek lock").clone()
    }

    pub(crate) fn track(&self, label: &str) -> Option<Arc<FakeTrack>> {
        self.tracks.lock().expect("tracks lock").get(label).cloned()
    }
}

impl VideoSurface for FakeSurface {
    fn current_time(&self) -> f64 {
        *self.time.lock().expect("time lock")
    }

    fn seek(&self, time: f64) {
        *self.time.lock().expect("time lock") = time;
        self.seeks.lock().expect("seek lock").push(time);
    }

    fn caption_track(&self, label: &str, _language: &str) -> Arc<dyn CaptionTrack> {
        let track = Arc::clone(
            self.tracks
                .lock()
                .expect("tracks lock")
                .entry(label.to_string())
                .or_default(),
        );
        track
    }
}
