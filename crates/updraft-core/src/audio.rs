//! Synthesized speech bound to a single span.
//!
//! A [`SentenceAudio`] moves through `Uninitialized -> Generating ->
//! {Ready, Failed}`. Generation runs at most once per instance: concurrent
//! callers share one in-flight future. `Failed` is terminal; retrying means
//! constructing a new instance.

use crate::error::SynthesisError;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// A playable audio asset produced by a synthesizer.
pub trait AudioAsset: Send + Sync {
    fn duration(&self) -> Duration;
    fn set_playback_rate(&self, rate: f32);
    /// Resume from the current position.
    fn play(&self);
    fn pause(&self);
    /// Rewind to the beginning and play.
    fn restart(&self);
    /// The clip has played through to its end.
    fn is_finished(&self) -> bool;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Box<dyn AudioAsset>, SynthesisError>;
}

/// Observable lifecycle of a [`SentenceAudio`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioPhase {
    Uninitialized,
    Generating,
    Ready,
    Playing,
    /// Played through to the end; stays here until played again.
    Ended,
    Paused,
    Failed,
}

type SharedGeneration = Shared<BoxFuture<'static, Result<Arc<dyn AudioAsset>, SynthesisError>>>;

enum AudioState {
    Uninitialized,
    Generating(SharedGeneration),
    Ready {
        asset: Arc<dyn AudioAsset>,
        rate: f32,
        playback: Playback,
    },
    Failed(SynthesisError),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Playback {
    Idle,
    Playing,
    Paused,
}

pub struct SentenceAudio {
    start: f64,
    end: f64,
    text: String,
    state: Mutex<AudioState>,
}

impl std::fmt::Debug for SentenceAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentenceAudio")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("text", &self.text)
            .field("phase", &self.phase())
            .finish()
    }
}

impl SentenceAudio {
    /// `start`/`end` are copied from the span: the slot the speech must fit.
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            state: Mutex::new(AudioState::Uninitialized),
        }
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn slot_secs(&self) -> f64 {
        self.end - self.start
    }

    pub fn generated(&self) -> bool {
        matches!(&*self.lock(), AudioState::Ready { .. })
    }

    pub fn phase(&self) -> AudioPhase {
        match &*self.lock() {
            AudioState::Uninitialized => AudioPhase::Uninitialized,
            AudioState::Generating(_) => AudioPhase::Generating,
            AudioState::Ready {
                asset, playback, ..
            } => match playback {
                Playback::Playing if asset.is_finished() => AudioPhase::Ended,
                Playback::Idle => AudioPhase::Ready,
                Playback::Playing => AudioPhase::Playing,
                Playback::Paused => AudioPhase::Paused,
            },
            AudioState::Failed(_) => AudioPhase::Failed,
        }
    }

    /// Rate applied at generation completion; `None` until ready.
    pub fn playback_rate(&self) -> Option<f32> {
        match &*self.lock() {
            AudioState::Ready { rate, .. } => Some(*rate),
            _ => None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.phase() == AudioPhase::Playing
    }

    /// Generate the asset, performing the synthesis call at most once.
    pub async fn generate(
        &self,
        synthesizer: &Arc<dyn SpeechSynthesizer>,
    ) -> Result<(), SynthesisError> {
        let generation = {
            let mut state = self.lock();
            match &*state {
                AudioState::Ready { .. } => return Ok(()),
                AudioState::Failed(err) => return Err(err.clone()),
                AudioState::Generating(shared) => shared.clone(),
                AudioState::Uninitialized => {
                    if self.text.trim().is_empty() {
                        *state = AudioState::Failed(SynthesisError::EmptyText);
                        return Err(SynthesisError::EmptyText);
                    }
                    let synthesizer = Arc::clone(synthesizer);
                    let text = self.text.clone();
                    let shared = async move {
                        synthesizer
                            .synthesize(&text)
                            .await
                            .map(Arc::<dyn AudioAsset>::from)
                    }
                    .boxed()
                    .shared();
                    *state = AudioState::Generating(shared.clone());
                    shared
                }
            }
        };

        let outcome = generation.await;

        let mut state = self.lock();
        if matches!(&*state, AudioState::Generating(_)) {
            match &outcome {
                Ok(asset) => {
                    let rate = fit_playback_rate(asset.duration(), self.slot_secs());
                    asset.set_playback_rate(rate);
                    debug!(
                        start = self.start,
                        duration_ms = asset.duration().as_millis() as u64,
                        rate,
                        "Generated sentence audio"
                    );
                    *state = AudioState::Ready {
                        asset: Arc::clone(asset),
                        rate,
                        playback: Playback::Idle,
                    };
                }
                Err(err) => {
                    warn!(start = self.start, "Sentence audio generation failed: {err}");
                    *state = AudioState::Failed(err.clone());
                }
            }
        }
        outcome.map(|_| ())
    }

    /// Admission rule near the start of the span: audio joined late is skipped.
    pub fn should_play(&self, time: f64, admission_window_secs: f64) -> bool {
        time > self.start && (time - self.start) < admission_window_secs
    }

    /// Resume where playback stopped; a clip that already ended starts over.
    pub fn play(&self) {
        if let AudioState::Ready {
            asset, playback, ..
        } = &mut *self.lock()
        {
            debug!(start = self.start, text = %self.text, "Playing sentence audio");
            if asset.is_finished() {
                asset.restart();
            } else {
                asset.play();
            }
            *playback = Playback::Playing;
        }
    }

    /// Play from the beginning of the clip.
    pub fn restart(&self) {
        if let AudioState::Ready {
            asset, playback, ..
        } = &mut *self.lock()
        {
            debug!(start = self.start, text = %self.text, "Replaying sentence audio");
            asset.restart();
            *playback = Playback::Playing;
        }
    }

    pub fn pause(&self) {
        if let AudioState::Ready {
            asset, playback, ..
        } = &mut *self.lock()
        {
            if *playback == Playback::Playing && !asset.is_finished() {
                asset.pause();
                *playback = Playback::Paused;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, AudioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Speed up audio that overruns its slot; never slow down to fill one.
pub fn fit_playback_rate(duration: Duration, slot_secs: f64) -> f32 {
    let duration_secs = duration.as_secs_f64();
    if slot_secs <= 0.0 || duration_secs <= slot_secs {
        return 1.0;
    }
    (duration_secs / slot_secs) as f32
}
