//! Speech without sound, for runs that have no audio device.
//!
//! Clips still report a duration estimated from the text and advance a
//! virtual playhead, so the session treats them like real speech.

use crate::audio::{AudioAsset, SpeechSynthesizer};
use crate::error::SynthesisError;
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Speech stand-in that produces no sound, only an estimated duration.
#[derive(Debug, Clone, Copy)]
pub struct SilentSpeech {
    per_char: Duration,
}

impl Default for SilentSpeech {
    fn default() -> Self {
        Self {
            per_char: Duration::from_millis(180),
        }
    }
}

impl SilentSpeech {
    pub fn new(per_char: Duration) -> Self {
        Self { per_char }
    }

    pub fn estimate(&self, text: &str) -> Duration {
        let chars = text.chars().filter(|c| !c.is_whitespace()).count() as u32;
        self.per_char.saturating_mul(chars)
    }
}

#[async_trait]
impl SpeechSynthesizer for SilentSpeech {
    async fn synthesize(&self, text: &str) -> Result<Box<dyn AudioAsset>, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        Ok(Box::new(SilentAsset {
            text: text.to_string(),
            clock: Mutex::new(PlayheadClock::new(self.estimate(text))),
        }))
    }
}

/// Position of a clip that is not backed by a sound device.
#[derive(Debug)]
pub(crate) struct PlayheadClock {
    duration: Duration,
    rate: f32,
    played: Duration,
    resumed_at: Option<Instant>,
}

impl PlayheadClock {
    pub(crate) fn new(duration: Duration) -> Self {
        Self {
            duration,
            rate: 1.0,
            played: Duration::ZERO,
            resumed_at: None,
        }
    }

    pub(crate) fn set_rate(&mut self, rate: f32) {
        self.settle();
        self.rate = rate.max(0.01);
    }

    pub(crate) fn duration(&self) -> Duration {
        self.duration
    }

    pub(crate) fn rate(&self) -> f32 {
        self.rate
    }

    pub(crate) fn play(&mut self) {
        if self.resumed_at.is_none() {
            self.resumed_at = Some(Instant::now());
        }
    }

    pub(crate) fn pause(&mut self) {
        self.settle();
        self.resumed_at = None;
    }

    pub(crate) fn restart(&mut self) {
        self.played = Duration::ZERO;
        self.resumed_at = Some(Instant::now());
    }

    pub(crate) fn position(&self) -> Duration {
        let running = self
            .resumed_at
            .map(|at| at.elapsed().mul_f32(self.rate))
            .unwrap_or_default();
        (self.played + running).min(self.duration)
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.position() >= self.duration
    }

    fn settle(&mut self) {
        self.played = self.position();
        if self.resumed_at.is_some() {
            self.resumed_at = Some(Instant::now());
        }
    }
}

struct SilentAsset {
    text: String,
    clock: Mutex<PlayheadClock>,
}

impl SilentAsset {
    fn clock(&self) -> MutexGuard<'_, PlayheadClock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioAsset for SilentAsset {
    fn duration(&self) -> Duration {
        self.clock().duration()
    }

    fn set_playback_rate(&self, rate: f32) {
        self.clock().set_rate(rate);
    }

    fn play(&self) {
        let mut clock = self.clock();
        clock.play();
        debug!(text = %self.text, rate = clock.rate(), "Speaking (silent)");
    }

    fn pause(&self) {
        self.clock().pause();
        debug!(text = %self.text, "Pausing (silent)");
    }

    fn restart(&self) {
        let mut clock = self.clock();
        clock.restart();
        debug!(text = %self.text, rate = clock.rate(), "Speaking from the top (silent)");
    }

    fn is_finished(&self) -> bool {
        self.clock().is_finished()
    }
}
