//! The one clip allowed to sound at a time.

use crate::audio::SentenceAudio;
use std::sync::{Arc, Weak};
use tracing::debug;

/// The single global "now playing" slot.
///
/// Holds a weak reference: the audio itself is owned by its sentence.
#[derive(Debug, Default)]
pub struct NowPlaying {
    last_played: Option<Weak<SentenceAudio>>,
}

impl NowPlaying {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_played(&self) -> Option<Arc<SentenceAudio>> {
        self.last_played.as_ref().and_then(Weak::upgrade)
    }

    /// Make `audio` the one playing clip and play it from its beginning,
    /// pausing whatever played before.
    pub fn start(&mut self, audio: &Arc<SentenceAudio>) {
        if let Some(previous) = self.last_played() {
            if !Arc::ptr_eq(&previous, audio) {
                debug!(
                    previous_start = previous.start(),
                    next_start = audio.start(),
                    "Pausing previous sentence audio"
                );
                previous.pause();
            }
        }
        audio.restart();
        self.last_played = Some(Arc::downgrade(audio));
    }

    pub fn pause(&self) {
        if let Some(audio) = self.last_played() {
            audio.pause();
        }
    }

    /// Pause and forget `audio` if it occupies the slot.
    pub fn release(&mut self, audio: &Arc<SentenceAudio>) {
        if let Some(current) = self.last_played() {
            if Arc::ptr_eq(&current, audio) {
                current.pause();
                self.last_played = None;
            }
        }
    }

    pub fn clear(&mut self) {
        self.pause();
        self.last_played = None;
    }
}
