//! Seams to the video element the session is attached to.
//!
//! Time-update, seek and pause signals are pushed into the session through
//! [`crate::session::SessionHandle`]; the surface only covers what the
//! session needs to read or mutate.

use std::sync::Arc;

pub const SOURCE_TRACK_LABEL: &str = "English by Updraft Helper";
pub const TARGET_TRACK_LABEL: &str = "Chinese by Updraft Helper";

/// A subtitle cue whose text can be rewritten after it is attached.
pub trait CaptionCue: Send + Sync {
    fn set_text(&self, text: &str);
}

pub trait CaptionTrack: Send + Sync {
    fn add_cue(&self, start: f64, end: f64, text: &str) -> Arc<dyn CaptionCue>;
    fn set_showing(&self, showing: bool);
}

pub trait VideoSurface: Send + Sync {
    fn current_time(&self) -> f64;
    fn seek(&self, time: f64);
    /// Return the track with `label`, attaching a new one if none exists.
    fn caption_track(&self, label: &str, language: &str) -> Arc<dyn CaptionTrack>;
}
