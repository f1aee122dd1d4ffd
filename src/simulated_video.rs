//! A headless stand-in for a video element, advanced by the CLI clock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};
use updraft_core::{CaptionCue, CaptionTrack, VideoSurface};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Playhead {
    time: f64,
    playing: bool,
}

pub struct SimulatedVideo {
    playhead: Mutex<Playhead>,
    tracks: Mutex<Vec<Arc<LoggedTrack>>>,
}

impl SimulatedVideo {
    pub fn new(start: f64) -> Self {
        Self {
            playhead: Mutex::new(Playhead {
                time: start.max(0.0),
                playing: true,
            }),
            tracks: Mutex::new(Vec::new()),
        }
    }

    /// Move the playhead forward by `elapsed` if playing; returns the new time.
    pub fn advance(&self, elapsed: Duration) -> f64 {
        let mut playhead = lock(&self.playhead);
        if playhead.playing {
            playhead.time += elapsed.as_secs_f64();
        }
        playhead.time
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.playhead).playing
    }

    /// Returns the new playing state.
    pub fn toggle_playing(&self) -> bool {
        let mut playhead = lock(&self.playhead);
        playhead.playing = !playhead.playing;
        playhead.playing
    }

    /// Text of the cue on track `label` covering `time`.
    pub fn caption_at(&self, label: &str, time: f64) -> Option<String> {
        let tracks = lock(&self.tracks);
        let track = tracks.iter().find(|track| track.label == label)?;
        let cues = lock(&track.cues);
        cues.iter()
            .find(|cue| cue.start <= time && time < cue.end)
            .map(|cue| lock(&cue.text).clone())
    }
}

impl VideoSurface for SimulatedVideo {
    fn current_time(&self) -> f64 {
        lock(&self.playhead).time
    }

    fn seek(&self, time: f64) {
        info!(time, "Seeking video");
        lock(&self.playhead).time = time.max(0.0);
    }

    fn caption_track(&self, label: &str, language: &str) -> Arc<dyn CaptionTrack> {
        let mut tracks = lock(&self.tracks);
        if let Some(track) = tracks.iter().find(|track| track.label == label) {
            return Arc::clone(track) as Arc<dyn CaptionTrack>;
        }
        debug!(label, language, "Adding caption track");
        let track = Arc::new(LoggedTrack {
            label: label.to_string(),
            cues: Mutex::new(Vec::new()),
        });
        tracks.push(Arc::clone(&track));
        track
    }
}

struct LoggedTrack {
    label: String,
    cues: Mutex<Vec<Arc<LoggedCue>>>,
}

impl CaptionTrack for LoggedTrack {
    fn add_cue(&self, start: f64, end: f64, text: &str) -> Arc<dyn CaptionCue> {
        let cue = Arc::new(LoggedCue {
            start,
            end,
            text: Mutex::new(text.to_string()),
        });
        lock(&self.cues).push(Arc::clone(&cue));
        cue
    }

    fn set_showing(&self, showing: bool) {
        debug!(label = %self.label, showing, "Caption track visibility changed");
    }
}

struct LoggedCue {
    start: f64,
    end: f64,
    text: Mutex<String>,
}

impl CaptionCue for LoggedCue {
    fn set_text(&self, text: &str) {
        debug!(start = self.start, text, "Caption cue updated");
        *lock(&self.text) = text.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playhead_advances_only_while_playing() {
        let video = SimulatedVideo::new(1.0);
        assert_eq!(video.advance(Duration::from_millis(500)), 1.5);
        assert!(!video.toggle_playing());
        assert_eq!(video.advance(Duration::from_secs(3)), 1.5);
        video.seek(-4.0);
        assert_eq!(video.current_time(), 0.0);
    }

    #[test]
    fn tracks_are_reused_by_label_and_cues_are_mutable() {
        let video = SimulatedVideo::new(0.0);
        let first = video.caption_track("Chinese", "zh");
        let cue = first.add_cue(0.0, 2.0, "等待翻译...");
        let again = video.caption_track("Chinese", "zh");
        again.add_cue(2.0, 4.0, "二");

        cue.set_text("嗨");
        assert_eq!(video.caption_at("Chinese", 1.0).as_deref(), Some("嗨"));
        assert_eq!(video.caption_at("Chinese", 3.0).as_deref(), Some("二"));
        assert_eq!(video.caption_at("English", 1.0), None);
    }
}
