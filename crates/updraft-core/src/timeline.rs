//! The ordered store of sentence spans. Indices are the stable identity.

use crate::audio::SentenceAudio;
use crate::surface::CaptionCue;
use serde::Serialize;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Translation state of a span. Moves `Absent -> Pending -> Final` and never
/// back to `Absent`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "text", rename_all = "snake_case")]
pub enum Translation {
    #[default]
    Absent,
    Pending,
    Final(String),
}

impl Translation {
    pub fn is_final(&self) -> bool {
        matches!(self, Translation::Final(_))
    }

    pub fn final_text(&self) -> Option<&str> {
        match self {
            Translation::Final(text) => Some(text),
            _ => None,
        }
    }
}

pub struct Sentence {
    pub start: f64,
    pub end: f64,
    pub source_text: String,
    /// Target-language text shipped with the transcript, if it aligned.
    pub reference_text: Option<String>,
    translation: Translation,
    audio: Option<Arc<SentenceAudio>>,
    cue: Option<Arc<dyn CaptionCue>>,
}

impl std::fmt::Debug for Sentence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sentence")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("source_text", &self.source_text)
            .field("reference_text", &self.reference_text)
            .field("translation", &self.translation)
            .field("audio", &self.audio)
            .field("has_cue", &self.cue.is_some())
            .finish()
    }
}

impl Sentence {
    pub fn new(start: f64, end: f64, source_text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            source_text: source_text.into(),
            reference_text: None,
            translation: Translation::Absent,
            audio: None,
            cue: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        let reference = reference.into();
        self.reference_text = Some(reference).filter(|text| !text.trim().is_empty());
        self
    }

    pub fn with_translation(mut self, text: impl Into<String>) -> Self {
        self.translation = Translation::Final(text.into());
        self
    }

    pub fn contains(&self, time: f64) -> bool {
        self.start <= time && time < self.end
    }

    pub fn translation(&self) -> &Translation {
        &self.translation
    }

    pub fn audio(&self) -> Option<&Arc<SentenceAudio>> {
        self.audio.as_ref()
    }

    /// Text to synthesize: the final translation, else the reference text.
    /// Blank text is never spoken.
    pub fn dub_text(&self) -> Option<&str> {
        self.translation
            .final_text()
            .filter(|text| !text.trim().is_empty())
            .or(self.reference_text.as_deref())
    }

    /// Existing audio no longer matches the text that should be spoken.
    pub fn audio_is_stale(&self) -> bool {
        match (&self.audio, self.dub_text()) {
            (Some(audio), Some(text)) => audio.text() != text,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Text for the target caption cue.
    pub fn cue_text<'a>(&'a self, placeholder: &'a str) -> &'a str {
        self.translation
            .final_text()
            .or(self.reference_text.as_deref())
            .unwrap_or(placeholder)
    }

    /// Text for a UI list: pending spans show the placeholder, never as final.
    pub fn display_text<'a>(&'a self, pending_placeholder: &'a str) -> Option<&'a str> {
        match &self.translation {
            Translation::Final(text) => Some(text),
            Translation::Pending => Some(pending_placeholder),
            Translation::Absent => self.reference_text.as_deref(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Timeline {
    sentences: Vec<Sentence>,
}

impl Timeline {
    /// `sentences` must already be ordered by start time.
    pub fn new(sentences: Vec<Sentence>) -> Self {
        debug_assert!(
            sentences.windows(2).all(|pair| pair[0].start <= pair[1].start),
            "timeline spans must be time-ordered"
        );
        Self { sentences }
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Sentence> {
        self.sentences.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sentence> {
        self.sentences.iter()
    }

    pub fn last_index(&self) -> Option<usize> {
        self.sentences.len().checked_sub(1)
    }

    /// Index of the span with `start <= time < end`.
    pub fn find_active(&self, time: f64) -> Option<usize> {
        self.sentences
            .iter()
            .position(|sentence| sentence.contains(time))
    }

    /// `[current, min(current + 2 * count, last)]`, or `None` if out of range.
    pub fn lookahead(&self, current: usize, count: usize) -> Option<RangeInclusive<usize>> {
        let last = self.last_index()?;
        if current > last {
            return None;
        }
        let end = current.saturating_add(count.saturating_mul(2)).min(last);
        Some(current..=end)
    }

    pub fn reaches_end(&self, window: &RangeInclusive<usize>) -> bool {
        *window.end() + 1 >= self.sentences.len()
    }

    /// Flag a span as in progress. Returns `false` for final or unknown spans.
    pub fn mark_pending(&mut self, index: usize) -> bool {
        match self.sentences.get_mut(index) {
            Some(sentence) if !sentence.translation.is_final() => {
                sentence.translation = Translation::Pending;
                true
            }
            _ => false,
        }
    }

    /// Store a final translation and push it to the bound cue. Returns the
    /// audio it invalidated, if any.
    pub fn set_translation(&mut self, index: usize, text: String) -> Option<Arc<SentenceAudio>> {
        let sentence = self.sentences.get_mut(index)?;
        if let Some(cue) = &sentence.cue {
            cue.set_text(&text);
        }
        sentence.translation = Translation::Final(text);
        if sentence.audio_is_stale() {
            return sentence.audio.take();
        }
        None
    }

    pub fn bind_audio(&mut self, index: usize, audio: Arc<SentenceAudio>) {
        if let Some(sentence) = self.sentences.get_mut(index) {
            sentence.audio = Some(audio);
        }
    }

    /// Drop the audio at `index` only if it is still `audio`.
    pub fn clear_audio_if(&mut self, index: usize, audio: &Arc<SentenceAudio>) -> bool {
        match self.sentences.get_mut(index) {
            Some(sentence)
                if sentence
                    .audio
                    .as_ref()
                    .is_some_and(|bound| Arc::ptr_eq(bound, audio)) =>
            {
                sentence.audio = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_bound(&self, index: usize, audio: &Arc<SentenceAudio>) -> bool {
        self.sentences
            .get(index)
            .and_then(Sentence::audio)
            .is_some_and(|bound| Arc::ptr_eq(bound, audio))
    }

    pub fn bind_cue(&mut self, index: usize, cue: Arc<dyn CaptionCue>) {
        if let Some(sentence) = self.sentences.get_mut(index) {
            sentence.cue = Some(cue);
        }
    }

    pub fn clear(&mut self) {
        self.sentences.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Timeline {
        Timeline::new(vec![
            Sentence::new(0.0, 2.0, "Hi.").with_reference("嗨。"),
            Sentence::new(2.0, 5.0, "Bye.").with_reference("拜拜。"),
            Sentence::new(6.0, 8.0, "Gap before me."),
        ])
    }

    #[test]
    fn active_span_is_half_open() {
        let timeline = sample();
        assert_eq!(timeline.find_active(0.0), Some(0));
        assert_eq!(timeline.find_active(1.99), Some(0));
        assert_eq!(timeline.find_active(2.0), Some(1));
        assert_eq!(timeline.find_active(5.5), None);
        assert_eq!(timeline.find_active(8.0), None);
    }

    #[test]
    fn lookahead_is_clamped_to_last_index() {
        let timeline = sample();
        assert_eq!(timeline.lookahead(0, 1), Some(0..=2));
        assert_eq!(timeline.lookahead(1, 5), Some(1..=2));
        assert_eq!(timeline.lookahead(0, 0), Some(0..=0));
        assert_eq!(timeline.lookahead(3, 1), None);
        assert!(timeline.reaches_end(&(1..=2)));
        assert!(!timeline.reaches_end(&(0..=1)));
    }

    #[test]
    fn translation_never_reverts_from_final() {
        let mut timeline = sample();
        assert!(timeline.mark_pending(0));
        assert_eq!(timeline.get(0).map(|s| s.translation().clone()), Some(Translation::Pending));
        timeline.set_translation(0, "你好".to_string());
        assert!(!timeline.mark_pending(0));
        assert_eq!(
            timeline.get(0).map(|s| s.translation().clone()),
            Some(Translation::Final("你好".to_string()))
        );
        assert!(!timeline.mark_pending(99));
    }

    #[test]
    fn changing_text_invalidates_bound_audio() {
        let mut timeline = sample();
        let audio = Arc::new(SentenceAudio::new(0.0, 2.0, "嗨。"));
        timeline.bind_audio(0, Arc::clone(&audio));
        assert!(!timeline.get(0).expect("span should exist").audio_is_stale());

        let dropped = timeline.set_translation(0, "嗨".to_string());
        assert!(dropped.is_some_and(|old| Arc::ptr_eq(&old, &audio)));
        assert!(timeline.get(0).expect("span should exist").audio().is_none());
        assert_ne!(audio.text(), timeline.get(0).and_then(Sentence::dub_text).unwrap_or_default());
    }

    #[test]
    fn same_text_keeps_audio() {
        let mut timeline = sample();
        let audio = Arc::new(SentenceAudio::new(0.0, 2.0, "嗨。"));
        timeline.bind_audio(0, Arc::clone(&audio));
        assert!(timeline.set_translation(0, "嗨。".to_string()).is_none());
        assert!(timeline.is_bound(0, &audio));
    }

    #[test]
    fn display_text_distinguishes_pending_from_final() {
        let mut timeline = sample();
        assert_eq!(timeline.get(2).and_then(|s| s.display_text("…")), None);
        timeline.mark_pending(2);
        assert_eq!(timeline.get(2).and_then(|s| s.display_text("…")), Some("…"));
        timeline.set_translation(2, "…".to_string());
        assert!(timeline.get(2).is_some_and(|s| s.translation().is_final()));
    }

    #[test]
    fn clear_audio_only_matches_same_instance() {
        let mut timeline = sample();
        let bound = Arc::new(SentenceAudio::new(0.0, 2.0, "嗨。"));
        let other = Arc::new(SentenceAudio::new(0.0, 2.0, "嗨。"));
        timeline.bind_audio(0, Arc::clone(&bound));
        assert!(!timeline.clear_audio_if(0, &other));
        assert!(timeline.clear_audio_if(0, &bound));
        assert!(timeline.get(0).and_then(Sentence::audio).is_none());
    }

    #[test]
    fn blank_translation_is_not_spoken() {
        let blank = Sentence::new(0.0, 1.0, "Um.").with_translation("  ");
        assert_eq!(blank.dub_text(), None);
        assert_eq!(blank.cue_text("…"), "  ");
        let fallback = Sentence::new(0.0, 1.0, "Um.")
            .with_reference("嗯。")
            .with_translation("");
        assert_eq!(fallback.dub_text(), Some("嗯。"));
    }
}
