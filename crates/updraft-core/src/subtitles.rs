//! Timed-text parsing and the bilingual sentence combiner.
//!
//! Cue blocks are split into sentence fragments on terminal punctuation,
//! target fragments are paired positionally with source fragments, then
//! fragments are merged forward into whole sentences.

use crate::error::TranscriptError;
use crate::timeline::Sentence;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

static RE_TIMING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*((?:\d+:)?\d{1,2}:\d{2}(?:[.,]\d{1,3})?)\s*-->\s*((?:\d+:)?\d{1,2}:\d{2}(?:[.,]\d{1,3})?)")
        .expect("timing pattern should compile")
});
static RE_FRAGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^.!?。？！]*[.!?。？！]+|[^.!?。？！]+").expect("fragment pattern should compile")
});

const TERMINALS: [char; 6] = ['.', '!', '?', '。', '？', '！'];

/// One timed block of a subtitle track.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct Combined {
    pub sentences: Vec<Sentence>,
    /// All source sentences joined with spaces.
    pub full_text: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Fragment {
    start: f64,
    end: f64,
    source: String,
    target: String,
}

/// Parse `HH:MM:SS.mmm`, `MM:SS.mmm` or comma-millis variants into seconds.
pub fn parse_timestamp(raw: &str) -> Option<f64> {
    let raw = raw.trim().replace(',', ".");
    let mut parts = raw.rsplit(':');
    let seconds: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let hours: f64 = match parts.next() {
        Some(hours) => hours.parse().ok()?,
        None => 0.0,
    };
    if parts.next().is_some() || seconds >= 60.0 || minutes >= 60.0 {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Parse an SRT or WebVTT style track. Blocks without a timing line
/// (headers, notes, styles) are skipped.
pub fn parse_cues(content: &str) -> Result<Vec<Cue>, TranscriptError> {
    let normalized = content.replace("\r\n", "\n");
    let mut cues = Vec::new();
    for (block_no, block) in normalized.split("\n\n").enumerate() {
        let mut lines = block.lines().map(str::trim).filter(|line| !line.is_empty());
        let Some(timing_line) = lines.by_ref().find(|line| line.contains("-->")) else {
            continue;
        };
        let caps = RE_TIMING.captures(timing_line).ok_or_else(|| {
            TranscriptError::Parse(format!("block {}: bad timing line {timing_line:?}", block_no + 1))
        })?;
        let (Some(start), Some(end)) = (parse_timestamp(&caps[1]), parse_timestamp(&caps[2])) else {
            return Err(TranscriptError::Parse(format!(
                "block {}: bad timestamp in {timing_line:?}",
                block_no + 1
            )));
        };
        let text = lines.collect::<Vec<_>>().join(" ");
        cues.push(Cue { start, end, text });
    }
    debug!(count = cues.len(), "Parsed subtitle cues");
    Ok(cues)
}

fn split_fragments(text: &str) -> Vec<&str> {
    RE_FRAGMENT
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|fragment| !fragment.trim().is_empty())
        .collect()
}

fn ends_sentence(text: &str) -> bool {
    text.trim_end().ends_with(TERMINALS)
}

/// Split one cue into fragments with timing proportional to character
/// offsets. Target text is kept only when fragment counts agree.
fn split_cue(source: &Cue, target: Option<&Cue>) -> Vec<Fragment> {
    let text = source.text.trim();
    if source.end <= source.start || text.is_empty() {
        return Vec::new();
    }
    let source_parts = split_fragments(text);
    let target_parts = target.map(|cue| split_fragments(cue.text.trim())).unwrap_or_default();
    let paired = source_parts.len() == target_parts.len();
    if !paired && !target_parts.is_empty() {
        warn!(
            start = source.start,
            source = source_parts.len(),
            target = target_parts.len(),
            "Fragment counts differ; dropping target text for cue"
        );
    }

    let total_chars = text.chars().count() as f64;
    let span = source.end - source.start;
    let mut offset = 0usize;
    let mut fragments = Vec::with_capacity(source_parts.len());
    for (index, part) in source_parts.iter().enumerate() {
        let len = part.chars().count();
        let start = source.start + (offset as f64 / total_chars) * span;
        offset += len;
        let end = if index + 1 == source_parts.len() {
            source.end
        } else {
            source.start + (offset as f64 / total_chars) * span
        };
        let target = if paired {
            target_parts[index].trim().to_string()
        } else {
            String::new()
        };
        fragments.push(Fragment {
            start,
            end,
            source: part.trim().to_string(),
            target,
        });
    }
    fragments
}

fn merge_fragments(fragments: Vec<Fragment>) -> Vec<Fragment> {
    let mut merged: Vec<Fragment> = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        match merged.last_mut() {
            Some(open) if !ends_sentence(&open.source) => {
                open.source.push(' ');
                open.source.push_str(&fragment.source);
                // A part without target text leaves the whole sentence without it.
                if open.target.is_empty() || fragment.target.is_empty() {
                    open.target.clear();
                } else {
                    open.target.push_str(&fragment.target);
                }
                open.end = fragment.end;
            }
            _ => merged.push(fragment),
        }
    }
    merged
}

/// Combine parsed tracks. Target cues pair with source cues by position.
pub fn combine_cues(source: &[Cue], target: &[Cue]) -> Combined {
    let fragments: Vec<Fragment> = source
        .iter()
        .enumerate()
        .flat_map(|(index, cue)| split_cue(cue, target.get(index)))
        .collect();
    let fragment_count = fragments.len();
    let merged = merge_fragments(fragments);
    let full_text = merged
        .iter()
        .map(|fragment| fragment.source.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let sentences: Vec<Sentence> = merged
        .into_iter()
        .filter(|fragment| fragment.end > fragment.start)
        .map(|fragment| Sentence::new(fragment.start, fragment.end, fragment.source).with_reference(fragment.target))
        .collect();
    debug!(
        cues = source.len(),
        fragments = fragment_count,
        sentences = sentences.len(),
        "Combined subtitle tracks"
    );
    Combined {
        sentences,
        full_text,
    }
}

pub fn combine(source: &str, target: &str) -> Result<Combined, TranscriptError> {
    let source = parse_cues(source)?;
    let target = parse_cues(target)?;
    Ok(combine_cues(&source, &target))
}
