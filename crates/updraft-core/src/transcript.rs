//! Loading the bilingual subtitle tracks a session is built from.

use crate::error::TranscriptError;
use crate::subtitles::{self, Combined};
use crate::timeline::Timeline;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

/// Raw timed-text tracks for the source and target language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptTracks {
    pub source: String,
    pub target: String,
}

#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn load(&self) -> Result<TranscriptTracks, TranscriptError>;
}

/// Reads both tracks from local subtitle files.
#[derive(Debug, Clone)]
pub struct FileTranscriptSource {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
}

impl FileTranscriptSource {
    pub fn new(source_path: impl Into<PathBuf>, target_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            target_path: target_path.into(),
        }
    }
}

#[async_trait]
impl TranscriptSource for FileTranscriptSource {
    async fn load(&self) -> Result<TranscriptTracks, TranscriptError> {
        let source = tokio::fs::read_to_string(&self.source_path).await?;
        let target = tokio::fs::read_to_string(&self.target_path).await?;
        info!(
            source = %self.source_path.display(),
            target = %self.target_path.display(),
            "Loaded transcript tracks"
        );
        Ok(TranscriptTracks { source, target })
    }
}

/// Load and combine a transcript. Any failure is fatal for the session;
/// nothing partial is returned.
pub async fn load_transcript(
    source: &dyn TranscriptSource,
) -> Result<(Timeline, String), TranscriptError> {
    let tracks = source.load().await?;
    let Combined {
        sentences,
        full_text,
    } = subtitles::combine(&tracks.source, &tracks.target)?;
    if sentences.is_empty() {
        return Err(TranscriptError::Parse("transcript has no sentences".to_string()));
    }
    info!(sentences = sentences.len(), "Built sentence timeline");
    Ok((Timeline::new(sentences), full_text))
}
