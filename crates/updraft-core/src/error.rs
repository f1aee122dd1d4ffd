use thiserror::Error;

/// Failure of one translation batch. The whole batch is rejected; nothing is
/// applied partially.
#[derive(Error, Debug)]
pub enum TranslationError {
    #[error("translator error: {0}")]
    Provider(String),

    #[error("translator returned {actual} texts for a batch of {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("malformed translator response: {0}")]
    Malformed(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failure to synthesize speech for one span.
///
/// `Clone` because every caller awaiting the same in-flight generation
/// receives its own copy of the outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("nothing to synthesize")]
    EmptyText,

    #[error("speech provider error: {0}")]
    Provider(String),

    #[error("failed to decode synthesized audio: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for SynthesisError {
    fn from(err: reqwest::Error) -> Self {
        SynthesisError::Provider(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum TranscriptError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transcript parse error: {0}")]
    Parse(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
