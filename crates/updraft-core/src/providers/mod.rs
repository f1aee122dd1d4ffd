//! Concrete translator, speech and audio-output adapters.

mod openai;
mod rodio_asset;
mod silent;

pub use openai::{OpenAiSpeech, OpenAiTranslator};
pub use rodio_asset::{AudioOutput, RodioAsset, RodioOutput};
pub use silent::SilentSpeech;
#[cfg(test)]
pub(crate) use silent::PlayheadClock;

/// Read the API key from the environment variable named in config.
pub fn api_key_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|key| !key.trim().is_empty())
}
