//! Subtitle synchronization and incremental pre-fetch engine for dubbed
//! video playback.
//!
//! A [`session::SessionRuntime`] tracks which sentence is current against
//! the video clock, translates and dubs sentences ahead of playback, and
//! plays synthesized speech in sync with subtitle timing.

pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod playback;
pub mod providers;
pub mod scheduler;
pub mod session;
pub mod settings_store;
pub mod subtitles;
pub mod surface;
pub mod timeline;
pub mod transcript;
pub mod translation;

#[cfg(test)]
mod testing;

pub use audio::{AudioAsset, SentenceAudio, SpeechSynthesizer};
pub use config::{EngineConfig, load_config};
pub use error::{ConfigError, SynthesisError, TranscriptError, TranslationError};
pub use events::{EventBus, EventKind, SessionEvent};
pub use session::{SentenceView, SessionDeps, SessionHandle, SessionRuntime};
pub use settings_store::{PlayerSettings, PlayerSettingsPatch, SettingsStore};
pub use surface::{CaptionCue, CaptionTrack, VideoSurface};
pub use timeline::{Sentence, Timeline, Translation};
pub use translation::{TranslationContext, Translator};
