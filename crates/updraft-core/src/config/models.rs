use serde::Deserialize;
use std::time::Duration;

pub(crate) const MAX_THROTTLE_INTERVAL_MS: u64 = 5_000;
pub(crate) const MAX_ADMISSION_WINDOW_SECS: f64 = 10.0;

/// Flat engine configuration; the on-disk TOML groups these into tables.
#[derive(Debug, Clone, Deserialize, serde::Serialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default = "crate::config::defaults::default_log_level")]
    pub log_level: LogLevel,
    /// Lookahead count for translation; 0 disables pre-translation.
    #[serde(default = "crate::config::defaults::default_translate_window")]
    pub translate_window: usize,
    /// Lookahead count for dubbing; 0 disables pre-dubbing.
    #[serde(default = "crate::config::defaults::default_dub_window")]
    pub dub_window: usize,
    #[serde(default = "crate::config::defaults::default_throttle_interval_ms")]
    pub throttle_interval_ms: u64,
    #[serde(default = "crate::config::defaults::default_admission_window_secs")]
    pub admission_window_secs: f64,
    #[serde(default = "crate::config::defaults::default_translation_workers")]
    pub translation_workers: usize,
    #[serde(default = "crate::config::defaults::default_synthesis_workers")]
    pub synthesis_workers: usize,
    #[serde(default = "crate::config::defaults::default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "crate::config::defaults::default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "crate::config::defaults::default_pending_placeholder")]
    pub pending_placeholder: String,
    #[serde(default = "crate::config::defaults::default_cue_placeholder")]
    pub cue_placeholder: String,
    #[serde(default)]
    pub translator: TranslatorConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            log_level: crate::config::defaults::default_log_level(),
            translate_window: crate::config::defaults::default_translate_window(),
            dub_window: crate::config::defaults::default_dub_window(),
            throttle_interval_ms: crate::config::defaults::default_throttle_interval_ms(),
            admission_window_secs: crate::config::defaults::default_admission_window_secs(),
            translation_workers: crate::config::defaults::default_translation_workers(),
            synthesis_workers: crate::config::defaults::default_synthesis_workers(),
            retry_base_delay_ms: crate::config::defaults::default_retry_base_delay_ms(),
            retry_max_delay_ms: crate::config::defaults::default_retry_max_delay_ms(),
            pending_placeholder: crate::config::defaults::default_pending_placeholder(),
            cue_placeholder: crate::config::defaults::default_cue_placeholder(),
            translator: TranslatorConfig::default(),
            speech: SpeechConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Keep runtime values in bounds regardless of where they came from.
    pub fn clamped(mut self) -> Self {
        self.translation_workers = self.translation_workers.max(1);
        self.synthesis_workers = self.synthesis_workers.max(1);
        self.throttle_interval_ms = self.throttle_interval_ms.min(MAX_THROTTLE_INTERVAL_MS);
        if !(self.admission_window_secs > 0.0) {
            self.admission_window_secs = crate::config::defaults::default_admission_window_secs();
        }
        self.admission_window_secs = self.admission_window_secs.min(MAX_ADMISSION_WINDOW_SECS);
        self.retry_max_delay_ms = self.retry_max_delay_ms.max(self.retry_base_delay_ms);
        self
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, PartialEq, Eq)]
pub struct TranslatorConfig {
    #[serde(default = "crate::config::defaults::default_translator_api_base")]
    pub api_base: String,
    #[serde(default = "crate::config::defaults::default_translator_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "crate::config::defaults::default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "crate::config::defaults::default_target_language")]
    pub target_language: String,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        TranslatorConfig {
            api_base: crate::config::defaults::default_translator_api_base(),
            model: crate::config::defaults::default_translator_model(),
            api_key_env: crate::config::defaults::default_api_key_env(),
            target_language: crate::config::defaults::default_target_language(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, PartialEq, Eq)]
pub struct SpeechConfig {
    #[serde(default = "crate::config::defaults::default_speech_api_base")]
    pub api_base: String,
    #[serde(default = "crate::config::defaults::default_speech_model")]
    pub model: String,
    #[serde(default = "crate::config::defaults::default_speech_voice")]
    pub voice: String,
    #[serde(default = "crate::config::defaults::default_api_key_env")]
    pub api_key_env: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        SpeechConfig {
            api_base: crate::config::defaults::default_speech_api_base(),
            model: crate::config::defaults::default_speech_model(),
            voice: crate::config::defaults::default_speech_voice(),
            api_key_env: crate::config::defaults::default_api_key_env(),
        }
    }
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
