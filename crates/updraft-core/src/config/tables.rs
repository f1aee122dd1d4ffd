use super::defaults;
use super::models::{EngineConfig, LogLevel, SpeechConfig, TranslatorConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub(super) struct ConfigTables {
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(default)]
    lookahead: LookaheadConfig,
    #[serde(default)]
    clock: ClockConfig,
    #[serde(default)]
    playback: PlaybackConfig,
    #[serde(default)]
    workers: WorkersConfig,
    #[serde(default)]
    retry: RetryConfig,
    #[serde(default)]
    text: TextConfig,
    #[serde(default)]
    translator: TranslatorConfig,
    #[serde(default)]
    speech: SpeechConfig,
}

impl From<ConfigTables> for EngineConfig {
    fn from(tables: ConfigTables) -> Self {
        EngineConfig {
            log_level: tables.logging.log_level,
            translate_window: tables.lookahead.translate_window,
            dub_window: tables.lookahead.dub_window,
            throttle_interval_ms: tables.clock.throttle_interval_ms,
            admission_window_secs: tables.playback.admission_window_secs,
            translation_workers: tables.workers.translation_workers,
            synthesis_workers: tables.workers.synthesis_workers,
            retry_base_delay_ms: tables.retry.base_delay_ms,
            retry_max_delay_ms: tables.retry.max_delay_ms,
            pending_placeholder: tables.text.pending_placeholder,
            cue_placeholder: tables.text.cue_placeholder,
            translator: tables.translator,
            speech: tables.speech,
        }
    }
}

impl From<&EngineConfig> for ConfigTables {
    fn from(config: &EngineConfig) -> Self {
        ConfigTables {
            logging: LoggingConfig {
                log_level: config.log_level,
            },
            lookahead: LookaheadConfig {
                translate_window: config.translate_window,
                dub_window: config.dub_window,
            },
            clock: ClockConfig {
                throttle_interval_ms: config.throttle_interval_ms,
            },
            playback: PlaybackConfig {
                admission_window_secs: config.admission_window_secs,
            },
            workers: WorkersConfig {
                translation_workers: config.translation_workers,
                synthesis_workers: config.synthesis_workers,
            },
            retry: RetryConfig {
                base_delay_ms: config.retry_base_delay_ms,
                max_delay_ms: config.retry_max_delay_ms,
            },
            text: TextConfig {
                pending_placeholder: config.pending_placeholder.clone(),
                cue_placeholder: config.cue_placeholder.clone(),
            },
            translator: config.translator.clone(),
            speech: config.speech.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct LoggingConfig {
    #[serde(default = "defaults::default_log_level")]
    log_level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: defaults::default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct LookaheadConfig {
    #[serde(default = "defaults::default_translate_window")]
    translate_window: usize,
    #[serde(default = "defaults::default_dub_window")]
    dub_window: usize,
}

impl Default for LookaheadConfig {
    fn default() -> Self {
        Self {
            translate_window: defaults::default_translate_window(),
            dub_window: defaults::default_dub_window(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct ClockConfig {
    #[serde(default = "defaults::default_throttle_interval_ms")]
    throttle_interval_ms: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            throttle_interval_ms: defaults::default_throttle_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct PlaybackConfig {
    #[serde(default = "defaults::default_admission_window_secs")]
    admission_window_secs: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            admission_window_secs: defaults::default_admission_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct WorkersConfig {
    #[serde(default = "defaults::default_translation_workers")]
    translation_workers: usize,
    #[serde(default = "defaults::default_synthesis_workers")]
    synthesis_workers: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            translation_workers: defaults::default_translation_workers(),
            synthesis_workers: defaults::default_synthesis_workers(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct RetryConfig {
    #[serde(default = "defaults::default_retry_base_delay_ms")]
    base_delay_ms: u64,
    #[serde(default = "defaults::default_retry_max_delay_ms")]
    max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: defaults::default_retry_base_delay_ms(),
            max_delay_ms: defaults::default_retry_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
struct TextConfig {
    #[serde(default = "defaults::default_pending_placeholder")]
    pending_placeholder: String,
    #[serde(default = "defaults::default_cue_placeholder")]
    cue_placeholder: String,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            pending_placeholder: defaults::default_pending_placeholder(),
            cue_placeholder: defaults::default_cue_placeholder(),
        }
    }
}
