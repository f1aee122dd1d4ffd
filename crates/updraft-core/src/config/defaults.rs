pub(crate) fn default_log_level() -> crate::config::LogLevel {
    crate::config::LogLevel::Debug
}

pub(crate) fn default_translate_window() -> usize {
    5
}

pub(crate) fn default_dub_window() -> usize {
    3
}

pub(crate) fn default_throttle_interval_ms() -> u64 {
    100
}

pub(crate) fn default_admission_window_secs() -> f64 {
    1.0
}

pub(crate) fn default_translation_workers() -> usize {
    2
}

pub(crate) fn default_synthesis_workers() -> usize {
    4
}

pub(crate) fn default_retry_base_delay_ms() -> u64 {
    2_000
}

pub(crate) fn default_retry_max_delay_ms() -> u64 {
    60_000
}

pub(crate) fn default_pending_placeholder() -> String {
    "Translating...".to_string()
}

pub(crate) fn default_cue_placeholder() -> String {
    "等待翻译...".to_string()
}

pub(crate) fn default_translator_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

pub(crate) fn default_translator_model() -> String {
    "gpt-4o-mini".to_string()
}

pub(crate) fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

pub(crate) fn default_target_language() -> String {
    "Simplified Chinese".to_string()
}

pub(crate) fn default_speech_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

pub(crate) fn default_speech_model() -> String {
    "tts-1".to_string()
}

pub(crate) fn default_speech_voice() -> String {
    "alloy".to_string()
}
