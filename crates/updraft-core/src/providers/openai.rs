//! OpenAI-compatible HTTP adapters for translation and speech.

use crate::audio::{AudioAsset, SpeechSynthesizer};
use crate::config::{SpeechConfig, TranslatorConfig};
use crate::error::{SynthesisError, TranslationError};
use crate::providers::AudioOutput;
use crate::translation::{TranslationContext, TranslationOutput, Translator};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

/// Chat-completions translator constrained to a JSON schema reply.
#[derive(Clone)]
pub struct OpenAiTranslator {
    client: Client,
    config: TranslatorConfig,
    api_key: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u64,
}

#[derive(Deserialize)]
struct TranslatedPayload {
    translated: Vec<String>,
}

impl OpenAiTranslator {
    pub fn new(config: TranslatorConfig, api_key: String) -> Self {
        Self {
            client: Client::new(),
            config,
            api_key,
        }
    }

    fn system_prompt(&self, context: &TranslationContext) -> String {
        let mut prompt = format!(
            "You translate video subtitles into {}. Reply with JSON {{\"translated\": [...]}} \
             holding exactly one translation per input sentence, in the same order. \
             Keep each translation short enough to be spoken in the original sentence's time.",
            self.config.target_language
        );
        if !context.title.trim().is_empty() {
            prompt.push_str(&format!("\nVideo title: {}", context.title.trim()));
        }
        if !context.description.trim().is_empty() {
            prompt.push_str(&format!("\nVideo description: {}", context.description.trim()));
        }
        prompt
    }

    fn request_body(&self, texts: &[String], context: &TranslationContext) -> Value {
        json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": self.system_prompt(context) },
                { "role": "user", "content": json!({ "sentences": texts }).to_string() },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "subtitle_translation",
                    "strict": true,
                    "schema": {
                        "type": "object",
                        "properties": {
                            "translated": { "type": "array", "items": { "type": "string" } }
                        },
                        "required": ["translated"],
                        "additionalProperties": false
                    }
                }
            }
        })
    }
}

/// Extract the translated texts and token usage from a chat reply body.
fn parse_chat_reply(body: &str) -> Result<TranslationOutput, TranslationError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|err| TranslationError::Malformed(format!("response body: {err}")))?;
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| TranslationError::Malformed("reply has no message content".to_string()))?;
    let payload: TranslatedPayload = serde_json::from_str(&content)
        .map_err(|err| TranslationError::Malformed(format!("message content: {err}")))?;
    Ok(TranslationOutput {
        texts: payload.translated,
        total_tokens: response.usage.map(|usage| usage.total_tokens),
    })
}

#[async_trait]
impl Translator for OpenAiTranslator {
    async fn translate_batch(
        &self,
        texts: &[String],
        context: &TranslationContext,
    ) -> Result<TranslationOutput, TranslationError> {
        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));
        debug!(url = %url, count = texts.len(), model = %self.config.model, "Requesting translation");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(texts, context))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(%status, "Translator returned an error status");
            return Err(TranslationError::Provider(format!("{status}: {body}")));
        }
        parse_chat_reply(&body)
    }
}

/// `/audio/speech` synthesizer; decoded through an [`AudioOutput`].
#[derive(Clone)]
pub struct OpenAiSpeech {
    client: Client,
    config: SpeechConfig,
    api_key: String,
    output: Arc<dyn AudioOutput>,
}

impl OpenAiSpeech {
    pub fn new(config: SpeechConfig, api_key: String, output: Arc<dyn AudioOutput>) -> Self {
        Self {
            client: Client::new(),
            config,
            api_key,
            output,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str) -> Result<Box<dyn AudioAsset>, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        let url = format!("{}/audio/speech", self.config.api_base.trim_end_matches('/'));
        debug!(url = %url, chars = text.chars().count(), voice = %self.config.voice, "Requesting speech");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.config.model,
                "voice": self.config.voice,
                "input": text,
                "response_format": "mp3",
            }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Provider(format!("{status}: {body}")));
        }
        let bytes = response.bytes().await?.to_vec();
        let output = Arc::clone(&self.output);
        tokio::task::spawn_blocking(move || output.load(bytes))
            .await
            .map_err(|err| SynthesisError::Decode(format!("decoder task failed: {err}")))?
    }
}
