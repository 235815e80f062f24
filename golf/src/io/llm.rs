//! Text-generation backends.
//!
//! The [`ChatClient`] trait decouples the engine from provider APIs. Tests use
//! scripted clients returning predetermined replies; production code picks an
//! adapter from config via [`build_chat_client`].

use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::core::types::{Message, Role};
use crate::core::usage::UsageReport;
use crate::io::config::{LlmConfig, Provider};

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// One reply from a backend, with whatever usage counters it reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub text: String,
    pub usage: UsageReport,
}

/// Abstraction over call-and-respond text generation.
///
/// Transient upstream failures (rate limits, flaky transport) are the
/// adapter's concern to retry before returning; an `Err` from `generate` is
/// fatal for the current play-through.
pub trait ChatClient {
    fn generate(&self, messages: &[Message]) -> Result<ChatReply>;
}

/// Build the configured provider adapter, reading API keys from the
/// environment.
pub fn build_chat_client(config: &LlmConfig) -> Result<Box<dyn ChatClient>> {
    match config.provider {
        Provider::Openrouter => {
            let api_key = std::env::var("OPENROUTER_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .map_err(|_| {
                    anyhow!("OPENROUTER_API_KEY or OPENAI_API_KEY is required for the openrouter provider")
                })?;
            Ok(Box::new(OpenRouterClient::new(config, api_key)?))
        }
        Provider::Gemini => {
            let api_key = std::env::var("GEMINI_API_KEY")
                .map_err(|_| anyhow!("GEMINI_API_KEY is required for the gemini provider"))?;
            Ok(Box::new(GeminiClient::new(config, api_key)?))
        }
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("build llm http client")
}

/// Convert config-file request options into a JSON object.
fn options_to_json(config: &LlmConfig) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for (key, value) in &config.options {
        let value = serde_json::to_value(value)
            .with_context(|| format!("convert llm option {key}"))?;
        map.insert(key.clone(), value);
    }
    Ok(map)
}

/// OpenAI-compatible chat-completions adapter (OpenRouter and proxies).
pub struct OpenRouterClient {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    base_url: String,
    options: Map<String, Value>,
}

impl OpenRouterClient {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let mut options = options_to_json(config)?;
        // The config uses the provider-neutral name; the wire format wants
        // `max_tokens`.
        if let Some(value) = options.remove("max_output_tokens") {
            options.entry("max_tokens".to_string()).or_insert(value);
        }
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENROUTER_BASE_URL.to_string()),
            options,
        })
    }
}

impl ChatClient for OpenRouterClient {
    fn generate(&self, messages: &[Message]) -> Result<ChatReply> {
        let mut body = Map::new();
        body.insert("model".to_string(), json!(self.model));
        body.insert("messages".to_string(), serde_json::to_value(messages)?);
        for (key, value) in &self.options {
            body.insert(key.clone(), value.clone());
        }

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response: Value = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&Value::Object(body))
            .send()
            .context("openrouter request failed")?
            .error_for_status()
            .context("openrouter returned an error status")?
            .json()
            .context("parse openrouter response json")?;

        let text = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("openrouter response contained no message content"))?
            .trim()
            .to_string();
        let usage = UsageReport::from([
            (
                "input_tokens".to_string(),
                response["usage"]["prompt_tokens"].as_u64(),
            ),
            (
                "output_tokens".to_string(),
                response["usage"]["completion_tokens"].as_u64(),
            ),
        ]);
        debug!(chars = text.len(), "openrouter reply received");
        Ok(ChatReply { text, usage })
    }
}

/// Gemini `generateContent` adapter with bounded rate-limit backoff.
pub struct GeminiClient {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    base_url: String,
    options: Map<String, Value>,
    max_retries: u32,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            options: options_to_json(config)?,
            max_retries: 6,
        })
    }

    fn request_body(&self, messages: &[Message]) -> Value {
        let contents: Vec<Value> = messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                json!({ "role": role, "parts": [{ "text": message.content }] })
            })
            .collect();
        let mut body = Map::new();
        body.insert("contents".to_string(), Value::Array(contents));
        if !self.options.is_empty() {
            body.insert(
                "generationConfig".to_string(),
                Value::Object(self.options.clone()),
            );
        }
        Value::Object(body)
    }
}

impl ChatClient for GeminiClient {
    fn generate(&self, messages: &[Message]) -> Result<ChatReply> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = self.request_body(messages);

        let mut last_error: Option<anyhow::Error> = None;
        for attempt in 0..self.max_retries {
            let sent = self
                .client
                .post(&url)
                .query(&[("key", self.api_key.as_str())])
                .json(&body)
                .send()
                .context("gemini request failed")?;

            let status = sent.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                warn!(attempt, "gemini rate limited, backing off");
                last_error = Some(anyhow!("gemini rate limited (429)"));
                sleep(Duration::from_secs(10 * u64::from(attempt + 1)));
                continue;
            }
            if status.is_server_error() {
                warn!(attempt, %status, "gemini server error, backing off");
                last_error = Some(anyhow!("gemini server error ({status})"));
                sleep(Duration::from_secs(2 * u64::from(attempt + 1)));
                continue;
            }
            let response: Value = sent
                .error_for_status()
                .context("gemini returned an error status")?
                .json()
                .context("parse gemini response json")?;

            let parts = response["candidates"][0]["content"]["parts"]
                .as_array()
                .ok_or_else(|| anyhow!("gemini response contained no candidates"))?;
            let text = parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
                .trim()
                .to_string();
            let usage = UsageReport::from([
                (
                    "input_tokens".to_string(),
                    response["usageMetadata"]["promptTokenCount"].as_u64(),
                ),
                (
                    "output_tokens".to_string(),
                    response["usageMetadata"]["candidatesTokenCount"].as_u64(),
                ),
            ]);
            debug!(chars = text.len(), "gemini reply received");
            return Ok(ChatReply { text, usage });
        }
        Err(last_error.unwrap_or_else(|| anyhow!("gemini generateContent failed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::Provider;
    use std::collections::BTreeMap;

    fn config(options: &[(&str, toml::Value)]) -> LlmConfig {
        LlmConfig {
            provider: Provider::Openrouter,
            model: "test-model".to_string(),
            base_url: None,
            timeout_secs: 5,
            options: options
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn max_output_tokens_is_renamed_for_openrouter() {
        let cfg = config(&[("max_output_tokens", toml::Value::Integer(256))]);
        let client = OpenRouterClient::new(&cfg, "key".to_string()).expect("client");
        assert_eq!(client.options.get("max_tokens"), Some(&json!(256)));
        assert!(!client.options.contains_key("max_output_tokens"));
    }

    #[test]
    fn explicit_max_tokens_wins_over_renamed_option() {
        let cfg = config(&[
            ("max_output_tokens", toml::Value::Integer(256)),
            ("max_tokens", toml::Value::Integer(64)),
        ]);
        let client = OpenRouterClient::new(&cfg, "key".to_string()).expect("client");
        assert_eq!(client.options.get("max_tokens"), Some(&json!(64)));
    }

    #[test]
    fn gemini_body_maps_roles_and_options() {
        let mut cfg = config(&[("temperature", toml::Value::Float(0.2))]);
        cfg.provider = Provider::Gemini;
        let client = GeminiClient::new(&cfg, "key".to_string()).expect("client");
        let body = client.request_body(&[
            Message::user("question"),
            Message::assistant("answer"),
        ]);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["text"], "answer");
        assert_eq!(body["generationConfig"]["temperature"], json!(0.2));
    }
}
