use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{GenerationParams, TextGenerator};

pub const API_BASE_ENV: &str = "DOCEVAL_API_BASE";
pub const API_KEY_ENV: &str = "DOCEVAL_API_KEY";
pub const MODEL_ENV: &str = "DOCEVAL_MODEL";

const DEFAULT_API_BASE: &str = "http://127.0.0.1:8080";
const DEFAULT_MODEL: &str = "default";

/// OpenAI-compatible chat-completions client.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    endpoint: String,
    api_key: Option<String>,
    default_model: String,
    client: Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl HttpGenerator {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        default_model: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            endpoint: chat_endpoint(base_url),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            default_model: default_model.to_string(),
            client,
        })
    }

    pub fn from_env(timeout: Duration) -> Result<Self> {
        let base_url = env::var(API_BASE_ENV).unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let api_key = env::var(API_KEY_ENV).ok();
        let model = env::var(MODEL_ENV).unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(&base_url, api_key, &model, timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn chat_endpoint(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1/chat/completions") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1/chat/completions")
    }
}

impl TextGenerator for HttpGenerator {
    fn name(&self) -> &'static str {
        "http"
    }

    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let model = params.model.as_deref().unwrap_or(&self.default_model);
        let body = json!({
            "model": model,
            "temperature": params.temperature,
            "messages": [
                { "role": "user", "content": prompt }
            ]
        });

        debug!(
            endpoint = %self.endpoint,
            model,
            prompt_chars = prompt.len(),
            "sending generation request"
        );

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .with_context(|| format!("failed to reach generation service at {}", self.endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(anyhow!("generation service http error {status}: {text}"));
        }

        let parsed: ChatResponse = response
            .json()
            .context("generation service returned invalid JSON")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("generation service returned no content")
    }
}
