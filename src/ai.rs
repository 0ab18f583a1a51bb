//! Remote text-completion client for chat replies.
//!
//! Sends a system + user prompt pair to an OpenAI-style chat completions
//! endpoint. Every failure mode — missing key, network error, bad status,
//! malformed body — collapses to `None`: replies are an enhancement, never
//! a dependency of the event pipeline.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

use crate::config::AiConfig;

const MAX_PROMPT_CHARS: usize = 2000;

/// Reply generator for narratable comments. The session only sees this
/// trait; tests substitute a scripted implementation.
#[async_trait]
pub trait Respond: Send + Sync {
    fn is_enabled(&self) -> bool;

    /// Ask for a short spoken reply to a user's comment. None on any failure.
    async fn reply_to_comment(&self, user: &str, text: &str) -> Option<String>;
}

pub struct AiResponder {
    enabled: bool,
    model: String,
    url: String,
    api_key: String,
    system_prompt: String,
    client: Client,
}

impl AiResponder {
    pub fn new(config: &AiConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        if config.enabled && config.api_key.is_empty() {
            warn!("AI replies enabled but no API key configured; replies disabled");
        }

        Self {
            enabled: config.enabled && !config.api_key.is_empty(),
            model: config.model.clone(),
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            system_prompt: config.system_prompt.clone(),
            client,
        }
    }

    async fn complete(&self, prompt: &str) -> Option<String> {
        let t_start = Instant::now();
        let prompt = if prompt.len() > MAX_PROMPT_CHARS {
            let mut end = MAX_PROMPT_CHARS;
            while !prompt.is_char_boundary(end) {
                end -= 1;
            }
            &prompt[..end]
        } else {
            prompt
        };

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.system_prompt },
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.7
        });

        let resp = match self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!("AI request failed: {e}");
                return None;
            }
        };

        if !resp.status().is_success() {
            warn!("AI service returned status {}", resp.status());
            return None;
        }

        let data: serde_json::Value = match resp.json().await {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to parse AI response: {e}");
                return None;
            }
        };

        let reply = data["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();

        if reply.is_empty() {
            warn!("AI service returned an empty reply");
            None
        } else {
            let latency_ms = t_start.elapsed().as_millis();
            info!("AI reply in {latency_ms}ms ({} chars)", reply.len());
            Some(reply)
        }
    }
}

#[async_trait]
impl Respond for AiResponder {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn reply_to_comment(&self, user: &str, text: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let prompt = format!("User '{user}' commented: '{text}'");
        self.complete(&prompt).await
    }
}
