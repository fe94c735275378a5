//! Gemini (Google AI) bridge
//!
//! One non-streaming `generateContent` call per prompt.

use super::bridge::ModelBridge;
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini bridge over HTTPS
pub struct GeminiBridge {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiBridge {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self {
            client,
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.to_string(),
        }
    }

    /// Create with a specific base URL
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

/// Concatenate the text parts of every candidate
fn response_text(body: &Value) -> anyhow::Result<String> {
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error");
        anyhow::bail!("Gemini API error: {}", message);
    }

    let text: String = body
        .get("candidates")
        .and_then(|c| c.as_array())
        .into_iter()
        .flatten()
        .filter_map(|candidate| candidate.pointer("/content/parts"))
        .filter_map(|parts| parts.as_array())
        .flatten()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();

    Ok(text)
}

#[async_trait]
impl ModelBridge for GeminiBridge {
    fn name(&self) -> &str {
        "gemini"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }]
        });

        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "Calling Gemini");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .with_context(|| format!("Gemini returned a non-JSON body ({})", status))?;

        response_text(&payload)
    }
}
