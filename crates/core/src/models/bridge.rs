//! # Model Bridge
//!
//! The capability trait agents use to reach a generative-text service.
//!
//! Bridge calls are best-effort: [`suggest_text`] and [`suggest_json`] log
//! any failure and return `None`, so every caller keeps a deterministic
//! fallback path.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Mutex;

/// A text-completion service: prompt in, raw text out
#[async_trait]
pub trait ModelBridge: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Whether calls can produce a result at all
    fn is_available(&self) -> bool {
        true
    }

    /// Send one prompt and return the raw reply
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Ask for free text; `None` when the bridge is unavailable, fails, or replies empty
pub async fn suggest_text(bridge: &dyn ModelBridge, prompt: &str) -> Option<String> {
    if !bridge.is_available() {
        return None;
    }

    match bridge.generate(prompt).await {
        Ok(text) => {
            let text = text.trim();
            if text.is_empty() {
                None
            } else {
                Some(text.to_string())
            }
        }
        Err(e) => {
            tracing::warn!(bridge = bridge.name(), error = %e, "Model bridge call failed");
            None
        }
    }
}

/// Ask for a JSON object and decode it into `T`; `None` on any failure
pub async fn suggest_json<T: DeserializeOwned>(
    bridge: &dyn ModelBridge,
    prompt: &str,
) -> Option<T> {
    let text = suggest_text(bridge, prompt).await?;
    match serde_json::from_str(extract_json_object(&text)) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(
                bridge = bridge.name(),
                error = %e,
                "Model reply is not the expected JSON"
            );
            tracing::debug!(reply = %text, "Unparsed model reply");
            None
        }
    }
}

/// The substring between the first `{` and the last `}` (inclusive)
///
/// Text without a `{` is returned unchanged; text with no `}` after the first
/// `{` yields the empty string.
pub fn extract_json_object(text: &str) -> &str {
    let Some(start) = text.find('{') else {
        return text;
    };
    match text.rfind('}') {
        Some(end) if end > start => &text[start..=end],
        _ => "",
    }
}

/// Bridge used when no backend or credential is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBridge;

#[async_trait]
impl ModelBridge for NullBridge {
    fn name(&self) -> &str {
        "null"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
        anyhow::bail!("model bridge is disabled")
    }
}

/// Bridge answering from canned replies, for tests and offline runs
///
/// The first reply whose needle occurs in the prompt wins; a prompt matching
/// no needle is a bridge failure.
#[derive(Debug, Default)]
pub struct ScriptedBridge {
    replies: Vec<(String, String)>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer prompts containing `needle` with `reply`
    pub fn reply_when(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.replies.push((needle.into(), reply.into()));
        self
    }

    /// Every prompt received so far, oldest first
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModelBridge for ScriptedBridge {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.replies
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .ok_or_else(|| anyhow::anyhow!("no scripted reply for prompt"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reply {
        action: String,
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(
            extract_json_object("Sure! ```json\n{\"a\": {\"b\": 1}}\n``` done"),
            "{\"a\": {\"b\": 1}}"
        );
        assert_eq!(extract_json_object("no json here"), "no json here");
        assert_eq!(extract_json_object("} backwards {"), "");
    }

    #[tokio::test]
    async fn test_null_bridge_yields_nothing() {
        assert_eq!(suggest_text(&NullBridge, "hello").await, None);
        assert_eq!(suggest_json::<Reply>(&NullBridge, "hello").await, None);
    }

    #[tokio::test]
    async fn test_scripted_bridge_json() {
        let bridge = ScriptedBridge::new()
            .reply_when("route", "Here you go: {\"action\": \"new_feature\"}")
            .reply_when("garbage", "{ not json }");

        let reply: Option<Reply> = suggest_json(&bridge, "please route this").await;
        assert_eq!(
            reply,
            Some(Reply {
                action: "new_feature".to_string()
            })
        );
        assert_eq!(suggest_json::<Reply>(&bridge, "garbage in").await, None);
        assert_eq!(suggest_text(&bridge, "unmatched").await, None);
        assert_eq!(bridge.prompts().len(), 3);
    }
}
