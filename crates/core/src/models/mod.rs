//! # Keel Models
//!
//! Model bridge configuration and backends. Every agent talks to the
//! generative model through [`ModelBridge`]; when no backend is configured
//! (or no credential is present) the [`NullBridge`] is wired in and agents
//! take their deterministic fallback path.

pub mod bridge;
pub mod gemini;
pub mod script;

pub use bridge::{
    extract_json_object, suggest_json, suggest_text, ModelBridge, NullBridge, ScriptedBridge,
};
pub use gemini::GeminiBridge;
pub use script::ScriptBridge;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default Gemini model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";

/// Supported bridge backends
///
/// - Gemini - direct HTTPS call, `GOOGLE_API_KEY` or `GEMINI_API_KEY`
/// - Script - external bridge program, prompt on stdin, reply on stdout
/// - Disabled - never calls a model
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Gemini,
    Script,
    Disabled,
}

impl LlmProvider {
    /// Display name for CLI output
    pub fn display_name(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "Gemini",
            LlmProvider::Script => "Script",
            LlmProvider::Disabled => "Disabled",
        }
    }

    /// Parse the value of `KEEL_MODEL_PROVIDER`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" => Some(LlmProvider::Gemini),
            "script" => Some(LlmProvider::Script),
            "disabled" | "none" | "off" => Some(LlmProvider::Disabled),
            _ => None,
        }
    }
}

/// Configuration for the model bridge
///
/// ## Example
/// ```rust,ignore
/// use keel_core::models::{ModelConfig, LlmProvider};
///
/// let config = ModelConfig::from_env();
/// let bridge = config.create_bridge();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Backend to use
    #[serde(default)]
    pub provider: LlmProvider,
    /// Model name (e.g., "gemini-2.5-flash-lite")
    pub model: String,
    /// Optional base URL override for the Gemini API
    #[serde(default)]
    pub base_url: Option<String>,
    /// Bridge program for the script backend
    #[serde(default)]
    pub script: Option<PathBuf>,
    /// Interpreter used to run the bridge program (e.g. "python")
    #[serde(default)]
    pub interpreter: Option<String>,
    /// Upper bound for one model round trip
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Gemini,
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            script: None,
            interpreter: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ModelConfig {
    /// Create config for a specific provider
    pub fn with_provider(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            ..Self::default()
        }
    }

    /// A config that never calls a model
    pub fn disabled() -> Self {
        Self::with_provider(LlmProvider::Disabled, DEFAULT_MODEL)
    }

    /// Read `KEEL_MODEL_PROVIDER`, `GEMINI_MODEL`, `KEEL_BRIDGE_SCRIPT` and `PYTHON_BIN`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(provider) = std::env::var("KEEL_MODEL_PROVIDER") {
            match LlmProvider::parse(&provider) {
                Some(parsed) => config.provider = parsed,
                None => {
                    tracing::warn!(provider = %provider, "Unknown model provider, using Gemini")
                }
            }
        }
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            if !model.trim().is_empty() {
                config.model = model;
            }
        }
        if let Ok(script) = std::env::var("KEEL_BRIDGE_SCRIPT") {
            config.script = Some(PathBuf::from(script));
        }
        if let Ok(interpreter) = std::env::var("PYTHON_BIN") {
            config.interpreter = Some(interpreter);
        }

        config
    }

    /// API key from `GOOGLE_API_KEY` or `GEMINI_API_KEY`
    pub fn api_key() -> Option<String> {
        ["GOOGLE_API_KEY", "GEMINI_API_KEY"]
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|key| !key.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Create the bridge for the configured provider
    ///
    /// Missing credentials or a missing bridge script degrade to the null
    /// bridge: every call then returns "no result".
    pub fn create_bridge(&self) -> Arc<dyn ModelBridge> {
        if self.provider == LlmProvider::Disabled {
            return Arc::new(NullBridge);
        }

        let Some(api_key) = Self::api_key() else {
            tracing::info!(
                provider = self.provider.display_name(),
                "No model credential configured, model bridge disabled"
            );
            return Arc::new(NullBridge);
        };

        match self.provider {
            LlmProvider::Gemini => {
                let mut bridge = GeminiBridge::new(&api_key, &self.model, self.timeout());
                if let Some(base_url) = &self.base_url {
                    bridge = bridge.with_base_url(base_url);
                }
                Arc::new(bridge)
            }
            LlmProvider::Script => match &self.script {
                Some(script) => Arc::new(ScriptBridge::new(
                    self.interpreter.clone(),
                    script.clone(),
                    &self.model,
                    self.timeout(),
                )),
                None => {
                    tracing::warn!("Script provider selected without KEEL_BRIDGE_SCRIPT");
                    Arc::new(NullBridge)
                }
            },
            LlmProvider::Disabled => Arc::new(NullBridge),
        }
    }
}
