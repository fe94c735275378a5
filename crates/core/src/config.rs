//! # Pipeline Configuration
//!
//! Where the master document lives, which directory patches may touch, who
//! acts when nobody is named, and which model bridge to use.
//!
//! Values come from the environment first; an optional
//! `<runtime>/config.json` is then merged over them, field by field.

use crate::error::{PipelineError, Result};
use crate::models::{LlmProvider, ModelConfig};
use crate::state::io::{get_runtime_path, read_optional};
use crate::state::DocumentStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Actor recorded on log entries when no user is named
pub const DEFAULT_ACTOR: &str = "keel-system";

/// File name of the master document inside the runtime directory
pub const MASTER_DOCUMENT_FILE: &str = "master-document.json";

/// File name of the persisted configuration inside the runtime directory
pub const CONFIG_FILE: &str = "config.json";

/// Resolved configuration for one pipeline instance
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Runtime directory (`.keel` by default)
    pub runtime_dir: PathBuf,
    /// Location of the master document
    pub document_path: PathBuf,
    /// Root that relative patch paths resolve against
    pub workspace_root: PathBuf,
    /// Actor used when a log entry names none
    pub default_actor: String,
    /// Model bridge settings
    pub model: ModelConfig,
}

impl PipelineConfig {
    /// Configuration rooted at `runtime_dir`, with the model bridge disabled
    ///
    /// Patches land in the directory that holds `runtime_dir`.
    pub fn for_runtime_dir(runtime_dir: impl Into<PathBuf>) -> Self {
        let runtime_dir = runtime_dir.into();
        let workspace_root = runtime_dir
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            document_path: runtime_dir.join(MASTER_DOCUMENT_FILE),
            workspace_root,
            runtime_dir,
            default_actor: DEFAULT_ACTOR.to_string(),
            model: ModelConfig::disabled(),
        }
    }

    /// Read `KEEL_RUNTIME_PATH`, `KEEL_MASTER_DOC`, `KEEL_WORKSPACE_ROOT` and the model variables
    pub fn from_env() -> Self {
        let runtime_dir = get_runtime_path();
        let document_path = std::env::var("KEEL_MASTER_DOC")
            .map(PathBuf::from)
            .unwrap_or_else(|_| runtime_dir.join(MASTER_DOCUMENT_FILE));
        let workspace_root = std::env::var("KEEL_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        Self {
            runtime_dir,
            document_path,
            workspace_root,
            default_actor: DEFAULT_ACTOR.to_string(),
            model: ModelConfig::from_env(),
        }
    }

    /// Environment defaults with `<runtime>/config.json` merged on top
    pub async fn load() -> Result<Self> {
        let mut config = Self::from_env();
        let persisted = PersistedConfig::load(&config.runtime_dir).await?;
        config.apply(persisted);
        Ok(config)
    }

    /// Overlay every field the persisted config sets
    pub fn apply(&mut self, persisted: PersistedConfig) {
        if let Some(path) = persisted.document_path {
            self.document_path = path;
        }
        if let Some(root) = persisted.workspace_root {
            self.workspace_root = root;
        }
        if let Some(actor) = persisted.default_actor {
            self.default_actor = actor;
        }
        if let Some(provider) = persisted.provider {
            self.model.provider = provider;
        }
        if let Some(model) = persisted.model {
            self.model.model = model;
        }
        if persisted.base_url.is_some() {
            self.model.base_url = persisted.base_url;
        }
        if persisted.script.is_some() {
            self.model.script = persisted.script;
        }
        if persisted.interpreter.is_some() {
            self.model.interpreter = persisted.interpreter;
        }
        if let Some(timeout) = persisted.timeout_secs {
            self.model.timeout_secs = timeout;
        }
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Store for the configured master document
    pub fn store(&self) -> DocumentStore {
        DocumentStore::new(&self.document_path, &self.default_actor)
    }
}

/// Persisted configuration (`<runtime>/config.json`); every field optional
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PersistedConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<LlmProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl PersistedConfig {
    fn path(runtime_dir: &Path) -> PathBuf {
        runtime_dir.join(CONFIG_FILE)
    }

    /// Load `config.json`; a missing file is an empty config
    pub async fn load(runtime_dir: &Path) -> Result<Self> {
        let path = Self::path(runtime_dir);
        match read_optional(&path).await? {
            Some(content) => serde_json::from_str(&content)
                .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e))),
            None => Ok(Self::default()),
        }
    }
}
