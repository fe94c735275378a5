//! # Document Splitter Skill
//!
//! Turns a raw specification document into a fresh [`MasterDocument`].
//!
//! A model-backed structuring call is tried first. Without a model (or when
//! its reply is unusable) local heuristics take over:
//!
//! - `summary` is the first paragraph
//! - `architecture` is every paragraph mentioning architecture or stack
//! - `tech_stack` is every known stack keyword found in the text
//! - `key_routes` is every line starting with `/` or `GET`
//! - one feature per leading-dash bullet, or a single placeholder feature

use crate::error::{PipelineError, Result};
use crate::models::{suggest_json, ModelBridge};
use crate::skills::prompts;
use crate::state::{
    BaseApp, DocumentStore, Feature, FeatureStatus, LogDraft, LogEntryKind, MasterDocument,
};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

/// Stack keywords in their canonical spelling
pub const STACK_KEYWORDS: [&str; 10] = [
    "React", "Next.js", "Vue", "Angular", "Supabase", "Firebase", "Postgres", "Node", "Python",
    "Go",
];

pub const PLACEHOLDER_FEATURE_TITLE: &str = "Initial feature";
pub const PLACEHOLDER_FEATURE_DESCRIPTION: &str = "Placeholder extracted feature.";
const NO_SUMMARY: &str = "No summary found";

/// Input for one split
#[derive(Debug, Clone)]
pub struct SplitRequest {
    pub project_id: String,
    pub document_path: PathBuf,
    pub uploaded_by: String,
}

/// Feature as returned by the model, before ids are assigned
#[derive(Debug, Clone, Deserialize)]
struct DraftFeature {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct StructuredSpec {
    #[serde(default)]
    base_app: Option<BaseApp>,
    #[serde(default)]
    features: Vec<DraftFeature>,
}

/// Document Splitter agent
pub struct SplitterSkill {
    store: DocumentStore,
    bridge: Arc<dyn ModelBridge>,
}

impl SplitterSkill {
    pub fn new(store: DocumentStore, bridge: Arc<dyn ModelBridge>) -> Self {
        Self { store, bridge }
    }

    /// Read the specification, structure it, and persist a fresh master document
    pub async fn run(&self, request: &SplitRequest) -> Result<MasterDocument> {
        let source = tokio::fs::read_to_string(&request.document_path)
            .await
            .map_err(|e| PipelineError::io(&request.document_path, e))?;

        let chunks = split_chunks(&source);
        let lines = split_lines(&source);

        let structured = self.structure_with_model(&source).await;
        let (base_app, features) = match structured {
            Some(spec) => {
                let base_app = spec
                    .base_app
                    .unwrap_or_else(|| infer_base_app(&chunks, &lines));
                let features = if spec.features.is_empty() {
                    tracing::warn!("Model returned no features, using bullet heuristics");
                    infer_features(&lines)
                } else {
                    number_features(spec.features)
                };
                (base_app, features)
            }
            None => (infer_base_app(&chunks, &lines), infer_features(&lines)),
        };

        let feature_count = features.len();
        let doc = MasterDocument::new(
            &request.project_id,
            request.document_path.to_string_lossy(),
            base_app,
            features,
        );

        let doc = self.store.initialize(doc).await?;
        let draft = LogDraft::new(
            LogEntryKind::DocumentSplit,
            json!({
                "projectId": request.project_id,
                "featureCount": feature_count,
                "storagePath": self.store.path().to_string_lossy(),
            }),
        )
        .by(&request.uploaded_by);
        let doc = self.store.append_log(doc, draft).await?;

        tracing::info!(
            project = %request.project_id,
            features = feature_count,
            "Specification split into master document"
        );
        Ok(doc)
    }

    async fn structure_with_model(&self, source: &str) -> Option<StructuredSpec> {
        let prompt = prompts::render(prompts::SPLITTER, &[("source", source)]);
        suggest_json(self.bridge.as_ref(), &prompt).await
    }
}

fn number_features(drafts: Vec<DraftFeature>) -> Vec<Feature> {
    drafts
        .into_iter()
        .enumerate()
        .map(|(idx, draft)| {
            Feature::new(
                format!("feature_{}", idx + 1),
                draft.title,
                draft.description,
                FeatureStatus::Pending,
            )
            .with_tags(draft.tags)
        })
        .collect()
}

/// Blank-line separated paragraphs, trimmed
pub fn split_chunks(source: &str) -> Vec<String> {
    let Ok(blank) = Regex::new(r"\n\s*\n") else {
        return vec![source.trim().to_string()];
    };
    blank
        .split(source)
        .map(|chunk| chunk.trim().to_string())
        .collect()
}

/// Every line, trimmed
pub fn split_lines(source: &str) -> Vec<String> {
    source.split('\n').map(|line| line.trim().to_string()).collect()
}

/// Base application description from paragraphs and lines
pub fn infer_base_app(chunks: &[String], lines: &[String]) -> BaseApp {
    let summary = chunks
        .first()
        .cloned()
        .unwrap_or_else(|| NO_SUMMARY.to_string());

    let architecture: Vec<String> = match Regex::new(r"(?i)architecture|stack") {
        Ok(re) => chunks
            .iter()
            .filter(|chunk| re.is_match(chunk))
            .cloned()
            .collect(),
        Err(_) => Vec::new(),
    };

    let key_routes = lines
        .iter()
        .filter(|line| line.starts_with('/') || line.starts_with("GET"))
        .cloned()
        .collect();

    BaseApp {
        architecture: if architecture.is_empty() {
            vec![summary.clone()]
        } else {
            architecture
        },
        tech_stack: detect_tech_stack(&chunks.join(" ")),
        key_routes,
        summary,
    }
}

/// Known stack keywords in order of first occurrence, canonical spelling, no duplicates
///
/// A keyword matches at the start of any word, so `PostgreSQL` yields `Postgres`.
pub fn detect_tech_stack(text: &str) -> Vec<String> {
    let alternatives = STACK_KEYWORDS
        .iter()
        .map(|keyword| regex::escape(keyword))
        .collect::<Vec<_>>()
        .join("|");
    let Ok(re) = Regex::new(&format!(r"(?i)\b(?:{})", alternatives)) else {
        return Vec::new();
    };

    let mut found: Vec<String> = Vec::new();
    for m in re.find_iter(text) {
        let canonical = STACK_KEYWORDS
            .iter()
            .find(|keyword| keyword.eq_ignore_ascii_case(m.as_str()));
        if let Some(keyword) = canonical {
            if !found.iter().any(|existing| existing == keyword) {
                found.push(keyword.to_string());
            }
        }
    }
    found
}

/// One pending feature per dash bullet; never empty
pub fn infer_features(lines: &[String]) -> Vec<Feature> {
    let bullets: Vec<String> = match Regex::new(r"^-+\s*(.+)") {
        Ok(re) => lines
            .iter()
            .filter_map(|line| re.captures(line))
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
            .filter(|title| !title.is_empty() && !title.chars().all(|c| c == '-'))
            .collect(),
        Err(_) => Vec::new(),
    };

    if bullets.is_empty() {
        return vec![Feature::new(
            "feature_1",
            PLACEHOLDER_FEATURE_TITLE,
            PLACEHOLDER_FEATURE_DESCRIPTION,
            FeatureStatus::Pending,
        )];
    }

    bullets
        .into_iter()
        .enumerate()
        .map(|(idx, title)| {
            Feature::new(
                format!("feature_{}", idx + 1),
                title.clone(),
                title,
                FeatureStatus::Pending,
            )
        })
        .collect()
}
