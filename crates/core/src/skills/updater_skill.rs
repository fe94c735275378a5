//! # Document Updater Skill
//!
//! Generic whole-field updates of the master document plus an optional log
//! entry, enriched with a one-sentence model summary when one is available.
//! Updates and the log entry land in a single persisted write.

use crate::error::Result;
use crate::models::{suggest_text, ModelBridge};
use crate::skills::prompts;
use crate::state::{
    BaseApp, DocumentStore, Feature, LogDraft, MasterDocument, Proposal, Task,
};
use serde_json::Value;
use std::sync::Arc;

/// Replacement of one top-level collection or section
#[derive(Debug, Clone)]
pub enum DocumentUpdate {
    BaseApp(BaseApp),
    Features(Vec<Feature>),
    Proposals(Vec<Proposal>),
    Tasks(Vec<Task>),
}

impl DocumentUpdate {
    fn apply(self, doc: &mut MasterDocument) {
        match self {
            DocumentUpdate::BaseApp(base_app) => doc.base_app = base_app,
            DocumentUpdate::Features(features) => {
                doc.features = features.into_iter().map(|f| (f.id.clone(), f)).collect();
            }
            DocumentUpdate::Proposals(proposals) => {
                doc.proposals = proposals.into_iter().map(|p| (p.id.clone(), p)).collect();
            }
            DocumentUpdate::Tasks(tasks) => {
                doc.tasks = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
            }
        }
    }
}

/// Whether anything was changed, and the resulting document
#[derive(Debug, Clone)]
pub struct UpdaterOutput {
    pub updated: bool,
    pub document: MasterDocument,
}

/// Document Updater agent
pub struct UpdaterSkill {
    store: DocumentStore,
    bridge: Arc<dyn ModelBridge>,
}

impl UpdaterSkill {
    pub fn new(store: DocumentStore, bridge: Arc<dyn ModelBridge>) -> Self {
        Self { store, bridge }
    }

    pub async fn run(
        &self,
        updates: Vec<DocumentUpdate>,
        log: Option<LogDraft>,
    ) -> Result<UpdaterOutput> {
        let mut doc = self.store.require().await?;
        let has_updates = !updates.is_empty();

        for update in updates {
            update.apply(&mut doc);
        }

        let document = match log {
            Some(draft) => {
                let draft = self.summarize(draft).await;
                tracing::debug!(kind = draft.kind.as_str(), "Recording event");
                self.store.append_log(doc, draft).await?
            }
            None if has_updates => self.store.write(doc).await?,
            None => {
                return Ok(UpdaterOutput {
                    updated: false,
                    document: doc,
                })
            }
        };

        Ok(UpdaterOutput {
            updated: true,
            document,
        })
    }

    /// Add a `summary` to the payload when the model provides one
    async fn summarize(&self, mut draft: LogDraft) -> LogDraft {
        let payload = Value::Object(draft.payload.clone()).to_string();
        let prompt = prompts::render(
            prompts::UPDATER_SUMMARY,
            &[("kind", draft.kind.as_str()), ("payload", &payload)],
        );
        if let Some(summary) = suggest_text(self.bridge.as_ref(), &prompt).await {
            draft.payload.insert("summary".to_string(), Value::String(summary));
        }
        draft
    }
}
