//! # Document Store
//!
//! Persistence of one [`MasterDocument`] as a pretty-printed JSON file.
//!
//! Every mutator takes the prior document value and returns the updated one.
//! Each mutator performs exactly one persisted write that carries both the
//! collection change and its activity log entry.
//!
//! `write` is a compare-and-swap on [`MasterDocument::revision`]: a value read
//! before another writer persisted is rejected with
//! [`PipelineError::StaleDocument`] and nothing is written.

use super::document::{
    ActivityLogEntry, Feature, LogDraft, LogEntryKind, MasterDocument, Proposal, Task, TaskStatus,
};
use super::io::{read_optional, write_atomic};
use crate::error::{PipelineError, Result};
use chrono::Utc;
use serde_json::json;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// File-backed store for the master document
#[derive(Debug, Clone)]
pub struct DocumentStore {
    path: PathBuf,
    default_actor: String,
}

impl DocumentStore {
    pub fn new(path: impl Into<PathBuf>, default_actor: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            default_actor: default_actor.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_actor(&self) -> &str {
        &self.default_actor
    }

    /// Load the document; `None` when it has not been created yet
    pub async fn read(&self) -> Result<Option<MasterDocument>> {
        let Some(content) = read_optional(&self.path).await? else {
            return Ok(None);
        };
        let doc = serde_json::from_str(&content)?;
        Ok(Some(doc))
    }

    /// Load the document, failing when it does not exist
    pub async fn require(&self) -> Result<MasterDocument> {
        self.read()
            .await?
            .ok_or_else(|| PipelineError::MissingDocument {
                path: self.path.clone(),
            })
    }

    /// Replace whatever is on disk with a freshly split document
    ///
    /// The revision sequence continues from the document being replaced.
    pub async fn initialize(&self, mut doc: MasterDocument) -> Result<MasterDocument> {
        let on_disk = self.disk_revision().await?;
        doc.revision = on_disk.unwrap_or(0);
        self.persist(doc).await
    }

    /// Persist the full document, stamping `updated_at`
    ///
    /// Fails with `StaleDocument` when the revision on disk is not the one
    /// `doc` was read at. Within one process all writes go through the
    /// dispatcher, so the check always holds there. Across processes it is
    /// best-effort: the check and the rename are not under a file lock, and
    /// two writers racing between them can both pass.
    pub async fn write(&self, doc: MasterDocument) -> Result<MasterDocument> {
        let found = self.disk_revision().await?.unwrap_or(0);
        if found != doc.revision {
            tracing::warn!(
                path = %self.path.display(),
                expected = doc.revision,
                found,
                "Rejected stale master document write"
            );
            return Err(PipelineError::StaleDocument {
                path: self.path.clone(),
                expected: doc.revision,
                found,
            });
        }
        self.persist(doc).await
    }

    /// Append one activity log entry and persist
    pub async fn append_log(
        &self,
        mut doc: MasterDocument,
        draft: LogDraft,
    ) -> Result<MasterDocument> {
        self.push_entry(&mut doc, draft);
        self.write(doc).await
    }

    /// Insert or replace a task, logging `task_created`
    pub async fn record_task(&self, mut doc: MasterDocument, task: Task) -> Result<MasterDocument> {
        if !doc.features.contains_key(&task.feature_id) {
            return Err(PipelineError::FeatureNotFound(task.feature_id));
        }
        let draft = LogDraft::new(
            LogEntryKind::TaskCreated,
            json!({ "taskId": task.id, "featureId": task.feature_id }),
        );
        doc.tasks.insert(task.id.clone(), task);
        self.push_entry(&mut doc, draft);
        self.write(doc).await
    }

    /// Move a task to a new status
    ///
    /// Logs `task_completed` for `done` and `task_updated` otherwise.
    pub async fn update_task_status(
        &self,
        mut doc: MasterDocument,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<MasterDocument> {
        let task = doc
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| PipelineError::TaskNotFound(task_id.to_string()))?;
        task.status = status;
        task.updated_at = Utc::now();

        let kind = if status == TaskStatus::Done {
            LogEntryKind::TaskCompleted
        } else {
            LogEntryKind::TaskUpdated
        };
        self.push_entry(
            &mut doc,
            LogDraft::new(kind, json!({ "taskId": task_id, "status": status.as_str() })),
        );
        self.write(doc).await
    }

    /// Insert or replace a proposal, logging `proposal_created`
    pub async fn record_proposal(
        &self,
        mut doc: MasterDocument,
        proposal: Proposal,
    ) -> Result<MasterDocument> {
        let draft = LogDraft::new(
            LogEntryKind::ProposalCreated,
            json!({ "proposalId": proposal.id, "status": proposal.status.as_str() }),
        );
        doc.proposals.insert(proposal.id.clone(), proposal);
        self.push_entry(&mut doc, draft);
        self.write(doc).await
    }

    /// Insert or replace a feature (last write wins), logging `feature_status_changed`
    pub async fn upsert_feature(
        &self,
        mut doc: MasterDocument,
        feature: Feature,
    ) -> Result<MasterDocument> {
        let draft = LogDraft::new(
            LogEntryKind::FeatureStatusChanged,
            json!({ "featureId": feature.id, "status": feature.status.as_str() }),
        );
        doc.features.insert(feature.id.clone(), feature);
        self.push_entry(&mut doc, draft);
        self.write(doc).await
    }

    fn push_entry(&self, doc: &mut MasterDocument, draft: LogDraft) {
        let entry = ActivityLogEntry {
            id: Uuid::new_v4().to_string(),
            kind: draft.kind,
            payload: draft.payload,
            timestamp: Utc::now(),
            actor: draft.actor.unwrap_or_else(|| self.default_actor.clone()),
        };
        tracing::debug!(kind = entry.kind.as_str(), actor = %entry.actor, "Activity log entry");
        doc.activity_log.push(entry);
    }

    async fn disk_revision(&self) -> Result<Option<u64>> {
        Ok(self.read().await?.map(|doc| doc.revision))
    }

    async fn persist(&self, mut doc: MasterDocument) -> Result<MasterDocument> {
        doc.revision += 1;
        doc.updated_at = Utc::now();
        let content = serde_json::to_string_pretty(&doc)?;
        write_atomic(&self.path, &content).await?;

        tracing::info!(
            path = %self.path.display(),
            revision = doc.revision,
            features = doc.features.len(),
            tasks = doc.tasks.len(),
            log_entries = doc.activity_log.len(),
            "Master document saved"
        );
        Ok(doc)
    }
}
