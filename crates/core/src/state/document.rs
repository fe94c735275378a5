//! # Master Document
//!
//! The single persisted ledger of a project: base application, features,
//! proposals, tasks and the activity log.
//!
//! Features, proposals and tasks are insertion-ordered maps keyed by id.
//! On disk they stay JSON arrays, so "replace existing else append" is a
//! map insert instead of a scan-filter-append over a list.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Free-form key/value payload of a log entry or task metadata
pub type Payload = Map<String, Value>;

/// Status of a feature
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    #[default]
    Pending,
    InProgress,
    /// Blocks task creation until a decision arrives
    AwaitingApproval,
    Approved,
    Rejected,
    Completed,
}

impl FeatureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        }
    }
}

/// Status of a task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Blocked,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Blocked => "blocked",
            Self::Done => "done",
        }
    }
}

/// Status of a proposal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    #[default]
    AwaitingApproval,
    Approved,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingApproval => "awaiting_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// `approved` and `rejected` are terminal
    pub fn is_decided(&self) -> bool {
        !matches!(self, Self::AwaitingApproval)
    }
}

/// Kind of proposal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    #[default]
    NewFeature,
}

/// Kind of activity log entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryKind {
    DocumentSplit,
    ProposalCreated,
    ProposalUpdated,
    TaskCreated,
    TaskCompleted,
    /// Task status change other than completion
    TaskUpdated,
    FeatureStatusChanged,
}

impl LogEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentSplit => "document_split",
            Self::ProposalCreated => "proposal_created",
            Self::ProposalUpdated => "proposal_updated",
            Self::TaskCreated => "task_created",
            Self::TaskCompleted => "task_completed",
            Self::TaskUpdated => "task_updated",
            Self::FeatureStatusChanged => "feature_status_changed",
        }
    }
}

/// Description of the base application extracted from the uploaded spec
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BaseApp {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub architecture: Vec<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub key_routes: Vec<String>,
}

/// A unit of product functionality
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feature {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: FeatureStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl Feature {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        status: FeatureStatus,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            status,
            owner: None,
            tags: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// A unit of executable work tied to one feature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub feature_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// May carry precomputed patches under `patches`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Payload>,
}

/// A candidate new feature awaiting a decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Proposal {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: ProposalKind,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub created_by: String,
    #[serde(default)]
    pub status: ProposalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

impl Proposal {
    /// A fresh `new_feature` proposal awaiting approval
    pub fn new_feature(
        title: impl Into<String>,
        description: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: ProposalKind::NewFeature,
            title: title.into(),
            description: description.into(),
            created_by: created_by.into(),
            status: ProposalStatus::AwaitingApproval,
            decided_by: None,
            decided_at: None,
        }
    }
}

/// Immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityLogEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: LogEntryKind,
    #[serde(default)]
    pub payload: Payload,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
}

/// A log entry before the store assigns id, timestamp and (default) actor
#[derive(Debug, Clone, PartialEq)]
pub struct LogDraft {
    pub kind: LogEntryKind,
    pub payload: Payload,
    pub actor: Option<String>,
}

impl LogDraft {
    /// Build a draft from a JSON object; non-object values yield an empty payload
    pub fn new(kind: LogEntryKind, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Payload::new(),
        };
        Self {
            kind,
            payload,
            actor: None,
        }
    }

    pub fn by(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// Anything stored in an id-keyed collection
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Feature {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Task {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Proposal {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Serialize an id-keyed map as a JSON array in insertion order
mod keyed_list {
    use super::Keyed;
    use indexmap::IndexMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, T>(map: &IndexMap<String, T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<IndexMap<String, T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Keyed,
    {
        let items = Vec::<T>::deserialize(deserializer)?;
        Ok(items
            .into_iter()
            .map(|item| (item.key().to_string(), item))
            .collect())
    }
}

/// The single source of truth per project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MasterDocument {
    pub project_id: String,
    pub source_document_path: String,
    #[serde(default)]
    pub base_app: BaseApp,
    #[serde(default, with = "keyed_list")]
    pub features: IndexMap<String, Feature>,
    #[serde(default, with = "keyed_list")]
    pub proposals: IndexMap<String, Proposal>,
    #[serde(default, with = "keyed_list")]
    pub tasks: IndexMap<String, Task>,
    #[serde(default)]
    pub activity_log: Vec<ActivityLogEntry>,
    pub updated_at: DateTime<Utc>,
    /// Write counter used for compare-and-swap persistence
    #[serde(default)]
    pub revision: u64,
}

impl MasterDocument {
    /// A fresh document with empty proposals, tasks and log
    pub fn new(
        project_id: impl Into<String>,
        source_document_path: impl Into<String>,
        base_app: BaseApp,
        features: Vec<Feature>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            source_document_path: source_document_path.into(),
            base_app,
            features: features
                .into_iter()
                .map(|feature| (feature.id.clone(), feature))
                .collect(),
            proposals: IndexMap::new(),
            tasks: IndexMap::new(),
            activity_log: Vec::new(),
            updated_at: Utc::now(),
            revision: 0,
        }
    }

    pub fn feature(&self, id: &str) -> Option<&Feature> {
        self.features.get(id)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn proposal(&self, id: &str) -> Option<&Proposal> {
        self.proposals.get(id)
    }

    /// Log entries of one kind, oldest first
    pub fn entries_of(&self, kind: LogEntryKind) -> impl Iterator<Item = &ActivityLogEntry> {
        self.activity_log
            .iter()
            .filter(move |entry| entry.kind == kind)
    }
}

/// A natural-language change request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NlpCommand {
    pub command_id: String,
    pub raw_text: String,
    pub issued_by: String,
    pub issued_at: DateTime<Utc>,
}

impl NlpCommand {
    pub fn new(raw_text: impl Into<String>, issued_by: impl Into<String>) -> Self {
        Self {
            command_id: Uuid::new_v4().to_string(),
            raw_text: raw_text.into(),
            issued_by: issued_by.into(),
            issued_at: Utc::now(),
        }
    }
}

/// What the coordinator decided to do with a command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecisionAction {
    ModifyExisting {
        feature_id: String,
        instructions: String,
    },
    ImplementApproved {
        feature_id: String,
        instructions: String,
    },
    NewProposal {
        proposal: Proposal,
    },
}

impl DecisionAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModifyExisting { .. } => "modify_existing",
            Self::ImplementApproved { .. } => "implement_approved",
            Self::NewProposal { .. } => "new_proposal",
        }
    }

    /// Feature targeted by the decision, if any
    pub fn feature_id(&self) -> Option<&str> {
        match self {
            Self::ModifyExisting { feature_id, .. }
            | Self::ImplementApproved { feature_id, .. } => Some(feature_id),
            Self::NewProposal { .. } => None,
        }
    }
}

/// A command paired with its routing decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoordinatorDecision {
    pub command: NlpCommand,
    pub action: DecisionAction,
}
