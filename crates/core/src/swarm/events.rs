//! # Pipeline Events
//!
//! Inbound events that drive the orchestrator, and the outbound progress
//! events it emits while agents run.

use crate::skills::DecisionStatus;
use crate::state::NlpCommand;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// An external event, tagged by `type`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A specification document was uploaded
    DocumentUploaded {
        #[serde(rename = "projectId")]
        project_id: String,
        #[serde(rename = "documentPath")]
        document_path: PathBuf,
        #[serde(rename = "uploadedBy")]
        uploaded_by: String,
    },
    /// A natural-language change request arrived
    NlpCommandReceived { command: NlpCommand },
    /// A proposal was approved or rejected
    ProposalDecided {
        #[serde(rename = "proposalId")]
        proposal_id: String,
        status: DecisionStatus,
        decided_by: String,
    },
    /// Someone asked to (re)implement an existing feature
    FeatureRun {
        #[serde(rename = "featureId")]
        feature_id: String,
        #[serde(rename = "issuedBy")]
        issued_by: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        instructions: Option<String>,
    },
}

impl PipelineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DocumentUploaded { .. } => "document_uploaded",
            Self::NlpCommandReceived { .. } => "nlp_command_received",
            Self::ProposalDecided { .. } => "proposal_decided",
            Self::FeatureRun { .. } => "feature_run",
        }
    }
}

/// Kind of progress event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventKind {
    /// Orchestrator accepted an inbound event
    EventReceived,
    /// Agent started working
    AgentStarted,
    /// Agent completed successfully
    AgentCompleted,
    /// Agent failed
    AgentFailed,
    /// A task was handed to the worker
    TaskDispatched,
    /// A patch was written
    PatchApplied,
    /// Inbound event fully handled
    EventCompleted,
    /// Inbound event aborted with an error
    EventFailed,
}

/// A progress event emitted by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: AgentEventKind,
    /// Agent (or "orchestrator") that produced this event
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl AgentEvent {
    pub fn new(kind: AgentEventKind, agent: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            agent: agent.to_string(),
            data: None,
        }
    }

    /// Add data to the event
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
