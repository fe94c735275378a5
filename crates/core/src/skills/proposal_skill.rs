//! # Feature Proposal Manager Skill
//!
//! Records proposals, applies approve/reject decisions, and promotes an
//! approved proposal to a feature that shares its id.

use crate::error::{PipelineError, Result};
use crate::models::{suggest_json, ModelBridge};
use crate::skills::prompts;
use crate::state::{DocumentStore, Feature, FeatureStatus, Proposal, ProposalStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of a proposal review
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Approved,
    Rejected,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl From<DecisionStatus> for ProposalStatus {
    fn from(status: DecisionStatus) -> Self {
        match status {
            DecisionStatus::Approved => ProposalStatus::Approved,
            DecisionStatus::Rejected => ProposalStatus::Rejected,
        }
    }
}

/// A decision on a proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalDecision {
    pub status: DecisionStatus,
    pub decided_by: String,
}

/// Best-effort model refinement of a proposal
#[derive(Debug, Clone, Default, Deserialize)]
struct Refinement {
    #[serde(default)]
    refined_title: Option<String>,
    #[serde(default)]
    refined_description: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// The stored proposal and, when approved, the feature it became
#[derive(Debug, Clone, Serialize)]
pub struct ProposalOutput {
    pub proposal: Proposal,
    pub new_feature: Option<Feature>,
}

/// Feature Proposal Manager agent
pub struct ProposalSkill {
    store: DocumentStore,
    bridge: Arc<dyn ModelBridge>,
}

impl ProposalSkill {
    pub fn new(store: DocumentStore, bridge: Arc<dyn ModelBridge>) -> Self {
        Self { store, bridge }
    }

    pub async fn run(
        &self,
        proposal: Proposal,
        decision: Option<ProposalDecision>,
    ) -> Result<ProposalOutput> {
        let doc = self.store.require().await?;

        if let Some(stored) = doc.proposal(&proposal.id) {
            if stored.status.is_decided() {
                return Err(PipelineError::ProposalAlreadyDecided {
                    id: stored.id.clone(),
                    status: stored.status.as_str().to_string(),
                });
            }
        }

        let refinement = self.refine(&proposal).await.unwrap_or_default();

        let mut proposal = proposal;
        match &decision {
            Some(decision) => {
                proposal.status = decision.status.into();
                proposal.decided_by = Some(decision.decided_by.clone());
                proposal.decided_at = Some(Utc::now());
            }
            None => {
                proposal.status = ProposalStatus::AwaitingApproval;
                proposal.decided_by = None;
                proposal.decided_at = None;
            }
        }
        if let Some(title) = refinement.refined_title {
            proposal.title = title;
        }
        if let Some(description) = refinement.refined_description {
            proposal.description = description;
        }

        let doc = self.store.record_proposal(doc, proposal.clone()).await?;
        tracing::info!(
            proposal = %proposal.id,
            status = proposal.status.as_str(),
            "Proposal recorded"
        );

        if proposal.status != ProposalStatus::Approved {
            return Ok(ProposalOutput {
                proposal,
                new_feature: None,
            });
        }

        let feature = Feature::new(
            &proposal.id,
            &proposal.title,
            &proposal.description,
            FeatureStatus::Approved,
        )
        .with_tags(refinement.tags.unwrap_or_default());
        self.store.upsert_feature(doc, feature.clone()).await?;
        tracing::info!(feature = %feature.id, "Approved proposal promoted to feature");

        Ok(ProposalOutput {
            proposal,
            new_feature: Some(feature),
        })
    }

    async fn refine(&self, proposal: &Proposal) -> Option<Refinement> {
        let prompt = prompts::render(
            prompts::PROPOSAL_MANAGER,
            &[
                ("title", &proposal.title),
                ("description", &proposal.description),
            ],
        );
        suggest_json(self.bridge.as_ref(), &prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NullBridge, ScriptedBridge};
    use crate::state::{BaseApp, LogEntryKind, MasterDocument};

    async fn store(dir: &tempfile::TempDir) -> DocumentStore {
        let store = DocumentStore::new(dir.path().join("doc.json"), "keel-system");
        let doc = MasterDocument::new(
            "demo",
            "spec.md",
            BaseApp::default(),
            vec![Feature::new("feature_1", "Login", "Login", FeatureStatus::Pending)],
        );
        store.initialize(doc).await.unwrap();
        store
    }

    fn approve(by: &str) -> Option<ProposalDecision> {
        Some(ProposalDecision {
            status: DecisionStatus::Approved,
            decided_by: by.to_string(),
        })
    }

    #[tokio::test]
    async fn test_record_without_decision() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let skill = ProposalSkill::new(store.clone(), Arc::new(NullBridge));

        let out = skill
            .run(Proposal::new_feature("add dark mode", "add dark mode", "ana"), None)
            .await
            .unwrap();

        assert_eq!(out.proposal.status, ProposalStatus::AwaitingApproval);
        assert!(out.proposal.decided_at.is_none());
        assert!(out.new_feature.is_none());
        let doc = store.require().await.unwrap();
        assert_eq!(doc.proposals.len(), 1);
        assert_eq!(doc.features.len(), 1);
    }

    #[tokio::test]
    async fn test_approval_creates_feature_with_same_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let bridge = ScriptedBridge::new().reply_when(
            "Feature Proposal Manager",
            r#"{"refined_title": "Dark mode", "refined_description": "Site-wide dark theme",
                "tags": ["ui"]}"#,
        );
        let skill = ProposalSkill::new(store.clone(), Arc::new(bridge));
        let proposal = Proposal::new_feature("add dark mode", "add dark mode", "ana");
        let id = proposal.id.clone();

        let out = skill.run(proposal, approve("lead")).await.unwrap();

        let feature = out.new_feature.unwrap();
        assert_eq!(feature.id, id);
        assert_eq!(feature.status, FeatureStatus::Approved);
        assert_eq!(feature.title, "Dark mode");
        assert_eq!(feature.tags, vec!["ui"]);
        assert_eq!(out.proposal.decided_by.as_deref(), Some("lead"));

        let doc = store.require().await.unwrap();
        assert_eq!(doc.features.values().filter(|f| f.id == id).count(), 1);
        let kinds: Vec<_> = doc.activity_log.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![LogEntryKind::ProposalCreated, LogEntryKind::FeatureStatusChanged]
        );
    }

    #[tokio::test]
    async fn test_rejection_creates_no_feature() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let skill = ProposalSkill::new(store.clone(), Arc::new(NullBridge));
        let proposal = Proposal::new_feature("add chat", "add chat", "ana");
        let id = proposal.id.clone();

        let out = skill
            .run(
                proposal,
                Some(ProposalDecision {
                    status: DecisionStatus::Rejected,
                    decided_by: "lead".to_string(),
                }),
            )
            .await
            .unwrap();

        assert_eq!(out.proposal.status, ProposalStatus::Rejected);
        assert!(out.proposal.decided_at.is_some());
        assert!(store.require().await.unwrap().feature(&id).is_none());
    }

    #[tokio::test]
    async fn test_decided_proposal_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let skill = ProposalSkill::new(store.clone(), Arc::new(NullBridge));
        let proposal = Proposal::new_feature("add chat", "add chat", "ana");

        let out = skill.run(proposal, approve("lead")).await.unwrap();
        let err = skill
            .run(out.proposal.clone(), approve("lead"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::ProposalAlreadyDecided { .. }));
        let doc = store.require().await.unwrap();
        assert_eq!(doc.features.len(), 2);
    }
}
