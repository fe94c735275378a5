//! # Coordinator Skill
//!
//! Routes a natural-language command to one of three outcomes:
//!
//! 1. no matching feature: a `new_feature` proposal (not persisted here)
//! 2. feature awaiting approval: `implement_approved`, work deferred
//! 3. otherwise: one task recorded against the feature
//!
//! Feature resolution prefers the model's interpreted title and falls back
//! to a substring scan of the raw command.

use crate::error::Result;
use crate::models::{suggest_json, ModelBridge};
use crate::skills::prompts;
use crate::state::{
    CoordinatorDecision, DecisionAction, DocumentStore, Feature, FeatureStatus, LogDraft,
    LogEntryKind, NlpCommand, Proposal, Task, TaskStatus,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Instructions recorded when work on a feature is deferred
pub const DEFERRED_INSTRUCTIONS: &str = "Feature is awaiting approval. Worker tasks deferred.";

const TASK_TITLE_PREFIX: &str = "Implement: ";
const TASK_TITLE_CHARS: usize = 60;

/// Best-effort model reading of a command; every field optional
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Interpretation {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub feature_title: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub proposal_title: Option<String>,
    #[serde(default)]
    pub proposal_description: Option<String>,
}

/// Routing decision plus the tasks it created
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorOutput {
    pub decision: CoordinatorDecision,
    pub tasks: Vec<Task>,
}

/// Coordinator agent
pub struct CoordinatorSkill {
    store: DocumentStore,
    bridge: Arc<dyn ModelBridge>,
}

impl CoordinatorSkill {
    pub fn new(store: DocumentStore, bridge: Arc<dyn ModelBridge>) -> Self {
        Self { store, bridge }
    }

    pub async fn run(&self, command: NlpCommand) -> Result<CoordinatorOutput> {
        let doc = self.store.require().await?;
        let features: Vec<Feature> = doc.features.values().cloned().collect();

        let interpretation = self.interpret(&features, &command).await.unwrap_or_default();

        let Some(feature) = pick_feature(
            &features,
            &command.raw_text,
            interpretation.feature_title.as_deref(),
        ) else {
            let proposal = Proposal::new_feature(
                interpretation
                    .proposal_title
                    .unwrap_or_else(|| command.raw_text.clone()),
                interpretation
                    .proposal_description
                    .unwrap_or_else(|| command.raw_text.clone()),
                &command.issued_by,
            );
            tracing::info!(proposal = %proposal.id, "No matching feature, proposing a new one");
            return Ok(CoordinatorOutput {
                decision: CoordinatorDecision {
                    command,
                    action: DecisionAction::NewProposal { proposal },
                },
                tasks: Vec::new(),
            });
        };

        if feature.status == FeatureStatus::AwaitingApproval {
            tracing::info!(feature = %feature.id, "Feature awaiting approval, deferring work");
            return Ok(CoordinatorOutput {
                decision: CoordinatorDecision {
                    command,
                    action: DecisionAction::ImplementApproved {
                        feature_id: feature.id.clone(),
                        instructions: DEFERRED_INSTRUCTIONS.to_string(),
                    },
                },
                tasks: Vec::new(),
            });
        }

        let task = create_task(feature, &command);
        let doc = self.store.record_task(doc, task.clone()).await?;
        let draft = LogDraft::new(
            LogEntryKind::FeatureStatusChanged,
            json!({ "featureId": feature.id, "taskId": task.id }),
        )
        .by(&command.issued_by);
        self.store.append_log(doc, draft).await?;

        let instructions = interpretation
            .instructions
            .unwrap_or_else(|| command.raw_text.clone());
        let action = if feature.status == FeatureStatus::Approved {
            DecisionAction::ImplementApproved {
                feature_id: feature.id.clone(),
                instructions,
            }
        } else {
            DecisionAction::ModifyExisting {
                feature_id: feature.id.clone(),
                instructions,
            }
        };

        tracing::info!(
            feature = %feature.id,
            task = %task.id,
            action = action.kind(),
            "Command routed to feature"
        );
        Ok(CoordinatorOutput {
            decision: CoordinatorDecision { command, action },
            tasks: vec![task],
        })
    }

    async fn interpret(
        &self,
        features: &[Feature],
        command: &NlpCommand,
    ) -> Option<Interpretation> {
        let known = features
            .iter()
            .map(|f| format!("- {}: {}", f.title, f.description))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = prompts::render(
            prompts::COORDINATOR,
            &[("features", &known), ("command", &command.raw_text)],
        );
        suggest_json(self.bridge.as_ref(), &prompt).await
    }
}

/// Resolve the feature a command refers to; first match wins
///
/// With an interpreted title: exact case-insensitive match, then containment
/// in either direction. Otherwise (or when that finds nothing): the first
/// feature whose title occurs in the raw command.
pub fn pick_feature<'a>(
    features: &'a [Feature],
    raw_text: &str,
    target_title: Option<&str>,
) -> Option<&'a Feature> {
    if let Some(target) = target_title {
        let normalized = target.trim().to_lowercase();
        if !normalized.is_empty() {
            let exact = features
                .iter()
                .find(|f| f.title.to_lowercase() == normalized);
            let contained = || {
                features.iter().find(|f| {
                    let title = f.title.to_lowercase();
                    !title.is_empty()
                        && (normalized.contains(&title) || title.contains(&normalized))
                })
            };
            if let Some(found) = exact.or_else(contained) {
                return Some(found);
            }
        }
    }

    let text = raw_text.to_lowercase();
    features.iter().find(|f| {
        let title = f.title.to_lowercase();
        !title.is_empty() && text.contains(&title)
    })
}

/// A pending task for `feature`, assigned to the command's issuer
pub fn create_task(feature: &Feature, command: &NlpCommand) -> Task {
    let now = Utc::now();
    let short: String = command.raw_text.chars().take(TASK_TITLE_CHARS).collect();
    Task {
        id: Uuid::new_v4().to_string(),
        feature_id: feature.id.clone(),
        title: format!("{}{}", TASK_TITLE_PREFIX, short),
        description: command.raw_text.clone(),
        status: TaskStatus::Pending,
        files: Vec::new(),
        assignee: Some(command.issued_by.clone()),
        created_at: now,
        updated_at: now,
        metadata: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::models::{NullBridge, ScriptedBridge};
    use crate::state::{BaseApp, MasterDocument};

    fn features() -> Vec<Feature> {
        vec![
            Feature::new("feature_1", "Login", "Sign in", FeatureStatus::Pending),
            Feature::new("feature_2", "User Dashboard", "Stats", FeatureStatus::Approved),
            Feature::new("p-1", "Dark mode", "Theme", FeatureStatus::AwaitingApproval),
        ]
    }

    async fn store_with(dir: &tempfile::TempDir) -> DocumentStore {
        let store = DocumentStore::new(dir.path().join("doc.json"), "keel-system");
        let doc = MasterDocument::new("demo", "spec.md", BaseApp::default(), features());
        store.initialize(doc).await.unwrap();
        store
    }

    #[test]
    fn test_pick_feature_by_interpreted_title() {
        let features = features();
        let exact = pick_feature(&features, "whatever", Some("LOGIN"));
        assert_eq!(exact.map(|f| f.id.as_str()), Some("feature_1"));

        // interpreted title contains a known title
        let wider = pick_feature(&features, "whatever", Some("the login page"));
        assert_eq!(wider.map(|f| f.id.as_str()), Some("feature_1"));

        // known title contains the interpreted title
        let narrower = pick_feature(&features, "whatever", Some("dashboard"));
        assert_eq!(narrower.map(|f| f.id.as_str()), Some("feature_2"));
    }

    #[test]
    fn test_pick_feature_by_raw_text() {
        let features = features();
        let found = pick_feature(&features, "please update Login", None);
        assert_eq!(found.map(|f| f.id.as_str()), Some("feature_1"));
        assert!(pick_feature(&features, "add search", None).is_none());
        // unknown interpreted title falls back to the raw text scan
        let fallback = pick_feature(&features, "fix login", Some("Billing"));
        assert_eq!(fallback.map(|f| f.id.as_str()), Some("feature_1"));
    }

    #[test]
    fn test_task_title_is_truncated() {
        let feature = &features()[0];
        let command = NlpCommand::new("x".repeat(100), "ana");
        let task = create_task(feature, &command);
        assert_eq!(task.title.len(), TASK_TITLE_PREFIX.len() + 60);
        assert_eq!(task.description.len(), 100);
        assert_eq!(task.assignee.as_deref(), Some("ana"));
    }

    #[tokio::test]
    async fn test_pending_feature_gets_task() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir).await;
        let skill = CoordinatorSkill::new(store.clone(), Arc::new(NullBridge));

        let out = skill
            .run(NlpCommand::new("please update Login", "ana"))
            .await
            .unwrap();

        assert_eq!(out.decision.action.kind(), "modify_existing");
        assert_eq!(out.tasks.len(), 1);
        let doc = store.require().await.unwrap();
        assert_eq!(doc.tasks.len(), 1);
        let kinds: Vec<_> = doc.activity_log.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![LogEntryKind::TaskCreated, LogEntryKind::FeatureStatusChanged]
        );
        assert_eq!(doc.activity_log[1].actor, "ana");
    }

    #[tokio::test]
    async fn test_approved_feature_is_implement_approved() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir).await;
        let bridge = ScriptedBridge::new().reply_when(
            "Coordinator",
            r#"{"action": "modify_existing", "feature_title": "User Dashboard",
                "instructions": "Add a chart"}"#,
        );
        let skill = CoordinatorSkill::new(store, Arc::new(bridge));

        let out = skill
            .run(NlpCommand::new("put a chart on the stats screen", "ana"))
            .await
            .unwrap();

        assert_eq!(
            out.decision.action,
            DecisionAction::ImplementApproved {
                feature_id: "feature_2".to_string(),
                instructions: "Add a chart".to_string(),
            }
        );
        assert_eq!(out.tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_awaiting_approval_defers() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir).await;
        let skill = CoordinatorSkill::new(store.clone(), Arc::new(NullBridge));

        let out = skill
            .run(NlpCommand::new("start on dark mode", "ana"))
            .await
            .unwrap();

        assert_eq!(
            out.decision.action,
            DecisionAction::ImplementApproved {
                feature_id: "p-1".to_string(),
                instructions: DEFERRED_INSTRUCTIONS.to_string(),
            }
        );
        assert!(out.tasks.is_empty());
        assert!(store.require().await.unwrap().tasks.is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_command_proposes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir).await;
        let skill = CoordinatorSkill::new(store.clone(), Arc::new(NullBridge));

        let out = skill
            .run(NlpCommand::new("add search", "bo"))
            .await
            .unwrap();

        match &out.decision.action {
            DecisionAction::NewProposal { proposal } => {
                assert_eq!(proposal.title, "add search");
                assert_eq!(proposal.description, "add search");
                assert_eq!(proposal.created_by, "bo");
            }
            other => panic!("unexpected action {:?}", other),
        }
        let doc = store.require().await.unwrap();
        assert!(doc.proposals.is_empty());
        assert!(doc.activity_log.is_empty());
    }

    #[tokio::test]
    async fn test_started_and_finished_features_are_modified() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join("doc.json"), "keel-system");
        let features = vec![
            Feature::new("feature_1", "Billing", "Invoices", FeatureStatus::Completed),
            Feature::new("feature_2", "Search", "Full text", FeatureStatus::InProgress),
        ];
        let doc = MasterDocument::new("demo", "spec.md", BaseApp::default(), features);
        store.initialize(doc).await.unwrap();
        let skill = CoordinatorSkill::new(store.clone(), Arc::new(NullBridge));

        for (text, feature_id) in [("reopen Billing", "feature_1"), ("tune Search", "feature_2")]
        {
            let out = skill.run(NlpCommand::new(text, "ana")).await.unwrap();
            assert_eq!(
                out.decision.action,
                DecisionAction::ModifyExisting {
                    feature_id: feature_id.to_string(),
                    instructions: text.to_string(),
                }
            );
            assert_eq!(out.tasks.len(), 1);
            assert_eq!(out.tasks[0].feature_id, feature_id);
        }
        assert_eq!(store.require().await.unwrap().tasks.len(), 2);
    }

    #[tokio::test]
    async fn test_proposal_uses_interpreted_title() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir).await;
        let bridge = ScriptedBridge::new().reply_when(
            "Coordinator",
            r#"{"action": "new_feature", "proposal_title": "Dark theme",
                "proposal_description": "Site-wide dark palette"}"#,
        );
        let skill = CoordinatorSkill::new(store, Arc::new(bridge));

        let out = skill
            .run(NlpCommand::new("make everything darker please", "bo"))
            .await
            .unwrap();

        match &out.decision.action {
            DecisionAction::NewProposal { proposal } => {
                assert_eq!(proposal.title, "Dark theme");
                assert_eq!(proposal.description, "Site-wide dark palette");
                assert_eq!(proposal.created_by, "bo");
            }
            other => panic!("unexpected action {:?}", other),
        }
        assert!(out.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_missing_document_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join("none.json"), "keel-system");
        let err = CoordinatorSkill::new(store, Arc::new(NullBridge))
            .run(NlpCommand::new("anything", "ana"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingDocument { .. }));
    }
}
