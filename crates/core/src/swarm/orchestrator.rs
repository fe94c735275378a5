//! # Orchestrator
//!
//! The top-level control loop. One inbound [`PipelineEvent`] is handled to
//! completion, agent by agent, before the next one starts.
//!
//! ```text
//! document_uploaded    → Splitter → Updater(document_split) → bootstrap run
//! nlp_command_received → Coordinator ─┬─ new_proposal → ProposalManager
//!                                     │                  → Updater(proposal_created)
//!                                     └─ tasks → Worker (in order)
//! proposal_decided     → ProposalManager(decision) → Updater(proposal_updated)
//! feature_run          → synthetic command → nlp_command_received
//! ```

use super::events::{AgentEvent, AgentEventKind, PipelineEvent};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::models::ModelBridge;
use crate::skills::{
    CoordinatorOutput, CoordinatorSkill, DecisionStatus, PatchSpec, ProposalDecision,
    ProposalOutput, ProposalSkill, SplitRequest, SplitterSkill, UpdaterSkill, WorkerOutput,
    WorkerSkill,
};
use crate::state::{
    CoordinatorDecision, DecisionAction, DocumentStore, LogDraft, LogEntryKind, MasterDocument,
    NlpCommand, Task,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

const BOOTSTRAP_HEADER: &str =
    "Build the base vibe-coding application scaffolding according to the uploaded specification.";

/// Result of routing one command
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    pub decision: CoordinatorDecision,
    pub tasks: Vec<Task>,
    /// Worker results, one per dispatched task
    pub work: Vec<WorkerOutput>,
}

/// Result of handling one inbound event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventOutcome {
    DocumentSplit { document: MasterDocument },
    Command(CommandOutcome),
    ProposalDecided(ProposalOutput),
}

/// Sequences the agents for each inbound event
pub struct Orchestrator {
    store: DocumentStore,
    splitter: SplitterSkill,
    coordinator: CoordinatorSkill,
    proposals: ProposalSkill,
    worker: WorkerSkill,
    updater: UpdaterSkill,
    event_tx: Option<mpsc::Sender<AgentEvent>>,
}

impl Orchestrator {
    /// Wire every agent to the same store and bridge
    pub fn new(
        store: DocumentStore,
        bridge: Arc<dyn ModelBridge>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            splitter: SplitterSkill::new(store.clone(), bridge.clone()),
            coordinator: CoordinatorSkill::new(store.clone(), bridge.clone()),
            proposals: ProposalSkill::new(store.clone(), bridge.clone()),
            worker: WorkerSkill::new(store.clone(), bridge.clone(), workspace_root),
            updater: UpdaterSkill::new(store.clone(), bridge),
            store,
            event_tx: None,
        }
    }

    /// Build from configuration, creating the configured model bridge
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.store(),
            config.model.create_bridge(),
            &config.workspace_root,
        )
    }

    /// Set the channel progress events are sent to
    pub fn with_event_channel(mut self, tx: mpsc::Sender<AgentEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    async fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Report how an agent call ended
    async fn finish<T>(&self, agent: &str, result: &Result<T>) {
        let event = match result {
            Ok(_) => AgentEvent::new(AgentEventKind::AgentCompleted, agent),
            Err(e) => AgentEvent::new(AgentEventKind::AgentFailed, agent)
                .with_data(json!({ "error": e.to_string() })),
        };
        self.emit(event).await;
    }

    /// Handle one inbound event to completion
    #[tracing::instrument(skip(self, event), fields(event = event.kind()))]
    pub async fn handle_event(&mut self, event: PipelineEvent) -> Result<EventOutcome> {
        let kind = event.kind();
        self.emit(AgentEvent::new(AgentEventKind::EventReceived, "orchestrator")
            .with_data(json!({ "event": kind })))
            .await;

        let result = match event {
            PipelineEvent::DocumentUploaded {
                project_id,
                document_path,
                uploaded_by,
            } => self
                .handle_document_upload(SplitRequest {
                    project_id,
                    document_path,
                    uploaded_by,
                })
                .await
                .map(|document| EventOutcome::DocumentSplit { document }),
            PipelineEvent::NlpCommandReceived { command } => {
                self.handle_nlp_command(command).await.map(EventOutcome::Command)
            }
            PipelineEvent::ProposalDecided {
                proposal_id,
                status,
                decided_by,
            } => self
                .handle_proposal_decision(&proposal_id, status, &decided_by)
                .await
                .map(EventOutcome::ProposalDecided),
            PipelineEvent::FeatureRun {
                feature_id,
                issued_by,
                instructions,
            } => self
                .handle_feature_run(&feature_id, &issued_by, instructions.as_deref())
                .await
                .map(EventOutcome::Command),
        };

        match &result {
            Ok(_) => {
                self.emit(AgentEvent::new(AgentEventKind::EventCompleted, "orchestrator")
                    .with_data(json!({ "event": kind })))
                    .await;
            }
            Err(e) => {
                tracing::warn!(event = kind, error = %e, "Event failed");
                self.emit(AgentEvent::new(AgentEventKind::EventFailed, "orchestrator")
                    .with_data(json!({ "event": kind, "error": e.to_string() })))
                    .await;
            }
        }
        result
    }

    /// Split the uploaded document, log it, and bootstrap the base application
    #[tracing::instrument(skip(self, request), fields(project = %request.project_id))]
    pub async fn handle_document_upload(
        &mut self,
        request: SplitRequest,
    ) -> Result<MasterDocument> {
        self.emit(AgentEvent::new(AgentEventKind::AgentStarted, "splitter")).await;
        let result = self.splitter.run(&request).await;
        self.finish("splitter", &result).await;
        let master = result?;

        self.updater
            .run(
                Vec::new(),
                Some(
                    LogDraft::new(
                        LogEntryKind::DocumentSplit,
                        json!({
                            "projectId": request.project_id,
                            "features": master.features.len(),
                        }),
                    )
                    .by(&request.uploaded_by),
                ),
            )
            .await?;

        self.bootstrap_base_application(&master, &request.uploaded_by)
            .await?;

        self.store.require().await
    }

    /// Route a command; persist a proposal or dispatch the created tasks
    #[tracing::instrument(skip(self, command), fields(command_id = %command.command_id))]
    pub async fn handle_nlp_command(&mut self, command: NlpCommand) -> Result<CommandOutcome> {
        let issued_by = command.issued_by.clone();

        self.emit(AgentEvent::new(AgentEventKind::AgentStarted, "coordinator")).await;
        let result = self.coordinator.run(command).await;
        self.finish("coordinator", &result).await;
        let CoordinatorOutput { decision, tasks } = result?;
        tracing::info!(
            action = decision.action.kind(),
            feature = decision.action.feature_id().unwrap_or("-"),
            tasks = tasks.len(),
            "Command routed"
        );

        if let DecisionAction::NewProposal { proposal } = &decision.action {
            self.emit(AgentEvent::new(AgentEventKind::AgentStarted, "proposal_manager")).await;
            let result = self.proposals.run(proposal.clone(), None).await;
            self.finish("proposal_manager", &result).await;
            result?;

            self.updater
                .run(
                    Vec::new(),
                    Some(
                        LogDraft::new(
                            LogEntryKind::ProposalCreated,
                            json!({ "proposalId": proposal.id }),
                        )
                        .by(&issued_by),
                    ),
                )
                .await?;

            return Ok(CommandOutcome {
                decision,
                tasks,
                work: Vec::new(),
            });
        }

        let work = self.dispatch_tasks(&tasks).await?;
        Ok(CommandOutcome {
            decision,
            tasks,
            work,
        })
    }

    /// Run the worker for each task in order; metadata patches pass through
    pub async fn dispatch_tasks(&mut self, tasks: &[Task]) -> Result<Vec<WorkerOutput>> {
        let mut outputs = Vec::with_capacity(tasks.len());
        for task in tasks {
            let patches = PatchSpec::from_task_metadata(task)?;

            self.emit(AgentEvent::new(AgentEventKind::TaskDispatched, "orchestrator")
                .with_data(json!({ "taskId": task.id, "featureId": task.feature_id })))
                .await;
            self.emit(AgentEvent::new(AgentEventKind::AgentStarted, "worker")).await;
            let result = self.worker.run(task, patches).await;
            self.finish("worker", &result).await;
            let output = result?;

            for applied in &output.applied {
                self.emit(AgentEvent::new(AgentEventKind::PatchApplied, "worker").with_data(json!({
                    "taskId": task.id,
                    "file": applied.file.to_string_lossy(),
                    "outcome": applied.outcome.as_str(),
                })))
                .await;
            }
            outputs.push(output);
        }
        Ok(outputs)
    }

    /// Apply a decision to a stored proposal and log it
    #[tracing::instrument(skip(self))]
    pub async fn handle_proposal_decision(
        &mut self,
        proposal_id: &str,
        status: DecisionStatus,
        decided_by: &str,
    ) -> Result<ProposalOutput> {
        let doc = self.store.require().await?;
        let proposal = doc
            .proposal(proposal_id)
            .cloned()
            .ok_or_else(|| PipelineError::ProposalNotFound(proposal_id.to_string()))?;

        self.emit(AgentEvent::new(AgentEventKind::AgentStarted, "proposal_manager")).await;
        let result = self
            .proposals
            .run(
                proposal,
                Some(ProposalDecision {
                    status,
                    decided_by: decided_by.to_string(),
                }),
            )
            .await;
        self.finish("proposal_manager", &result).await;
        let output = result?;

        self.updater
            .run(
                Vec::new(),
                Some(
                    LogDraft::new(
                        LogEntryKind::ProposalUpdated,
                        json!({ "proposalId": proposal_id, "status": status.as_str() }),
                    )
                    .by(decided_by),
                ),
            )
            .await?;

        Ok(output)
    }

    /// Turn a feature into a synthetic implementation command
    #[tracing::instrument(skip(self, instructions))]
    pub async fn handle_feature_run(
        &mut self,
        feature_id: &str,
        issued_by: &str,
        instructions: Option<&str>,
    ) -> Result<CommandOutcome> {
        let doc = self.store.require().await?;
        let feature = doc
            .feature(feature_id)
            .ok_or_else(|| PipelineError::FeatureNotFound(feature_id.to_string()))?;

        let command = NlpCommand::new(
            feature_run_text(&feature.title, &feature.description, instructions),
            issued_by,
        );
        self.handle_nlp_command(command).await
    }

    async fn bootstrap_base_application(
        &mut self,
        master: &MasterDocument,
        actor: &str,
    ) -> Result<()> {
        let base = &master.base_app;
        if base.summary.is_empty() {
            return Ok(());
        }

        let instructions = [
            BOOTSTRAP_HEADER.to_string(),
            format!("Summary: {}", base.summary),
            format!("Architecture: {}", base.architecture.join(", ")),
            format!("Tech Stack: {}", base.tech_stack.join(", ")),
            format!("Key Routes: {}", base.key_routes.join(", ")),
        ]
        .join("\n");

        let Some(feature_id) = master.features.keys().next() else {
            return Ok(());
        };
        tracing::info!(feature = %feature_id, "Bootstrapping base application");
        self.handle_feature_run(feature_id, actor, Some(&instructions))
            .await?;
        Ok(())
    }
}

/// Command text for running a feature, with optional extra instructions
pub fn feature_run_text(title: &str, description: &str, instructions: Option<&str>) -> String {
    let extra = match instructions {
        Some(extra) if !extra.trim().is_empty() => format!("\nAdditional instructions:\n{}", extra),
        _ => String::new(),
    };
    format!(
        "Implement feature \"{}\" described as: {}.{}",
        title, description, extra
    )
}
