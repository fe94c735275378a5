//! # Pipeline Orchestration
//!
//! Sequences the agents per inbound event.
//!
//! ## Event Flow
//!
//! ```text
//! external event → Orchestrator → agents → DocumentStore mutation → activity log
//! ```

pub mod dispatcher;
pub mod events;
pub mod orchestrator;

pub use dispatcher::{spawn_orchestrator, Job, OrchestratorHandle};
pub use events::{AgentEvent, AgentEventKind, PipelineEvent};
pub use orchestrator::{feature_run_text, CommandOutcome, EventOutcome, Orchestrator};
