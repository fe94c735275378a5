//! # Keel Skills
//!
//! The five pipeline agents. Each one owns a [`DocumentStore`] handle and a
//! model bridge; agents never call each other, the orchestrator sequences them.
//!
//! ## Agents
//!
//! - `SplitterSkill` - raw specification to master document
//! - `CoordinatorSkill` - route a command to a feature, a deferral, or a proposal
//! - `ProposalSkill` - record, decide and promote proposals
//! - `WorkerSkill` - apply patches for a task and complete it
//! - `UpdaterSkill` - generic field updates and summarized log entries
//!
//! [`DocumentStore`]: crate::state::DocumentStore

pub mod prompts;

pub mod coordinator_skill;
pub mod proposal_skill;
pub mod splitter_skill;
pub mod updater_skill;
pub mod worker_skill;

pub use coordinator_skill::{CoordinatorOutput, CoordinatorSkill};
pub use proposal_skill::{DecisionStatus, ProposalDecision, ProposalOutput, ProposalSkill};
pub use splitter_skill::{SplitRequest, SplitterSkill};
pub use updater_skill::{DocumentUpdate, UpdaterOutput, UpdaterSkill};
pub use worker_skill::{AppliedPatch, PatchSpec, WorkerOutput, WorkerSkill};
