pub mod document;
pub mod io;
pub mod store;

pub use document::{
    ActivityLogEntry, BaseApp, CoordinatorDecision, DecisionAction, Feature, FeatureStatus,
    LogDraft, LogEntryKind, MasterDocument, NlpCommand, Payload, Proposal, ProposalKind,
    ProposalStatus, Task, TaskStatus,
};
pub use store::DocumentStore;
