//! # Keel Core
//!
//! Document-driven multi-agent pipeline: a specification becomes a master
//! document of features, natural-language commands become tasks or
//! proposals, and tasks become atomic file patches.
//!
//! ## Architecture
//!
//! - `state/` - Master document model and its file-backed store
//! - `tools/` - Atomic patch engine
//! - `models/` - Model bridge trait and backends (Gemini, script, null)
//! - `skills/` - The five agents (splitter, coordinator, proposals, worker, updater)
//! - `swarm/` - Orchestrator, events and the single-writer dispatcher
//! - `config` - Runtime paths, default actor and bridge settings
//!
//! ## Usage
//!
//! ```rust,ignore
//! use keel_core::config::PipelineConfig;
//! use keel_core::swarm::{Orchestrator, PipelineEvent};
//!
//! let config = PipelineConfig::load().await?;
//! let mut orchestrator = Orchestrator::from_config(&config);
//! orchestrator.handle_event(PipelineEvent::DocumentUploaded {
//!     project_id: "demo".into(),
//!     document_path: "spec.md".into(),
//!     uploaded_by: "ana".into(),
//! }).await?;
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod skills;
pub mod state;
pub mod swarm;
pub mod tools;

pub use error::{PipelineError, Result};
