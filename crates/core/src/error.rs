//! # Pipeline Errors
//!
//! One error type for every fatal outcome of the pipeline. Model-bridge
//! failures never appear here: they are logged and treated as "no result".

use std::path::PathBuf;
use thiserror::Error;

/// Result type for Keel core operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Unified error type for the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The master document has not been created yet
    #[error("Master document missing at {}. Run the document splitter first.", path.display())]
    MissingDocument { path: PathBuf },

    /// A feature id referenced by a caller does not exist
    #[error("Feature {0} not found")]
    FeatureNotFound(String),

    /// A task id referenced by a caller does not exist
    #[error("Task {0} not found")]
    TaskNotFound(String),

    /// A proposal id referenced by a caller does not exist
    #[error("Proposal {0} not found")]
    ProposalNotFound(String),

    /// Decisions are terminal
    #[error("Proposal {id} was already decided as {status}")]
    ProposalAlreadyDecided { id: String, status: String },

    /// The `before` context of a patch is absent from the target file
    #[error("Patch validation failed for {}. Context not found.", file.display())]
    PatchValidation { file: PathBuf },

    /// A patch names neither an explicit nor a relative target
    #[error("Patch #{index} has no target file")]
    PatchTargetMissing { index: usize },

    /// A relative patch path resolves outside the workspace root
    #[error("Patch path {} escapes workspace root {}", path.display(), root.display())]
    PatchOutsideWorkspace { path: PathBuf, root: PathBuf },

    /// Another writer persisted the document since this value was read
    #[error(
        "Stale write to {}: expected revision {expected}, found {found}",
        path.display()
    )]
    StaleDocument {
        path: PathBuf,
        expected: u64,
        found: u64,
    },

    /// I/O failure on a specific path
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The orchestrator task is gone
    #[error("Orchestrator dispatcher has shut down")]
    DispatcherClosed,
}

impl PipelineError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_error_names_file() {
        let err = PipelineError::PatchValidation {
            file: PathBuf::from("/tmp/app/src/main.tsx"),
        };
        assert!(err.to_string().contains("/tmp/app/src/main.tsx"));
    }

    #[test]
    fn test_missing_document_message() {
        let err = PipelineError::MissingDocument {
            path: PathBuf::from(".keel/master-document.json"),
        };
        assert!(err.to_string().contains("Run the document splitter first"));
    }
}
