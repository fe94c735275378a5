//! # Deterministic Tools
//!
//! Plain Rust machinery the agents lean on instead of model guesswork.
//!
//! ## Modules
//!
//! - `patch` - Atomic before/after file patching with workspace sandboxing

pub mod patch;

pub use patch::{apply_atomic_patch, compute_patched, resolve_in_workspace, FilePatch, PatchOutcome};
