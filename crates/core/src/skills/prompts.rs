//! Default prompt templates bundled at compile time.
//!
//! Templates use `{{name}}` placeholders filled by [`render`].

/// Document Splitter - structures a raw specification
pub const SPLITTER: &str = include_str!("defaults/splitter.md");

/// Coordinator - routes a command to a feature or a proposal
pub const COORDINATOR: &str = include_str!("defaults/coordinator.md");

/// Feature Proposal Manager - refines a proposal
pub const PROPOSAL_MANAGER: &str = include_str!("defaults/proposal_manager.md");

/// Worker - generates atomic patches for a task
pub const WORKER_PATCHES: &str = include_str!("defaults/worker_patches.md");

/// Worker - summarizes applied changes
pub const WORKER_SUMMARY: &str = include_str!("defaults/worker_summary.md");

/// Document Updater - one-sentence event summary
pub const UPDATER_SUMMARY: &str = include_str!("defaults/updater_summary.md");

/// Fill `{{name}}` placeholders; unknown placeholders are left as-is
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.trim_end().to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{{{}}}}}", name), value);
    }
    out
}
