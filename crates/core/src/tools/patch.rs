//! # Atomic Patch Engine
//!
//! Applies one before/after text substitution to one file.
//!
//! | Target file | `before`   | Result                              |
//! |-------------|------------|-------------------------------------|
//! | missing     | ignored    | content = `after`                   |
//! | exists      | empty      | existing + `"\n"` + `after`         |
//! | exists      | found      | first occurrence replaced           |
//! | exists      | not found  | `PatchValidation`, nothing written  |
//!
//! The new content is computed in memory and written in one temp-file +
//! rename step, so a failed patch never leaves a partial file behind. A
//! symlinked target is resolved first and the file behind it is patched,
//! keeping its permissions.

use crate::error::{PipelineError, Result};
use crate::state::io::{read_optional, write_atomic_with_permissions};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// A before/after substitution against an absolute target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilePatch {
    pub file: PathBuf,
    #[serde(default)]
    pub before: String,
    #[serde(default)]
    pub after: String,
}

impl FilePatch {
    pub fn new(
        file: impl Into<PathBuf>,
        before: impl Into<String>,
        after: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            before: before.into(),
            after: after.into(),
        }
    }
}

/// What applying a patch did to its target
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PatchOutcome {
    /// File did not exist and now holds `after`
    Created,
    /// `after` was appended on a new line
    Appended,
    /// First occurrence of `before` was replaced
    Replaced,
}

impl PatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Appended => "appended",
            Self::Replaced => "replaced",
        }
    }
}

/// Compute the patched content without touching the file system
///
/// `existing` is `None` when the target does not exist. An existing empty
/// file counts as existing.
pub fn compute_patched(
    existing: Option<&str>,
    patch: &FilePatch,
) -> Result<(String, PatchOutcome)> {
    let Some(existing) = existing else {
        return Ok((patch.after.clone(), PatchOutcome::Created));
    };

    if patch.before.is_empty() {
        return Ok((format!("{}\n{}", existing, patch.after), PatchOutcome::Appended));
    }

    if existing.contains(&patch.before) {
        return Ok((
            existing.replacen(&patch.before, &patch.after, 1),
            PatchOutcome::Replaced,
        ));
    }

    Err(PipelineError::PatchValidation {
        file: patch.file.clone(),
    })
}

/// Apply one patch to disk, creating parent directories as needed
pub async fn apply_atomic_patch(patch: &FilePatch) -> Result<PatchOutcome> {
    let target = resolve_target(&patch.file).await?;
    let existing = read_optional(&target).await?;
    let (content, outcome) = compute_patched(existing.as_deref(), patch)?;

    let permissions = match existing {
        Some(_) => Some(
            fs::metadata(&target)
                .await
                .map_err(|e| PipelineError::io(&target, e))?
                .permissions(),
        ),
        None => None,
    };
    write_atomic_with_permissions(&target, &content, permissions).await?;

    tracing::info!(
        file = %patch.file.display(),
        outcome = outcome.as_str(),
        bytes = content.len(),
        "Patch applied"
    );
    Ok(outcome)
}

/// The real file behind `path`; a missing target is returned unchanged
async fn resolve_target(path: &Path) -> Result<PathBuf> {
    match fs::canonicalize(path).await {
        Ok(real) => Ok(real),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(path.to_path_buf()),
        Err(e) => Err(PipelineError::io(path, e)),
    }
}

/// Resolve a workspace-relative path, refusing anything that leaves `root`
///
/// The check is lexical: `..` components are folded before comparing, so a
/// target that does not exist yet can still be validated.
pub fn resolve_in_workspace(root: &Path, relative: &str) -> Result<PathBuf> {
    let outside = || PipelineError::PatchOutsideWorkspace {
        path: PathBuf::from(relative),
        root: root.to_path_buf(),
    };

    let mut resolved = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return Err(outside());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(outside()),
        }
    }

    if resolved.as_os_str().is_empty() {
        return Err(outside());
    }

    Ok(root.join(resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn patch(file: &Path, before: &str, after: &str) -> FilePatch {
        FilePatch::new(file, before, after)
    }

    #[tokio::test]
    async fn test_missing_file_gets_after() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("src/pages/login.tsx");

        let outcome = apply_atomic_patch(&patch(&file, "ignored", "export {}"))
            .await
            .unwrap();

        assert_eq!(outcome, PatchOutcome::Created);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "export {}");
    }

    #[tokio::test]
    async fn test_empty_before_appends_on_new_line() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.md");
        std::fs::write(&file, "line one").unwrap();

        let outcome = apply_atomic_patch(&patch(&file, "", "line two"))
            .await
            .unwrap();

        assert_eq!(outcome, PatchOutcome::Appended);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "line one\nline two");
    }

    #[tokio::test]
    async fn test_existing_empty_file_is_not_new() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("empty.txt");
        std::fs::write(&file, "").unwrap();

        apply_atomic_patch(&patch(&file, "", "body")).await.unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "\nbody");

        let err = apply_atomic_patch(&patch(&file, "absent", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::PatchValidation { .. }));
    }

    #[tokio::test]
    async fn test_replace_then_revert_restores_content() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("App.tsx");
        let original = "const theme = 'light';\nrender(theme);\n";
        std::fs::write(&file, original).unwrap();

        apply_atomic_patch(&patch(&file, "'light'", "'dark'"))
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "const theme = 'dark';\nrender(theme);\n"
        );

        apply_atomic_patch(&patch(&file, "'dark'", "'light'"))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), original);
    }

    #[test]
    fn test_only_first_occurrence_is_replaced() {
        let p = FilePatch::new("/tmp/x", "a", "b");
        let (content, outcome) = compute_patched(Some("a-a-a"), &p).unwrap();
        assert_eq!(content, "b-a-a");
        assert_eq!(outcome, PatchOutcome::Replaced);
    }

    #[tokio::test]
    async fn test_missing_context_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.rs");
        std::fs::write(&file, "fn main() {}\n").unwrap();

        let err = apply_atomic_patch(&patch(&file, "fn helper()", "fn other()"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("main.rs"));
        assert!(err.to_string().contains("Context not found"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "fn main() {}\n");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_resolve_in_workspace() {
        let root = Path::new("/srv/app");
        assert_eq!(
            resolve_in_workspace(root, "src/./pages/../App.tsx").unwrap(),
            PathBuf::from("/srv/app/src/App.tsx")
        );
        assert!(matches!(
            resolve_in_workspace(root, "../etc/passwd"),
            Err(PipelineError::PatchOutsideWorkspace { .. })
        ));
        assert!(resolve_in_workspace(root, "/etc/passwd").is_err());
        assert!(resolve_in_workspace(root, "src/..").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_target_patches_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("build.sh");
        let link = dir.path().join("link.sh");
        std::fs::write(&real, "echo old\n").unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        apply_atomic_patch(&patch(&link, "old", "new")).await.unwrap();

        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_to_string(&real).unwrap(), "echo new\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_patch_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.sh");
        std::fs::write(&script, "#!/bin/sh\necho old\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        apply_atomic_patch(&patch(&script, "old", "new")).await.unwrap();

        let mode = std::fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(std::fs::read_to_string(&script).unwrap(), "#!/bin/sh\necho new\n");
    }
}
