//! # Worker Skill
//!
//! Executes one task: obtains patches (given, or generated by the model),
//! applies them in order through the patch engine, then marks the task done.
//!
//! A failing patch aborts the rest of the batch. Patches already written
//! stay written.

use crate::error::{PipelineError, Result};
use crate::models::{suggest_json, suggest_text, ModelBridge};
use crate::skills::prompts;
use crate::state::{DocumentStore, Task, TaskStatus};
use crate::tools::patch::{apply_atomic_patch, resolve_in_workspace, FilePatch, PatchOutcome};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Metadata key holding precomputed patches on a task
pub const PATCHES_METADATA_KEY: &str = "patches";

/// A patch as submitted: explicit path or workspace-relative path
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatchSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative: Option<String>,
    #[serde(default)]
    pub before: String,
    #[serde(default)]
    pub after: String,
}

impl PatchSpec {
    pub fn relative(
        path: impl Into<String>,
        before: impl Into<String>,
        after: impl Into<String>,
    ) -> Self {
        Self {
            file: None,
            relative: Some(path.into()),
            before: before.into(),
            after: after.into(),
        }
    }

    fn has_target(&self) -> bool {
        self.file.as_ref().is_some_and(|f| !f.as_os_str().is_empty())
            || self.relative.as_ref().is_some_and(|r| !r.trim().is_empty())
    }

    /// Resolve the absolute target; an explicit path wins over a relative one
    ///
    /// Relative paths (including a non-absolute explicit path) must stay
    /// inside `root`.
    pub fn resolve(&self, root: &Path, index: usize) -> Result<FilePatch> {
        let target = match (&self.file, &self.relative) {
            (Some(file), _) if !file.as_os_str().is_empty() => {
                if file.is_absolute() {
                    file.clone()
                } else {
                    resolve_in_workspace(root, &file.to_string_lossy())?
                }
            }
            (_, Some(relative)) if !relative.trim().is_empty() => {
                resolve_in_workspace(root, relative)?
            }
            _ => return Err(PipelineError::PatchTargetMissing { index }),
        };
        Ok(FilePatch::new(target, &self.before, &self.after))
    }

    /// Precomputed patches stored under the task's metadata, if any
    pub fn from_task_metadata(task: &Task) -> Result<Option<Vec<PatchSpec>>> {
        let Some(value) = task
            .metadata
            .as_ref()
            .and_then(|meta| meta.get(PATCHES_METADATA_KEY))
        else {
            return Ok(None);
        };
        let patches = serde_json::from_value(value.clone())?;
        Ok(Some(patches))
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedPatches {
    #[serde(default)]
    patches: Vec<PatchSpec>,
}

/// One applied patch
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AppliedPatch {
    pub file: PathBuf,
    pub outcome: PatchOutcome,
}

/// Result of executing one task
#[derive(Debug, Clone, Serialize)]
pub struct WorkerOutput {
    pub task_id: String,
    pub status: TaskStatus,
    pub applied: Vec<AppliedPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Worker agent
pub struct WorkerSkill {
    store: DocumentStore,
    bridge: Arc<dyn ModelBridge>,
    workspace_root: PathBuf,
}

impl WorkerSkill {
    pub fn new(
        store: DocumentStore,
        bridge: Arc<dyn ModelBridge>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            bridge,
            workspace_root: workspace_root.into(),
        }
    }

    pub async fn run(&self, task: &Task, patches: Option<Vec<PatchSpec>>) -> Result<WorkerOutput> {
        let patches = match patches {
            Some(patches) if !patches.is_empty() => patches,
            _ => self.generate_patches(task).await,
        };

        let mut applied = Vec::with_capacity(patches.len());
        for (index, spec) in patches.iter().enumerate() {
            let patch = spec.resolve(&self.workspace_root, index)?;
            let outcome = apply_atomic_patch(&patch).await?;
            applied.push(AppliedPatch {
                file: patch.file,
                outcome,
            });
        }

        if let Some(doc) = self.store.read().await? {
            self.store
                .update_task_status(doc, &task.id, TaskStatus::Done)
                .await?;
        }

        let files = applied
            .iter()
            .map(|p| p.file.to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let prompt = prompts::render(
            prompts::WORKER_SUMMARY,
            &[
                ("title", &task.title),
                ("files", &files),
                ("description", &task.description),
            ],
        );
        let summary = suggest_text(self.bridge.as_ref(), &prompt).await;

        tracing::info!(task = %task.id, patches = applied.len(), "Task completed");
        Ok(WorkerOutput {
            task_id: task.id.clone(),
            status: TaskStatus::Done,
            applied,
            summary,
        })
    }

    /// Ask the model for patches; targetless patches are dropped
    async fn generate_patches(&self, task: &Task) -> Vec<PatchSpec> {
        let prompt = prompts::render(
            prompts::WORKER_PATCHES,
            &[("title", &task.title), ("description", &task.description)],
        );
        let Some(generated) = suggest_json::<GeneratedPatches>(self.bridge.as_ref(), &prompt).await
        else {
            return Vec::new();
        };

        generated
            .patches
            .into_iter()
            .filter(|spec| {
                if !spec.has_target() {
                    tracing::warn!(
                        task = %task.id,
                        "Dropping generated patch without a target file"
                    );
                }
                spec.has_target()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NullBridge, ScriptedBridge};
    use crate::state::{BaseApp, Feature, FeatureStatus, LogEntryKind, MasterDocument};
    use chrono::Utc;
    use serde_json::json;

    fn task(id: &str) -> Task {
        let now = Utc::now();
        Task {
            id: id.to_string(),
            feature_id: "feature_1".to_string(),
            title: "Implement: dark theme".to_string(),
            description: "dark theme".to_string(),
            status: TaskStatus::Pending,
            files: Vec::new(),
            assignee: None,
            created_at: now,
            updated_at: now,
            metadata: None,
        }
    }

    async fn store_with_task(dir: &tempfile::TempDir, task: &Task) -> DocumentStore {
        let store = DocumentStore::new(dir.path().join("doc.json"), "keel-system");
        let doc = MasterDocument::new(
            "demo",
            "spec.md",
            BaseApp::default(),
            vec![Feature::new("feature_1", "Login", "Login", FeatureStatus::Pending)],
        );
        let doc = store.initialize(doc).await.unwrap();
        store.record_task(doc, task.clone()).await.unwrap();
        store
    }

    #[test]
    fn test_explicit_path_wins() {
        let root = Path::new("/srv/app");
        let spec = PatchSpec {
            file: Some(PathBuf::from("/tmp/explicit.txt")),
            relative: Some("src/relative.txt".to_string()),
            before: String::new(),
            after: "x".to_string(),
        };
        assert_eq!(spec.resolve(root, 0).unwrap().file, PathBuf::from("/tmp/explicit.txt"));

        let spec = PatchSpec::relative("src/App.tsx", "", "x");
        assert_eq!(
            spec.resolve(root, 0).unwrap().file,
            PathBuf::from("/srv/app/src/App.tsx")
        );

        let err = PatchSpec::default().resolve(root, 3).unwrap_err();
        assert!(matches!(err, PipelineError::PatchTargetMissing { index: 3 }));
    }

    #[test]
    fn test_patches_from_metadata() {
        let mut t = task("t1");
        assert_eq!(PatchSpec::from_task_metadata(&t).unwrap(), None);

        let meta = json!({ "patches": [{ "relative": "a.txt", "before": "", "after": "A" }] });
        t.metadata = meta.as_object().cloned();
        let patches = PatchSpec::from_task_metadata(&t).unwrap().unwrap();
        assert_eq!(patches, vec![PatchSpec::relative("a.txt", "", "A")]);
    }

    #[tokio::test]
    async fn test_applies_patches_and_completes_task() {
        let dir = tempfile::tempdir().unwrap();
        let t = task("t1");
        let store = store_with_task(&dir, &t).await;
        let root = dir.path().join("app");
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/theme.ts"), "export const theme = 'light';").unwrap();

        let worker = WorkerSkill::new(store.clone(), Arc::new(NullBridge), &root);
        let out = worker
            .run(
                &t,
                Some(vec![
                    PatchSpec::relative("src/theme.ts", "'light'", "'dark'"),
                    PatchSpec::relative("src/new.ts", "", "export {};"),
                ]),
            )
            .await
            .unwrap();

        assert_eq!(out.status, TaskStatus::Done);
        assert_eq!(out.applied.len(), 2);
        assert_eq!(out.applied[0].outcome, PatchOutcome::Replaced);
        assert_eq!(out.applied[1].outcome, PatchOutcome::Created);
        assert_eq!(out.summary, None);
        assert_eq!(
            std::fs::read_to_string(root.join("src/theme.ts")).unwrap(),
            "export const theme = 'dark';"
        );

        let doc = store.require().await.unwrap();
        assert_eq!(doc.task("t1").unwrap().status, TaskStatus::Done);
        assert_eq!(doc.activity_log.last().unwrap().kind, LogEntryKind::TaskCompleted);
    }

    #[tokio::test]
    async fn test_failing_patch_aborts_batch() {
        let dir = tempfile::tempdir().unwrap();
        let t = task("t1");
        let store = store_with_task(&dir, &t).await;
        let root = dir.path().join("app");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.txt"), "alpha").unwrap();

        let worker = WorkerSkill::new(store.clone(), Arc::new(NullBridge), &root);
        let err = worker
            .run(
                &t,
                Some(vec![
                    PatchSpec::relative("b.txt", "", "beta"),
                    PatchSpec::relative("a.txt", "missing", "x"),
                    PatchSpec::relative("c.txt", "", "gamma"),
                ]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::PatchValidation { .. }));
        assert!(root.join("b.txt").exists());
        assert!(!root.join("c.txt").exists());
        assert_eq!(std::fs::read_to_string(root.join("a.txt")).unwrap(), "alpha");
        let doc = store.require().await.unwrap();
        assert_eq!(doc.task("t1").unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_generated_patches_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let t = task("t1");
        let store = store_with_task(&dir, &t).await;
        let root = dir.path().join("app");

        let bridge = ScriptedBridge::new()
            .reply_when(
                "Generate concise atomic patches",
                r##"{"patches": [{"relative": "README.md", "before": "", "after": "# Dark"},
                                {"before": "", "after": "orphan"}]}"##,
            )
            .reply_when("Summarize the changes", "Added a README.");

        let out = WorkerSkill::new(store, Arc::new(bridge), &root)
            .run(&t, None)
            .await
            .unwrap();

        let files: Vec<_> = out.applied.iter().map(|p| p.file.clone()).collect();
        assert_eq!(files, vec![root.join("README.md")]);
        assert_eq!(out.summary.as_deref(), Some("Added a README."));
        assert_eq!(std::fs::read_to_string(root.join("README.md")).unwrap(), "# Dark");
    }

    #[tokio::test]
    async fn test_without_document_still_reports_done() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join("none.json"), "keel-system");
        let out = WorkerSkill::new(store.clone(), Arc::new(NullBridge), dir.path())
            .run(&task("t1"), None)
            .await
            .unwrap();
        assert_eq!(out.status, TaskStatus::Done);
        assert!(out.applied.is_empty());
        assert!(store.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_task_in_existing_document_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_task(&dir, &task("t1")).await;
        let root = dir.path().join("app");

        let err = WorkerSkill::new(store.clone(), Arc::new(NullBridge), &root)
            .run(&task("ghost"), Some(vec![PatchSpec::relative("a.txt", "", "A")]))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::TaskNotFound(ref id) if id == "ghost"));
        // patches land before the status update is attempted
        assert_eq!(std::fs::read_to_string(root.join("a.txt")).unwrap(), "A");
        let doc = store.require().await.unwrap();
        assert_eq!(doc.task("t1").unwrap().status, TaskStatus::Pending);
    }
}
