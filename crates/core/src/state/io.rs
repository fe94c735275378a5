//! # IO Utilities
//!
//! File system operations shared by the document store and the patch engine.
//! Every write is a full-content replace through a sibling temp file and a
//! rename, so readers never observe a half-written file.

use crate::error::{PipelineError, Result};
use std::fs::Permissions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Get the runtime directory path (.keel)
///
/// This is the default home of the master document and `config.json`.
pub fn get_runtime_path() -> PathBuf {
    // Check for environment variable override
    if let Ok(path) = std::env::var("KEEL_RUNTIME_PATH") {
        return PathBuf::from(path);
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".keel")
}

/// Read a UTF-8 file, mapping "not found" to `None`
pub async fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PipelineError::io(path, e)),
    }
}

/// Replace the full content of `path`, creating parent directories as needed
pub async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    write_atomic_with_permissions(path, content, None).await
}

/// Like [`write_atomic`], applying `permissions` to the new file before it
/// takes the place of the old one
pub async fn write_atomic_with_permissions(
    path: &Path,
    content: &str,
    permissions: Option<Permissions>,
) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .await
        .map_err(|e| PipelineError::io(&parent, e))?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "keel".to_string());
    let tmp = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    if let Err(e) = fs::write(&tmp, content).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(PipelineError::io(&tmp, e));
    }

    if let Some(permissions) = permissions {
        if let Err(e) = fs::set_permissions(&tmp, permissions).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(PipelineError::io(&tmp, e));
        }
    }

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(PipelineError::io(path, e));
    }

    Ok(())
}
