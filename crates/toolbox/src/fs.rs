//! Filesystem tools bound to the sandbox root.
//!
//! Every operation resolves its request path through [`crate::path`] first;
//! nothing here touches the filesystem for a rejected path. Concurrent
//! writes to the same path are the caller's responsibility.

use std::path::Path;

use {
    base64::{Engine as _, engine::general_purpose::STANDARD as BASE64},
    serde::{Deserialize, Serialize},
    walkdir::WalkDir,
};

use crate::{
    gateway::GatewayError,
    mime::mime_for_path,
    patch::apply_unified_patch,
    path::{FsEntry, entry_for, resolve, resolve_allow_root},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsReadInput {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsReadOutput {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsReadBase64Input {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsReadBase64Output {
    /// Base64-encoded file bytes.
    pub data: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsWriteInput {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsWriteOutput {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsListInput {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsListOutput {
    pub path: String,
    pub entries: Vec<FsEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsStatInput {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsStatOutput {
    pub entry: FsEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsDeleteInput {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsDeleteOutput {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsMkdirInput {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsMkdirOutput {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsRenameInput {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsRenameOutput {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsApplyPatchInput {
    pub path: String,
    pub patch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsApplyPatchOutput {
    pub ok: bool,
}

pub fn read(root: &Path, input: &FsReadInput) -> Result<FsReadOutput, GatewayError> {
    let target = resolve(root, &input.path)?;
    let data = std::fs::read(target)?;
    Ok(FsReadOutput {
        content: String::from_utf8_lossy(&data).into_owned(),
    })
}

pub fn read_base64(
    root: &Path,
    input: &FsReadBase64Input,
) -> Result<FsReadBase64Output, GatewayError> {
    let target = resolve(root, &input.path)?;
    let data = std::fs::read(&target)?;
    Ok(FsReadBase64Output {
        data: BASE64.encode(data),
        mime_type: mime_for_path(&target).to_string(),
    })
}

pub fn write(root: &Path, input: &FsWriteInput) -> Result<FsWriteOutput, GatewayError> {
    let target = resolve(root, &input.path)?;
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(target, &input.content)?;
    Ok(FsWriteOutput { ok: true })
}

pub fn list(root: &Path, input: &FsListInput) -> Result<FsListOutput, GatewayError> {
    let target = resolve_allow_root(root, &input.path)?;
    let meta = std::fs::metadata(&target)?;
    if !meta.is_dir() {
        return Err(GatewayError::Failed("path is not a directory".into()));
    }

    let mut entries = Vec::new();
    if input.recursive {
        for item in WalkDir::new(&target).min_depth(1) {
            let item = item.map_err(|e| GatewayError::Failed(e.to_string()))?;
            let meta = item.metadata().map_err(|e| GatewayError::Failed(e.to_string()))?;
            entries.push(entry_for(root, item.path(), &meta)?);
        }
    } else {
        for item in std::fs::read_dir(&target)? {
            let item = item?;
            entries.push(entry_for(root, &item.path(), &item.metadata()?)?);
        }
    }
    // Filesystem iteration order is not stable; fix it lexically.
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    let listed = input.path.trim();
    Ok(FsListOutput {
        path: if listed.is_empty() { ".".into() } else { listed.into() },
        entries,
    })
}

pub fn stat(root: &Path, input: &FsStatInput) -> Result<FsStatOutput, GatewayError> {
    let target = resolve_allow_root(root, &input.path)?;
    let meta = std::fs::metadata(&target)?;
    Ok(FsStatOutput {
        entry: entry_for(root, &target, &meta)?,
    })
}

/// Recursive remove. An absent path is indistinguishable from success.
pub fn delete(root: &Path, input: &FsDeleteInput) -> Result<FsDeleteOutput, GatewayError> {
    let target = resolve(root, &input.path)?;
    let result = match std::fs::symlink_metadata(&target) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(&target),
        Ok(_) => std::fs::remove_file(&target),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => Ok(FsDeleteOutput { ok: true }),
        // Lost a remove race; the path is gone either way.
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(FsDeleteOutput { ok: true }),
        Err(err) => Err(err.into()),
    }
}

pub fn mkdir(root: &Path, input: &FsMkdirInput) -> Result<FsMkdirOutput, GatewayError> {
    let target = resolve(root, &input.path)?;
    std::fs::create_dir_all(target)?;
    Ok(FsMkdirOutput { ok: true })
}

/// Rename without overwrite: fails if the destination exists, or if the
/// existence probe fails for any reason other than not-found.
pub fn rename(root: &Path, input: &FsRenameInput) -> Result<FsRenameOutput, GatewayError> {
    let source = resolve(root, &input.source)?;
    let destination = resolve(root, &input.destination)?;

    match std::fs::symlink_metadata(&destination) {
        Ok(_) => return Err(GatewayError::Failed("destination already exists".into())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {},
        Err(err) => return Err(err.into()),
    }

    std::fs::rename(source, destination)?;
    Ok(FsRenameOutput { ok: true })
}

/// Apply a unified diff to a file, preserving its permission bits. The file
/// is rewritten only once the fully patched text exists in memory.
pub fn apply_patch(root: &Path, input: &FsApplyPatchInput) -> Result<FsApplyPatchOutput, GatewayError> {
    let target = resolve(root, &input.path)?;
    let original = std::fs::read(&target)?;
    let original = String::from_utf8_lossy(&original);
    let updated = apply_unified_patch(&original, &input.patch)?;
    let meta = std::fs::metadata(&target)?;
    std::fs::write(&target, updated)?;
    std::fs::set_permissions(&target, meta.permissions())?;
    Ok(FsApplyPatchOutput { ok: true })
}
