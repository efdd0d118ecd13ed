//! Path resolution against the sandbox root.
//!
//! Purely lexical: no filesystem call is made for rejected inputs, and no
//! symlink resolution is performed — escapes via symlinked subtrees are not
//! defended beyond the host mount topology.

use std::{
    path::{Component, Path, PathBuf},
    time::UNIX_EPOCH,
};

use {
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("absolute paths are not allowed")]
    Absolute,
    #[error("path escapes the sandbox root")]
    Escape,
}

/// One filesystem entry as reported by the fs tools. `path` is
/// slash-separated and root-relative; the empty string denotes the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsEntry {
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    /// Permission bits (unix; 0 elsewhere).
    pub mode: u32,
    /// Modification time, unix milliseconds.
    pub mod_time: u64,
}

/// Lexically clean a request path into a relative path with no `.`/`..`
/// components. Rejects empty/`.`-only input, absolute paths, and anything
/// that climbs above its own start.
fn clean_relative(request: &str) -> Result<PathBuf, PathError> {
    let trimmed = request.trim();
    if trimmed.is_empty() {
        return Err(PathError::Empty);
    }
    let mut stack: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Prefix(_) | Component::RootDir => return Err(PathError::Absolute),
            Component::CurDir => {},
            Component::ParentDir => {
                if stack.pop().is_none() {
                    return Err(PathError::Escape);
                }
            },
            Component::Normal(part) => stack.push(part),
        }
    }
    if stack.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(stack.iter().collect())
}

/// Resolve a request path against the root. Empty and `.`-only paths are
/// invalid here; use [`resolve_allow_root`] where the root itself is a legal
/// target.
pub fn resolve(root: &Path, request: &str) -> Result<PathBuf, PathError> {
    Ok(root.join(clean_relative(request)?))
}

/// Like [`resolve`], but an empty request means "the root itself".
pub fn resolve_allow_root(root: &Path, request: &str) -> Result<PathBuf, PathError> {
    if request.trim().is_empty() {
        return Ok(root.to_path_buf());
    }
    resolve(root, request)
}

/// Build an [`FsEntry`] for an absolute path under the root.
///
/// A root-relative result that starts with a parent segment should be
/// unreachable given [`resolve`]'s guard; it errors rather than being
/// silently coerced.
pub fn entry_for(
    root: &Path,
    target: &Path,
    meta: &std::fs::Metadata,
) -> Result<FsEntry, PathError> {
    let rel = target.strip_prefix(root).map_err(|_| PathError::Escape)?;
    if rel
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(PathError::Escape);
    }

    let path = rel
        .iter()
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    Ok(FsEntry {
        path,
        is_dir: meta.is_dir(),
        size: meta.len(),
        mode: permission_bits(meta),
        mod_time: meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default(),
    })
}

#[cfg(unix)]
fn permission_bits(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_bits(_meta: &std::fs::Metadata) -> u32 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_plain_relative_paths() {
        let root = Path::new("/srv/data");
        assert_eq!(resolve(root, "a.txt").unwrap(), root.join("a.txt"));
        assert_eq!(resolve(root, "notes/a.txt").unwrap(), root.join("notes/a.txt"));
        assert_eq!(resolve(root, "a/./b").unwrap(), root.join("a/b"));
        assert_eq!(resolve(root, "a/b/../c").unwrap(), root.join("a/c"));
    }

    #[test]
    fn test_resolve_rejects_empty_and_dot() {
        let root = Path::new("/srv/data");
        assert_eq!(resolve(root, "").unwrap_err(), PathError::Empty);
        assert_eq!(resolve(root, "   ").unwrap_err(), PathError::Empty);
        assert_eq!(resolve(root, ".").unwrap_err(), PathError::Empty);
        assert_eq!(resolve(root, "./.").unwrap_err(), PathError::Empty);
    }

    #[test]
    fn test_resolve_rejects_absolute() {
        let root = Path::new("/srv/data");
        assert_eq!(resolve(root, "/etc/passwd").unwrap_err(), PathError::Absolute);
        assert_eq!(resolve(root, "/").unwrap_err(), PathError::Absolute);
    }

    #[test]
    fn test_resolve_rejects_parent_escape() {
        let root = Path::new("/srv/data");
        assert_eq!(resolve(root, "..").unwrap_err(), PathError::Escape);
        assert_eq!(resolve(root, "../x").unwrap_err(), PathError::Escape);
        assert_eq!(resolve(root, "a/../../x").unwrap_err(), PathError::Escape);
        // Escaping then re-entering is still an escape.
        assert_eq!(resolve(root, "../data/x").unwrap_err(), PathError::Escape);
    }

    #[test]
    fn test_resolve_allow_root() {
        let root = Path::new("/srv/data");
        assert_eq!(resolve_allow_root(root, "").unwrap(), root.to_path_buf());
        assert_eq!(resolve_allow_root(root, "a").unwrap(), root.join("a"));
        assert_eq!(resolve_allow_root(root, ".").unwrap_err(), PathError::Empty);
        assert_eq!(resolve_allow_root(root, "..").unwrap_err(), PathError::Escape);
    }

    #[test]
    fn test_entry_for_inverts_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("notes")).unwrap();
        std::fs::write(root.join("notes/a.txt"), "hello").unwrap();

        let target = resolve(root, "notes/a.txt").unwrap();
        let meta = std::fs::metadata(&target).unwrap();
        let entry = entry_for(root, &target, &meta).unwrap();

        assert_eq!(entry.path, "notes/a.txt");
        assert!(!entry.is_dir);
        assert_eq!(entry.size, 5);
    }

    #[test]
    fn test_entry_for_root_is_empty_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let meta = std::fs::metadata(root).unwrap();
        let entry = entry_for(root, root, &meta).unwrap();
        assert_eq!(entry.path, "");
        assert!(entry.is_dir);
    }

    #[test]
    fn test_entry_for_rejects_outside_target() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("inner");
        std::fs::create_dir_all(&root).unwrap();
        let meta = std::fs::metadata(dir.path()).unwrap();
        assert_eq!(
            entry_for(&root, dir.path(), &meta).unwrap_err(),
            PathError::Escape
        );
    }
}
