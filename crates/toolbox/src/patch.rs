//! Unified-diff application with exact match semantics.
//!
//! Supports the single-file subset: `@@ -start[,len] +...@@` hunk headers
//! with context/add/delete body lines. Context and delete lines must match
//! the current content exactly or the whole patch is rejected; application
//! is all-or-nothing — the patched text is computed fully in memory before
//! anything is written.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("patch contains no hunks")]
    NoHunks,
    #[error("invalid hunk header")]
    InvalidHeader,
    #[error("patch out of range")]
    OutOfRange,
    #[error("patch context mismatch")]
    ContextMismatch,
    #[error("patch delete mismatch")]
    DeleteMismatch,
    #[error("invalid patch line")]
    InvalidLine,
    #[error("invalid patch operation")]
    InvalidOperation,
}

/// Apply a unified diff to `original`, returning the patched text.
///
/// Text outside hunks is ignored. A wholly empty body line is tolerated only
/// as the final line of the patch (a trailing-newline artifact); `\ No
/// newline at end of file` markers are skipped.
pub fn apply_unified_patch(original: &str, patch: &str) -> Result<String, PatchError> {
    let lines: Vec<&str> = original.split('\n').collect();
    let patch_lines: Vec<&str> = patch.split('\n').collect();

    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut cursor = 0usize;
    let mut hunks_applied = 0usize;

    let mut i = 0usize;
    while i < patch_lines.len() {
        if !patch_lines[i].starts_with("@@") {
            i += 1;
            continue;
        }

        let start = parse_hunk_header(patch_lines[i])?;
        // 1-based header → 0-based line index, clamped at the file start.
        let start = usize::try_from(start - 1).unwrap_or(0);
        if start > lines.len() {
            return Err(PatchError::OutOfRange);
        }
        // A hunk behind the cursor would mean overlapping or out-of-order
        // hunks; rejected rather than rewinding already-copied output.
        if start < cursor {
            return Err(PatchError::OutOfRange);
        }

        out.extend_from_slice(&lines[cursor..start]);
        cursor = start;
        hunks_applied += 1;

        while i + 1 < patch_lines.len() {
            let next = patch_lines[i + 1];
            if next.starts_with("@@") {
                break;
            }
            i += 1;

            if next.is_empty() {
                if i == patch_lines.len() - 1 {
                    break;
                }
                return Err(PatchError::InvalidLine);
            }

            let Some(op) = next.chars().next() else {
                return Err(PatchError::InvalidLine);
            };
            match op {
                '\\' => {},
                ' ' => {
                    let text = &next[1..];
                    if cursor >= lines.len() || lines[cursor] != text {
                        return Err(PatchError::ContextMismatch);
                    }
                    out.push(text);
                    cursor += 1;
                },
                '-' => {
                    let text = &next[1..];
                    if cursor >= lines.len() || lines[cursor] != text {
                        return Err(PatchError::DeleteMismatch);
                    }
                    cursor += 1;
                },
                '+' => out.push(&next[1..]),
                _ => return Err(PatchError::InvalidOperation),
            }
        }
        i += 1;
    }

    if hunks_applied == 0 {
        return Err(PatchError::NoHunks);
    }

    out.extend_from_slice(&lines[cursor..]);
    Ok(out.join("\n"))
}

/// Parse the original-file start line out of `@@ -start[,len] +...@@`.
fn parse_hunk_header(header: &str) -> Result<i64, PatchError> {
    let trimmed = header.strip_prefix("@@").unwrap_or(header).trim();
    if !trimmed.starts_with('-') {
        return Err(PatchError::InvalidHeader);
    }
    let mut fields = trimmed.splitn(2, ' ');
    let origin = fields.next().unwrap_or_default();
    if fields.next().is_none() {
        return Err(PatchError::InvalidHeader);
    }

    let origin = origin.strip_prefix('-').unwrap_or(origin);
    let start = origin.split(',').next().unwrap_or(origin);
    start.parse::<i64>().map_err(|_| PatchError::InvalidHeader)
}
