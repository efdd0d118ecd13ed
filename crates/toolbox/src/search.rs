//! Search tool: spawns the host `grep` against the sandbox root.

use std::{path::Path, process::Stdio};

use {
    serde::{Deserialize, Serialize},
    tokio::process::Command,
};

use crate::gateway::GatewayError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrepInput {
    pub pattern: String,
    /// Extra grep flags. Only read-only flags are meaningful here.
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrepOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Run `grep -r <args> <pattern> .` inside the sandbox root.
///
/// Recursion is always on — the target is the whole sandbox tree, and a bare
/// directory operand would otherwise exit 2. Exit code 1 is grep's "no
/// matches" and counts as success; any other non-zero exit is a failure.
/// This leans on GNU grep's convention — revisit if the underlying tool
/// changes.
pub async fn run_grep(root: &Path, input: &GrepInput) -> Result<GrepOutput, GatewayError> {
    if input.pattern.trim().is_empty() {
        return Err(GatewayError::Failed("pattern is required".into()));
    }
    match std::fs::metadata(root) {
        Ok(meta) if meta.is_dir() => {},
        _ => {
            return Err(GatewayError::Failed(format!(
                "sandbox root {} is not available",
                root.display()
            )));
        },
    }

    let output = Command::new("grep")
        .arg("-r")
        .args(&input.args)
        .arg(&input.pattern)
        .arg(".")
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let exit_code = output.status.code().unwrap_or(-1);

    if exit_code != 0 && exit_code != 1 {
        return Err(GatewayError::Failed(format!(
            "grep failed: {}",
            stderr.trim()
        )));
    }

    Ok(GrepOutput {
        stdout,
        stderr,
        exit_code,
    })
}
