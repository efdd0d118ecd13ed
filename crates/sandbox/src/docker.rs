//! Docker-CLI-backed [`SandboxRuntime`].
//!
//! Shells out to the `docker` binary rather than speaking the engine API:
//! the CLI is what operators have on the host, and its stderr text is the
//! only state signal we need. Error classification is string matching on
//! that text, isolated in the helpers below.

use std::process::Stdio;

use {tokio::process::Command, tracing::debug};

use crate::{
    error::RuntimeError,
    runtime::{
        ContainerSummary, CreateContainerRequest, DeleteContainerOptions, DeleteTaskOptions,
        ExecTaskRequest, ExecTaskResult, PullImageOptions, SandboxRuntime, StartTaskOptions,
        StopTaskOptions,
    },
};

use async_trait::async_trait;

fn is_already_exists_error(stderr: &str) -> bool {
    let s = stderr.to_ascii_lowercase();
    s.contains("already in use") || s.contains("already exists")
}

fn is_not_found_error(stderr: &str) -> bool {
    let s = stderr.to_ascii_lowercase();
    s.contains("no such container") || s.contains("no such image") || s.contains("not found")
}

fn is_not_running_error(stderr: &str) -> bool {
    stderr.to_ascii_lowercase().contains("is not running")
}

fn classify(target: &str, stderr: &str) -> RuntimeError {
    if is_already_exists_error(stderr) {
        RuntimeError::AlreadyExists(target.to_string())
    } else if is_not_found_error(stderr) {
        RuntimeError::NotFound(target.to_string())
    } else {
        RuntimeError::Other(format!("{target}: {}", stderr.trim()))
    }
}

/// Production runtime driving the `docker` CLI.
pub struct DockerCliRuntime {
    binary: String,
}

impl Default for DockerCliRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCliRuntime {
    pub fn new() -> Self {
        Self {
            binary: "docker".into(),
        }
    }

    /// Use an alternate CLI binary (e.g. `podman`).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, target: &str, args: &[String]) -> Result<std::process::Output, RuntimeError> {
        debug!(binary = %self.binary, ?args, "container cli call");
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;
        if output.status.success() {
            Ok(output)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(classify(target, &stderr))
        }
    }
}

#[async_trait]
impl SandboxRuntime for DockerCliRuntime {
    async fn pull_image(&self, image: &str, _opts: &PullImageOptions) -> Result<(), RuntimeError> {
        // Docker unpacks on pull; the snapshotter hint has no CLI equivalent.
        self.run(image, &["pull".into(), image.into()]).await?;
        Ok(())
    }

    async fn create_container(&self, req: CreateContainerRequest) -> Result<(), RuntimeError> {
        let mut args = vec!["create".to_string(), "--name".to_string(), req.id.clone()];
        for (key, value) in &req.labels {
            args.extend(["--label".to_string(), format!("{key}={value}")]);
        }
        for mount in &req.mounts {
            let mut spec = format!("{}:{}", mount.source.display(), mount.destination);
            if mount.read_only {
                spec.push_str(":ro");
            }
            args.extend(["-v".to_string(), spec]);
        }
        args.push(req.image.clone());
        // Keep the container alive for subsequent exec calls.
        args.extend(["sleep".to_string(), "infinity".to_string()]);
        self.run(&req.id, &args).await?;
        Ok(())
    }

    async fn start_task(
        &self,
        container_id: &str,
        opts: &StartTaskOptions,
    ) -> Result<(), RuntimeError> {
        let mut args = vec!["start".to_string()];
        if opts.use_stdio {
            args.push("--attach".to_string());
        }
        args.push(container_id.to_string());
        self.run(container_id, &args).await?;
        Ok(())
    }

    async fn stop_task(
        &self,
        container_id: &str,
        opts: &StopTaskOptions,
    ) -> Result<(), RuntimeError> {
        let stop = self
            .run(container_id, &[
                "stop".to_string(),
                "-t".to_string(),
                opts.timeout.as_secs().to_string(),
                container_id.to_string(),
            ])
            .await;
        match stop {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => Err(err),
            Err(err) => {
                if opts.force {
                    self.run(container_id, &["kill".to_string(), container_id.to_string()])
                        .await?;
                    Ok(())
                } else {
                    Err(err)
                }
            },
        }
    }

    async fn delete_task(
        &self,
        container_id: &str,
        _opts: &DeleteTaskOptions,
    ) -> Result<(), RuntimeError> {
        let result = self
            .run(container_id, &["kill".to_string(), container_id.to_string()])
            .await;
        match result {
            Ok(_) => Ok(()),
            // A task that already exited is as deleted as it gets.
            Err(RuntimeError::Other(msg)) if is_not_running_error(&msg) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn delete_container(
        &self,
        container_id: &str,
        opts: &DeleteContainerOptions,
    ) -> Result<(), RuntimeError> {
        let mut args = vec!["rm".to_string()];
        if opts.cleanup_snapshot {
            args.push("-v".to_string());
        }
        args.push(container_id.to_string());
        self.run(container_id, &args).await?;
        Ok(())
    }

    async fn exec_task(
        &self,
        container_id: &str,
        req: ExecTaskRequest,
    ) -> Result<ExecTaskResult, RuntimeError> {
        let mut args = vec!["exec".to_string()];
        if req.terminal {
            args.push("-t".to_string());
        }
        if req.use_stdio {
            args.push("-i".to_string());
        }
        if let Some(ref dir) = req.work_dir {
            args.extend(["-w".to_string(), dir.clone()]);
        }
        for pair in &req.env {
            args.extend(["-e".to_string(), pair.clone()]);
        }
        args.push(container_id.to_string());
        args.extend(req.args.iter().cloned());

        let mut cmd = Command::new(&self.binary);
        cmd.args(&args);
        let status = if req.use_stdio {
            cmd.status().await?
        } else {
            cmd.stdin(Stdio::null());
            let output = cmd.output().await?;
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_not_found_error(&stderr) {
                return Err(RuntimeError::NotFound(container_id.to_string()));
            }
            if is_not_running_error(&stderr) {
                return Err(RuntimeError::Other(format!(
                    "{container_id}: {}",
                    stderr.trim()
                )));
            }
            output.status
        };

        // A non-zero code is the command's own exit status, not a failure.
        let exit_code = status
            .code()
            .and_then(|code| u32::try_from(code).ok())
            .unwrap_or(1);
        Ok(ExecTaskResult { exit_code })
    }

    async fn commit_snapshot(
        &self,
        container_id: &str,
        snapshot_name: &str,
    ) -> Result<(), RuntimeError> {
        self.run(container_id, &[
            "commit".to_string(),
            container_id.to_string(),
            snapshot_name.to_string(),
        ])
        .await?;
        Ok(())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let output = self
            .run("list", &[
                "ps".to_string(),
                "-a".to_string(),
                "--format".to_string(),
                "{{.Names}}\t{{.Labels}}".to_string(),
            ])
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().filter_map(parse_ps_line).collect())
    }
}

/// Parse one `docker ps --format '{{.Names}}\t{{.Labels}}'` line.
fn parse_ps_line(line: &str) -> Option<ContainerSummary> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (name, labels_field) = line.split_once('\t').unwrap_or((line, ""));
    let labels = labels_field
        .split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((key.to_string(), value.to_string()))
        })
        .collect();
    Some(ContainerSummary {
        id: name.to_string(),
        labels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_classification() {
        let err = classify(
            "bot-b1",
            "Error response from daemon: Conflict. The container name \"/bot-b1\" is already in use",
        );
        assert!(err.is_already_exists());

        let err = classify("bot-b1", "Error response from daemon: No such container: bot-b1");
        assert!(err.is_not_found());

        let err = classify("bot-b1", "Error response from daemon: dial unix: connection refused");
        assert!(!err.is_already_exists() && !err.is_not_found());
    }

    #[test]
    fn test_parse_ps_line() {
        let summary = parse_ps_line("bot-b1\tbotpod.bot_id=b1,org.label=x").unwrap();
        assert_eq!(summary.id, "bot-b1");
        assert_eq!(summary.labels.get("botpod.bot_id").map(String::as_str), Some("b1"));

        let bare = parse_ps_line("plain-container").unwrap();
        assert!(bare.labels.is_empty());

        assert!(parse_ps_line("   ").is_none());
    }
}
