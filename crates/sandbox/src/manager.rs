use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use {serde_json::json, tracing::debug};

use crate::{
    audit::AuditStore,
    config::{APP_MOUNT, BOT_LABEL_KEY, CONTAINER_PREFIX, SandboxConfig},
    error::SandboxError,
    runtime::{
        ContainerMount, CreateContainerRequest, DeleteContainerOptions, DeleteTaskOptions,
        ExecTaskRequest, PullImageOptions, SandboxRuntime, StartTaskOptions, StopTaskOptions,
    },
};

/// Command execution request for a bot's sandbox.
#[derive(Debug, Clone, Default)]
pub struct ExecRequest {
    pub bot_id: String,
    pub command: Vec<String>,
    /// `KEY=value` pairs.
    pub env: Vec<String>,
    pub work_dir: Option<String>,
    pub terminal: bool,
    pub use_stdio: bool,
}

#[derive(Debug, Clone)]
pub struct ExecResult {
    pub exit_code: u32,
}

/// Validate a bot identifier: 1..=64 chars of `[A-Za-z0-9_-]`, not starting
/// with `-`. The id becomes part of a container name and a host path, so
/// anything looser is rejected up front.
pub fn validate_bot_id(bot_id: &str) -> Result<(), SandboxError> {
    let ok = !bot_id.is_empty()
        && bot_id.len() <= 64
        && !bot_id.starts_with('-')
        && bot_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(SandboxError::InvalidBotId(bot_id.to_string()))
    }
}

/// Per-bot sandbox orchestrator.
///
/// Safe to share across bots; callers must serialize conflicting lifecycle
/// transitions for a single bot themselves.
pub struct SandboxManager {
    runtime: Arc<dyn SandboxRuntime>,
    cfg: SandboxConfig,
    audit: Option<AuditStore>,
}

impl SandboxManager {
    pub fn new(runtime: Arc<dyn SandboxRuntime>, cfg: SandboxConfig) -> Self {
        Self {
            runtime,
            cfg,
            audit: None,
        }
    }

    /// Attach the audit store. Without it `exec` refuses to run.
    pub fn with_audit(mut self, store: AuditStore) -> Self {
        self.audit = Some(store);
        self
    }

    /// Pull the configured base image. Idempotent; a failure here is fatal
    /// at startup.
    pub async fn init(&self) -> Result<(), SandboxError> {
        self.runtime
            .pull_image(&self.cfg.image, &PullImageOptions {
                unpack: true,
                snapshotter: self.cfg.snapshotter.clone(),
            })
            .await?;
        Ok(())
    }

    /// Create the bot's container and data directory if missing.
    /// An already-existing container is success, so concurrent callers race
    /// harmlessly.
    pub async fn ensure_bot(&self, bot_id: &str) -> Result<(), SandboxError> {
        validate_bot_id(bot_id)?;
        let data_dir = self.ensure_data_dir(bot_id)?;

        let request = CreateContainerRequest {
            id: self.cfg.container_id(bot_id),
            image: self.cfg.image.clone(),
            snapshotter: self.cfg.snapshotter.clone(),
            labels: HashMap::from([(BOT_LABEL_KEY.to_string(), bot_id.to_string())]),
            mounts: vec![
                ContainerMount {
                    source: data_dir.clone(),
                    destination: self.cfg.data_mount.clone(),
                    read_only: false,
                },
                ContainerMount {
                    source: data_dir,
                    destination: APP_MOUNT.to_string(),
                    read_only: false,
                },
            ],
        };

        match self.runtime.create_container(request).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_already_exists() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Bot ids of all sandbox containers. Containers without the bot label
    /// are skipped, not errored.
    pub async fn list_bots(&self) -> Result<Vec<String>, SandboxError> {
        let containers = self.runtime.list_containers().await?;
        let bots = containers
            .into_iter()
            .filter(|c| c.id.starts_with(CONTAINER_PREFIX))
            .filter_map(|c| c.labels.get(BOT_LABEL_KEY).cloned())
            .collect();
        Ok(bots)
    }

    /// Ensure the bot exists, then start its task without attached stdio.
    /// Starting an already-running task is not idempotent — the runtime
    /// error comes back as-is.
    pub async fn start(&self, bot_id: &str) -> Result<(), SandboxError> {
        self.ensure_bot(bot_id).await?;
        self.runtime
            .start_task(
                &self.cfg.container_id(bot_id),
                &StartTaskOptions { use_stdio: false },
            )
            .await?;
        Ok(())
    }

    /// Graceful-then-forced stop. An already-stopped or missing task is not
    /// an error for the caller.
    pub async fn stop(&self, bot_id: &str, timeout: Duration) -> Result<(), SandboxError> {
        validate_bot_id(bot_id)?;
        let container_id = self.cfg.container_id(bot_id);
        match self
            .runtime
            .stop_task(&container_id, &StopTaskOptions {
                timeout,
                force: true,
            })
            .await
        {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => {
                debug!(container_id, "stop: task already gone");
                Ok(())
            },
            Err(err) => Err(err.into()),
        }
    }

    /// Delete the bot's container. The task delete is best-effort; only the
    /// container delete error is returned. The data directory stays.
    pub async fn delete(&self, bot_id: &str) -> Result<(), SandboxError> {
        validate_bot_id(bot_id)?;
        let container_id = self.cfg.container_id(bot_id);
        let _ = self
            .runtime
            .delete_task(&container_id, &DeleteTaskOptions { force: true })
            .await;
        self.runtime
            .delete_container(&container_id, &DeleteContainerOptions {
                cleanup_snapshot: true,
            })
            .await?;
        Ok(())
    }

    /// Run a command inside the bot's sandbox.
    ///
    /// A version checkpoint is written before the exec is issued, so a crash
    /// mid-exec still leaves one; the checkpoint+exec pair is not atomic and
    /// an orphaned checkpoint is an accepted failure mode. A non-zero exit
    /// code is not an error.
    pub async fn exec(&self, req: ExecRequest) -> Result<ExecResult, SandboxError> {
        validate_bot_id(&req.bot_id)?;
        if req.command.is_empty() {
            return Err(SandboxError::EmptyCommand);
        }
        let Some(audit) = self.audit.as_ref() else {
            return Err(SandboxError::AuditNotConfigured);
        };

        let started = Instant::now();
        audit.create_version(&req.bot_id).await?;

        let container_id = self.cfg.container_id(&req.bot_id);
        let result = self
            .runtime
            .exec_task(&container_id, ExecTaskRequest {
                args: req.command.clone(),
                env: req.env,
                work_dir: req.work_dir.clone(),
                terminal: req.terminal,
                use_stdio: req.use_stdio,
            })
            .await?;

        audit
            .insert_event(
                &container_id,
                "exec",
                json!({
                    "bot_id": req.bot_id,
                    "command": req.command,
                    "work_dir": req.work_dir,
                    "exit_code": result.exit_code,
                    "duration_ms": started.elapsed().as_millis() as u64,
                }),
            )
            .await?;

        Ok(ExecResult {
            exit_code: result.exit_code,
        })
    }

    /// Commit a named snapshot of the bot's container.
    pub async fn snapshot(&self, bot_id: &str, snapshot_name: &str) -> Result<(), SandboxError> {
        validate_bot_id(bot_id)?;
        self.runtime
            .commit_snapshot(&self.cfg.container_id(bot_id), snapshot_name)
            .await?;
        Ok(())
    }

    /// Host data directory for a bot, created on demand.
    pub fn data_dir(&self, bot_id: &str) -> Result<PathBuf, SandboxError> {
        validate_bot_id(bot_id)?;
        self.ensure_data_dir(bot_id)
    }

    fn ensure_data_dir(&self, bot_id: &str) -> Result<PathBuf, SandboxError> {
        let dir = self.cfg.bot_data_dir(bot_id);
        std::fs::create_dir_all(&dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{Arc, Mutex},
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        error::RuntimeError,
        runtime::{ContainerSummary, ExecTaskResult},
    };

    #[derive(Default)]
    struct FakeState {
        calls: Vec<String>,
        containers: HashMap<String, HashMap<String, String>>,
        running: HashSet<String>,
        exec_exit_code: u32,
        fail_exec: bool,
        fail_delete_task: bool,
        fail_delete_container: bool,
    }

    #[derive(Default)]
    struct FakeRuntime {
        state: Mutex<FakeState>,
    }

    impl FakeRuntime {
        fn calls(&self) -> Vec<String> {
            self.state.lock().unwrap().calls.clone()
        }
    }

    #[async_trait]
    impl SandboxRuntime for FakeRuntime {
        async fn pull_image(
            &self,
            image: &str,
            _opts: &PullImageOptions,
        ) -> Result<(), RuntimeError> {
            self.state.lock().unwrap().calls.push(format!("pull:{image}"));
            Ok(())
        }

        async fn create_container(&self, req: CreateContainerRequest) -> Result<(), RuntimeError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("create:{}", req.id));
            if state.containers.contains_key(&req.id) {
                return Err(RuntimeError::AlreadyExists(req.id));
            }
            state.containers.insert(req.id, req.labels);
            Ok(())
        }

        async fn start_task(
            &self,
            container_id: &str,
            _opts: &StartTaskOptions,
        ) -> Result<(), RuntimeError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("start:{container_id}"));
            if !state.running.insert(container_id.to_string()) {
                return Err(RuntimeError::Other(format!(
                    "task already running: {container_id}"
                )));
            }
            Ok(())
        }

        async fn stop_task(
            &self,
            container_id: &str,
            _opts: &StopTaskOptions,
        ) -> Result<(), RuntimeError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("stop:{container_id}"));
            if !state.running.remove(container_id) {
                return Err(RuntimeError::NotFound(container_id.to_string()));
            }
            Ok(())
        }

        async fn delete_task(
            &self,
            container_id: &str,
            _opts: &DeleteTaskOptions,
        ) -> Result<(), RuntimeError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("delete_task:{container_id}"));
            if state.fail_delete_task {
                return Err(RuntimeError::Other("task delete failed".into()));
            }
            state.running.remove(container_id);
            Ok(())
        }

        async fn delete_container(
            &self,
            container_id: &str,
            _opts: &DeleteContainerOptions,
        ) -> Result<(), RuntimeError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("delete_container:{container_id}"));
            if state.fail_delete_container {
                return Err(RuntimeError::Other("container delete failed".into()));
            }
            if state.containers.remove(container_id).is_none() {
                return Err(RuntimeError::NotFound(container_id.to_string()));
            }
            Ok(())
        }

        async fn exec_task(
            &self,
            container_id: &str,
            _req: ExecTaskRequest,
        ) -> Result<ExecTaskResult, RuntimeError> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("exec:{container_id}"));
            if state.fail_exec {
                return Err(RuntimeError::Other("exec failed".into()));
            }
            Ok(ExecTaskResult {
                exit_code: state.exec_exit_code,
            })
        }

        async fn commit_snapshot(
            &self,
            container_id: &str,
            snapshot_name: &str,
        ) -> Result<(), RuntimeError> {
            self.state
                .lock()
                .unwrap()
                .calls
                .push(format!("snapshot:{container_id}:{snapshot_name}"));
            Ok(())
        }

        async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
            let state = self.state.lock().unwrap();
            Ok(state
                .containers
                .iter()
                .map(|(id, labels)| ContainerSummary {
                    id: id.clone(),
                    labels: labels.clone(),
                })
                .collect())
        }
    }

    fn manager_with(runtime: Arc<FakeRuntime>) -> SandboxManager {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SandboxConfig {
            data_root: dir.keep(),
            ..SandboxConfig::default()
        };
        SandboxManager::new(runtime, cfg)
    }

    async fn memory_audit() -> AuditStore {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        AuditStore::init(&pool).await.unwrap();
        AuditStore::new(pool)
    }

    #[test]
    fn test_validate_bot_id() {
        assert!(validate_bot_id("b1").is_ok());
        assert!(validate_bot_id("bot_one-2").is_ok());

        assert!(validate_bot_id("").is_err());
        assert!(validate_bot_id("-leading").is_err());
        assert!(validate_bot_id("has space").is_err());
        assert!(validate_bot_id("a/b").is_err());
        assert!(validate_bot_id("..").is_err());
        assert!(validate_bot_id(&"x".repeat(65)).is_err());
    }

    #[tokio::test]
    async fn test_ensure_bot_twice_is_idempotent() {
        let runtime = Arc::new(FakeRuntime::default());
        let manager = manager_with(Arc::clone(&runtime));

        manager.ensure_bot("b1").await.unwrap();
        manager.ensure_bot("b1").await.unwrap();

        let bots = manager.list_bots().await.unwrap();
        assert_eq!(bots, vec!["b1".to_string()]);
    }

    #[tokio::test]
    async fn test_list_bots_skips_unlabeled_and_foreign() {
        let runtime = Arc::new(FakeRuntime::default());
        {
            let mut state = runtime.state.lock().unwrap();
            state.containers.insert("bot-orphan".into(), HashMap::new());
            state.containers.insert(
                "web-frontend".into(),
                HashMap::from([(BOT_LABEL_KEY.to_string(), "nope".to_string())]),
            );
        }
        let manager = manager_with(Arc::clone(&runtime));
        manager.ensure_bot("b1").await.unwrap();

        let bots = manager.list_bots().await.unwrap();
        assert_eq!(bots, vec!["b1".to_string()]);
    }

    #[tokio::test]
    async fn test_start_twice_surfaces_runtime_error() {
        let runtime = Arc::new(FakeRuntime::default());
        let manager = manager_with(Arc::clone(&runtime));

        manager.start("b1").await.unwrap();
        let err = manager.start("b1").await.unwrap_err();
        assert!(err.to_string().contains("already running"));
    }

    #[tokio::test]
    async fn test_stop_missing_task_is_ok() {
        let runtime = Arc::new(FakeRuntime::default());
        let manager = manager_with(Arc::clone(&runtime));

        manager
            .stop("b1", Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_ignores_task_error() {
        let runtime = Arc::new(FakeRuntime::default());
        let manager = manager_with(Arc::clone(&runtime));
        manager.ensure_bot("b1").await.unwrap();

        runtime.state.lock().unwrap().fail_delete_task = true;
        manager.delete("b1").await.unwrap();
        assert!(manager.list_bots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_returns_container_error() {
        let runtime = Arc::new(FakeRuntime::default());
        let manager = manager_with(Arc::clone(&runtime));
        manager.ensure_bot("b1").await.unwrap();

        runtime.state.lock().unwrap().fail_delete_container = true;
        let err = manager.delete("b1").await.unwrap_err();
        assert!(err.to_string().contains("container delete failed"));
    }

    #[tokio::test]
    async fn test_exec_without_audit_fails_fast() {
        let runtime = Arc::new(FakeRuntime::default());
        let manager = manager_with(Arc::clone(&runtime));

        let err = manager
            .exec(ExecRequest {
                bot_id: "b1".into(),
                command: vec!["echo".into(), "hi".into()],
                ..ExecRequest::default()
            })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "db is not configured");
        assert!(runtime.calls().is_empty(), "no runtime call may be issued");
    }

    #[tokio::test]
    async fn test_exec_rejects_empty_command() {
        let runtime = Arc::new(FakeRuntime::default());
        let manager = manager_with(Arc::clone(&runtime)).with_audit(memory_audit().await);

        let err = manager
            .exec(ExecRequest {
                bot_id: "b1".into(),
                ..ExecRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::EmptyCommand));
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_exec_records_version_and_event() {
        let runtime = Arc::new(FakeRuntime::default());
        runtime.state.lock().unwrap().exec_exit_code = 7;
        let audit = memory_audit().await;
        let manager = manager_with(Arc::clone(&runtime)).with_audit(audit.clone());

        let result = manager
            .exec(ExecRequest {
                bot_id: "b1".into(),
                command: vec!["false".into()],
                work_dir: Some("/data".into()),
                ..ExecRequest::default()
            })
            .await
            .unwrap();

        // Non-zero exit code is a result, not an error.
        assert_eq!(result.exit_code, 7);

        assert_eq!(audit.versions_for("b1").await.unwrap().len(), 1);
        let events = audit.events_for("bot-b1").await.unwrap();
        assert_eq!(events.len(), 1);
        let payload: serde_json::Value = serde_json::from_str(&events[0].payload).unwrap();
        assert_eq!(payload["bot_id"], "b1");
        assert_eq!(payload["exit_code"], 7);
        assert_eq!(payload["work_dir"], "/data");
    }

    #[tokio::test]
    async fn test_exec_failure_leaves_checkpoint_without_event() {
        let runtime = Arc::new(FakeRuntime::default());
        runtime.state.lock().unwrap().fail_exec = true;
        let audit = memory_audit().await;
        let manager = manager_with(Arc::clone(&runtime)).with_audit(audit.clone());

        let err = manager
            .exec(ExecRequest {
                bot_id: "b1".into(),
                command: vec!["true".into()],
                ..ExecRequest::default()
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exec failed"));

        assert_eq!(audit.versions_for("b1").await.unwrap().len(), 1);
        assert!(audit.events_for("bot-b1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_data_dir_is_created_on_demand() {
        let runtime = Arc::new(FakeRuntime::default());
        let manager = manager_with(runtime);

        let dir = manager.data_dir("b1").unwrap();
        assert!(dir.ends_with("bots/b1"));
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn test_snapshot_targets_bot_container() {
        let runtime = Arc::new(FakeRuntime::default());
        let manager = manager_with(Arc::clone(&runtime));

        manager.snapshot("b1", "bot-b1-backup").await.unwrap();
        assert_eq!(runtime.calls(), vec!["snapshot:bot-b1:bot-b1-backup".to_string()]);
    }
}
