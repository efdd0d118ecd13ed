use std::{collections::HashMap, path::PathBuf, time::Duration};

use async_trait::async_trait;

use crate::error::RuntimeError;

/// Bind mount attached at container creation.
#[derive(Debug, Clone)]
pub struct ContainerMount {
    pub source: PathBuf,
    pub destination: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PullImageOptions {
    /// Unpack the image after pulling (backend-specific, ignored by Docker).
    pub unpack: bool,
    pub snapshotter: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateContainerRequest {
    pub id: String,
    pub image: String,
    pub snapshotter: Option<String>,
    pub labels: HashMap<String, String>,
    pub mounts: Vec<ContainerMount>,
}

#[derive(Debug, Clone, Default)]
pub struct StartTaskOptions {
    pub use_stdio: bool,
}

#[derive(Debug, Clone)]
pub struct StopTaskOptions {
    /// Grace period before the stop is forced.
    pub timeout: Duration,
    pub force: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteTaskOptions {
    pub force: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteContainerOptions {
    pub cleanup_snapshot: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ExecTaskRequest {
    pub args: Vec<String>,
    /// `KEY=value` pairs.
    pub env: Vec<String>,
    pub work_dir: Option<String>,
    pub terminal: bool,
    pub use_stdio: bool,
}

#[derive(Debug, Clone)]
pub struct ExecTaskResult {
    pub exit_code: u32,
}

/// One container as reported by `list_containers`.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,
    pub labels: HashMap<String, String>,
}

/// Container runtime capability. [`crate::SandboxManager`] depends only on
/// this trait; tests substitute a fake implementation.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    async fn pull_image(&self, image: &str, opts: &PullImageOptions) -> Result<(), RuntimeError>;

    async fn create_container(&self, req: CreateContainerRequest) -> Result<(), RuntimeError>;

    async fn start_task(
        &self,
        container_id: &str,
        opts: &StartTaskOptions,
    ) -> Result<(), RuntimeError>;

    async fn stop_task(
        &self,
        container_id: &str,
        opts: &StopTaskOptions,
    ) -> Result<(), RuntimeError>;

    async fn delete_task(
        &self,
        container_id: &str,
        opts: &DeleteTaskOptions,
    ) -> Result<(), RuntimeError>;

    async fn delete_container(
        &self,
        container_id: &str,
        opts: &DeleteContainerOptions,
    ) -> Result<(), RuntimeError>;

    async fn exec_task(
        &self,
        container_id: &str,
        req: ExecTaskRequest,
    ) -> Result<ExecTaskResult, RuntimeError>;

    /// Commit the container's current filesystem as a named snapshot/image.
    async fn commit_snapshot(
        &self,
        container_id: &str,
        snapshot_name: &str,
    ) -> Result<(), RuntimeError>;

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError>;
}
