use thiserror::Error;

/// Errors reported by a [`crate::SandboxRuntime`] backend.
///
/// `AlreadyExists` and `NotFound` are distinguishable so the manager can
/// swallow them where the target state is already reached; everything else
/// propagates to the caller.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("runtime failure: {0}")]
    Other(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors surfaced by [`crate::SandboxManager`].
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("invalid bot id: {0}")]
    InvalidBotId(String),
    #[error("empty command")]
    EmptyCommand,
    #[error("db is not configured")]
    AuditNotConfigured,
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("audit store failure: {0}")]
    Audit(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
