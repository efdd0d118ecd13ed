use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Label key carrying the owning bot id on every sandbox container.
pub const BOT_LABEL_KEY: &str = "botpod.bot_id";

/// Fixed prefix of every sandbox container id; discovery filters on it.
pub const CONTAINER_PREFIX: &str = "bot-";

/// Second bind-mount destination, fixed by the in-sandbox tool layout.
pub const APP_MOUNT: &str = "/app";

const DEFAULT_IMAGE: &str = "busybox:stable";
const DEFAULT_DATA_ROOT: &str = "/var/lib/botpod";
const DEFAULT_DATA_MOUNT: &str = "/data";

/// Sandbox manager configuration. Injected at construction; there are no
/// mutable process-wide defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Base container image pulled by `init` and used for every bot.
    pub image: String,
    /// Snapshotter hint forwarded to the runtime (backend-specific).
    pub snapshotter: Option<String>,
    /// Host directory under which per-bot data directories live.
    pub data_root: PathBuf,
    /// In-container destination of the data bind mount.
    pub data_mount: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.into(),
            snapshotter: None,
            data_root: PathBuf::from(DEFAULT_DATA_ROOT),
            data_mount: DEFAULT_DATA_MOUNT.into(),
        }
    }
}

impl SandboxConfig {
    /// Container id for a bot: fixed prefix + bot id.
    pub fn container_id(&self, bot_id: &str) -> String {
        format!("{CONTAINER_PREFIX}{bot_id}")
    }

    /// Host data directory for a bot: `data_root/bots/<bot_id>`.
    pub fn bot_data_dir(&self, bot_id: &str) -> PathBuf {
        self.data_root.join("bots").join(bot_id)
    }
}
