use std::{
    path::PathBuf,
    str::FromStr,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use {
    anyhow::Result,
    clap::{Args, Subcommand},
    sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use botpod_sandbox::{
    AuditStore, ExecRequest, SandboxConfig, SandboxManager, docker::DockerCliRuntime,
};

#[derive(Args)]
pub struct SandboxArgs {
    /// Base container image.
    #[arg(long, env = "BOTPOD_IMAGE")]
    image: Option<String>,

    /// Host directory holding per-bot data directories.
    #[arg(long, env = "BOTPOD_DATA_ROOT")]
    data_root: Option<PathBuf>,

    /// SQLite URL of the audit store (required for exec).
    #[arg(long, env = "BOTPOD_DB")]
    db: Option<String>,

    #[command(subcommand)]
    action: SandboxAction,
}

#[derive(Subcommand)]
pub enum SandboxAction {
    /// Pull the base image.
    Init,
    /// Create a bot's container and data directory if missing.
    Ensure { bot_id: String },
    /// List bots that have a sandbox container.
    List,
    /// Start a bot's sandbox.
    Start { bot_id: String },
    /// Stop a bot's sandbox.
    Stop {
        bot_id: String,
        /// Grace period before the stop is forced.
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },
    /// Delete a bot's container. The data directory stays.
    Delete { bot_id: String },
    /// Run a command inside a bot's sandbox.
    Exec {
        bot_id: String,
        /// Working directory inside the container.
        #[arg(long)]
        workdir: Option<String>,
        /// KEY=value environment entries.
        #[arg(long = "env")]
        env: Vec<String>,
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// Commit a named snapshot of a bot's container.
    Snapshot {
        bot_id: String,
        /// Snapshot name; defaults to <container-id>-<unix-seconds>.
        #[arg(long)]
        name: Option<String>,
    },
}

pub async fn handle_sandbox(args: SandboxArgs) -> Result<()> {
    let mut cfg = SandboxConfig::default();
    if let Some(image) = args.image {
        cfg.image = image;
    }
    if let Some(data_root) = args.data_root {
        cfg.data_root = data_root;
    }

    let mut manager = SandboxManager::new(Arc::new(DockerCliRuntime::new()), cfg.clone());
    if let Some(ref url) = args.db {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        AuditStore::init(&pool).await?;
        manager = manager.with_audit(AuditStore::new(pool));
    }

    match args.action {
        SandboxAction::Init => {
            manager.init().await?;
            println!("Base image ready.");
        },
        SandboxAction::Ensure { bot_id } => {
            manager.ensure_bot(&bot_id).await?;
            println!("Sandbox ready for {bot_id}.");
        },
        SandboxAction::List => {
            let bots = manager.list_bots().await?;
            if bots.is_empty() {
                println!("No sandboxes found.");
            } else {
                for bot in bots {
                    println!("{bot}");
                }
            }
        },
        SandboxAction::Start { bot_id } => {
            manager.start(&bot_id).await?;
            println!("Started {bot_id}.");
        },
        SandboxAction::Stop {
            bot_id,
            timeout_secs,
        } => {
            manager
                .stop(&bot_id, Duration::from_secs(timeout_secs))
                .await?;
            println!("Stopped {bot_id}.");
        },
        SandboxAction::Delete { bot_id } => {
            manager.delete(&bot_id).await?;
            println!("Deleted {bot_id}.");
        },
        SandboxAction::Exec {
            bot_id,
            workdir,
            env,
            command,
        } => {
            let result = manager
                .exec(ExecRequest {
                    bot_id,
                    command,
                    env,
                    work_dir: workdir,
                    terminal: false,
                    use_stdio: true,
                })
                .await?;
            if result.exit_code != 0 {
                std::process::exit(i32::try_from(result.exit_code).unwrap_or(1));
            }
        },
        SandboxAction::Snapshot { bot_id, name } => {
            let name = name.unwrap_or_else(|| {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                format!("{}-{now}", cfg.container_id(&bot_id))
            });
            manager.snapshot(&bot_id, &name).await?;
            println!("Snapshot created: {name}");
        },
    }
    Ok(())
}
