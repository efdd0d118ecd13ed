mod sandbox_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use botpod_toolbox::{ToolGateway, ToolSessionContext, rpc};

#[derive(Parser)]
#[command(name = "botpod", about = "botpod — per-bot sandboxed execution")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the tool gateway over stdio. Runs inside the sandbox.
    Gateway {
        /// Sandbox root the filesystem tools are bound to.
        #[arg(long, env = "BOTPOD_DATA_DIR", default_value = "/data")]
        root: PathBuf,
        /// Bot id the session is bound to (empty = unbound).
        #[arg(long, default_value = "")]
        bot_id: String,
        /// Default reply target for send_message.
        #[arg(long, default_value = "")]
        reply_target: String,
        /// Platform the triggering message arrived on.
        #[arg(long, default_value = "")]
        platform: String,
    },
    /// Host-side sandbox administration.
    Sandbox(sandbox_commands::SandboxArgs),
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // Logs go to stderr: in gateway mode stdout carries the JSON-RPC stream.
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    match cli.command {
        Commands::Gateway {
            root,
            bot_id,
            reply_target,
            platform,
        } => {
            info!(version = env!("CARGO_PKG_VERSION"), root = %root.display(), "gateway starting");
            let gateway = ToolGateway::new(root);
            let session = ToolSessionContext {
                bot_id,
                reply_target,
                current_platform: platform,
            };
            rpc::serve_stdio(&gateway, &session).await
        },
        Commands::Sandbox(args) => sandbox_commands::handle_sandbox(args).await,
    }
}
