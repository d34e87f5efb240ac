use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use devsync::config::load_or_default;
use devsync::lifecycle::{Orchestrator, Task};
use devsync::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "devsync", version)]
#[command(about = "Run the development server behind a live-reload proxy", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./devsync.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Watch templates and static assets, broadcasting reloads
    Watch,
    /// Start the reload proxy in front of the upstream
    ProxyInit,
    /// Start the backend development server
    RunServer,
    /// run-server, then proxy-init, then watch
    Default,
}

impl From<Commands> for Task {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Watch => Task::Watch,
            Commands::ProxyInit => Task::ProxyInit,
            Commands::RunServer => Task::RunServer,
            Commands::Default => Task::Default,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_or_default(cli.config.as_deref())?;
    logging::init_logging(&config.observability.log_level);

    let task = cli.command.map(Task::from).unwrap_or(Task::Default);
    tracing::info!(
        task = task.name(),
        server = %config.server.command_line(),
        proxy = %config.proxy.bind_address,
        upstream = %config.proxy.upstream,
        watch_root = %config.watch.root.display(),
        "devsync v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut orchestrator = Orchestrator::new(config);
    let session = orchestrator.start(task).await?;
    session.run_until_shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
