//! lspgate - multi-tenant language server gateway.
//!
//! This is the main entry point for the lspgate CLI.

use clap::{Parser, Subcommand};
use lspgate_sandbox::{SandboxConfig, WorkspaceManager};
use lspgate_server::{create_router, spawn_sweeper, AppState};
use lspgate_supervisor::{default_specs, LaunchSpec, ProcessRegistry};
use lspgate_util::{init_logging, LogConfig, LogLevel};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "lspgate")]
#[command(author, version, about = "Multi-tenant language server gateway", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Address to bind to
        #[arg(short, long, default_value = "127.0.0.1:9257")]
        address: SocketAddr,

        /// Base directory for session workspaces
        #[arg(long)]
        workspace_dir: Option<PathBuf>,

        /// Workspace retention window in seconds
        #[arg(long, default_value_t = 86_400)]
        retention_secs: u64,

        /// Interval between retention sweeps in seconds
        #[arg(long, default_value_t = 3_600)]
        sweep_interval_secs: u64,

        /// Path to a JSON file with extra launch specs
        #[arg(long)]
        launch_specs: Option<PathBuf>,
    },
    /// List the languages the gateway can serve
    Languages,
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    init_logging(LogConfig {
        print: true,
        level,
        include_location: cli.verbose,
    });

    match cli.command {
        Some(Commands::Serve {
            address,
            workspace_dir,
            retention_secs,
            sweep_interval_secs,
            launch_specs,
        }) => {
            serve(
                address,
                workspace_dir,
                retention_secs,
                sweep_interval_secs,
                launch_specs,
            )
            .await
        }
        Some(Commands::Languages) => {
            for spec in default_specs() {
                let sharing = if spec.shared_per_room {
                    "shared per room"
                } else {
                    "one per connection"
                };
                println!("{:<10} {} ({sharing})", spec.language, spec.command);
            }
            Ok(())
        }
        Some(Commands::Version) | None => {
            println!("lspgate {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn serve(
    address: SocketAddr,
    workspace_dir: Option<PathBuf>,
    retention_secs: u64,
    sweep_interval_secs: u64,
    launch_specs: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut sandbox_config = SandboxConfig::default();
    if let Some(dir) = workspace_dir {
        sandbox_config = sandbox_config.with_base_dir(dir);
    }
    sandbox_config = sandbox_config.with_retention(Duration::from_secs(retention_secs));

    let specs = load_specs(launch_specs).await?;
    let languages: Vec<_> = specs.iter().map(|s| s.language.clone()).collect();

    let workspaces = Arc::new(WorkspaceManager::new(sandbox_config));
    let registry = Arc::new(ProcessRegistry::new(specs));
    let state = AppState::new(Arc::clone(&registry), Arc::clone(&workspaces));

    let sweeper = spawn_sweeper(workspaces, Duration::from_secs(sweep_interval_secs));

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!(%address, ?languages, "lspgate listening");

    axum_serve(listener, router, registry, sweeper).await
}

async fn axum_serve(
    listener: tokio::net::TcpListener,
    router: axum::Router,
    registry: Arc<ProcessRegistry>,
    sweeper: tokio::task::JoinHandle<()>,
) -> anyhow::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    sweeper.abort();
    registry.shutdown_all().await;
    info!("all language servers stopped");
    Ok(())
}

/// Built-in specs, optionally extended or overridden from a JSON file.
async fn load_specs(path: Option<PathBuf>) -> anyhow::Result<Vec<LaunchSpec>> {
    let mut specs = default_specs();
    if let Some(path) = path {
        let raw = tokio::fs::read_to_string(&path).await?;
        let extra: Vec<LaunchSpec> = serde_json::from_str(&raw)?;
        for spec in extra {
            specs.retain(|s| s.language != spec.language);
            specs.push(spec);
        }
    }
    Ok(specs)
}
