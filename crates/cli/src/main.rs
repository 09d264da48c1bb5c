use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use trellis_core::workspace_manager::{WorkspaceManager, WorkspaceManagerConfig};

mod commands;

/// Trellis - a plugin-driven project graph engine
#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Plugin-driven project graph construction for monorepos")]
#[command(version)]
struct Cli {
    /// Path to the workspace root (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Construct the project graph and print it
    Graph {
        /// Print the graph as JSON instead of the readable view
        #[arg(long)]
        json: bool,
    },
    /// List projects discovered in the workspace
    Projects {
        /// Print project names as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the resolved plugin list in load order
    Plugins {
        /// Print the resolved specs as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    // Initialize workspace manager with all business logic
    let manager = WorkspaceManager::new(WorkspaceManagerConfig {
        workspace_root: cli.workspace,
    })
    .map_err(|e| anyhow::anyhow!("Failed to initialize workspace: {}", e))?;

    // Execute command (CLI layer only handles presentation)
    match cli.command {
        Commands::Graph { json } => commands::graph::execute(&manager, json).await,
        Commands::Projects { json } => commands::projects::execute(&manager, json).await,
        Commands::Plugins { json } => commands::plugins::execute(&manager, json),
    }
}

/// Engine diagnostics go to stderr so stdout stays machine-readable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}
