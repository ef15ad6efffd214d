//! stepwise CLI, the main entry point.
//!
//! Commands:
//! - `init` writes the default config
//! - `run`  runs a single agent on a task
//! - `flow` plans a task and runs it step by step

use clap::{Parser, Subcommand};
use stepwise_runtime::TaskKind;

mod commands;

#[derive(Parser)]
#[command(
    name = "stepwise",
    about = "stepwise: plan, act and ask the operator when stuck",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration
    Init,

    /// Run a single agent on a task
    Run {
        /// The task to accomplish
        #[arg(short, long)]
        message: String,
    },

    /// Plan a task, then run each step with an executor agent
    Flow {
        /// The task to accomplish
        #[arg(short, long)]
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Run { message } => commands::task::run(&message, TaskKind::Agent).await?,
        Commands::Flow { message } => commands::task::run(&message, TaskKind::Flow).await?,
    }

    Ok(())
}
