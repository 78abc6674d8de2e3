//! TaskTier CLI: the main entry point.
//!
//! Commands:
//! - `init`: Write a starter `tasktier.toml` and the store directories
//! - `chat`: Interactive or single-message chat with the task agent
//! - `search`: Query task records by header fields
//! - `skills`: List discoverable skills as JSON

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tasktier_core::entity::{Priority, Status};
use tasktier_store::SortKey;

mod commands;

#[derive(Parser)]
#[command(
    name = "tasktier",
    about = "TaskTier: task management agent with three-tier memory",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root holding tasktier.toml, CONTEXT.md, records and skills
    #[arg(short, long, global = true, default_value = ".", env = "TASKTIER_ROOT")]
    root: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create tasktier.toml and the record/skill directories
    Init,

    /// Chat with the task agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Print session id, token usage and per-step timings after each answer
        #[arg(long)]
        debug: bool,
    },

    /// Find task records; prints one path per line
    Search {
        #[arg(long)]
        status: Option<Status>,

        #[arg(long)]
        priority: Option<Priority>,

        /// Due on or after (YYYY-MM-DD)
        #[arg(long)]
        date_after: Option<NaiveDate>,

        /// Due on or before (YYYY-MM-DD)
        #[arg(long)]
        date_before: Option<NaiveDate>,

        #[arg(long)]
        project: Option<String>,

        /// Case-insensitive text in the record body
        #[arg(long)]
        text: Option<String>,

        /// id, date, created or priority
        #[arg(long, default_value = "id")]
        sort: SortKey,

        /// Print the full matching records instead of their paths
        #[arg(long)]
        full: bool,
    },

    /// List skills (name, description, path) as JSON
    Skills,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
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
        Commands::Init => commands::init::run(&cli.root).await?,
        Commands::Chat { message, debug } => commands::chat::run(&cli.root, message, debug).await?,
        Commands::Search {
            status,
            priority,
            date_after,
            date_before,
            project,
            text,
            sort,
            full,
        } => {
            let query = tasktier_store::SearchQuery {
                status,
                priority,
                date_after,
                date_before,
                project,
                text,
                sort,
            };
            commands::search::run(&cli.root, query, full).await?
        }
        Commands::Skills => commands::skills::run(&cli.root).await?,
    }

    Ok(())
}
