mod config;
mod diagram_cmd;
mod run_cmd;
mod serve;
mod status_cmd;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use sous_db::pool;

#[derive(Parser)]
#[command(name = "sous", about = "Meal-plan preparation planner and task orchestrator")]
struct Cli {
    /// Database URL (overrides SOUS_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a sous config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/sous")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the sous database (create it and run migrations)
    DbInit,
    /// Run the workers, queue loader, and status server
    Run {
        /// Port for the local status/readiness endpoint
        #[arg(long, default_value_t = 8080)]
        status_port: u16,
    },
    /// Render a recipe's step graph as Mermaid flowchart text
    Diagram {
        /// Path to a recipe JSON document
        recipe: PathBuf,
    },
    /// Show meal plan and preparation task counts
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            let path = config::init_config(&db_url, force)?;
            println!("wrote config to {}", path.display());
        }
        Commands::DbInit => {
            let db = config::resolve_db_config(cli.database_url.as_deref());
            pool::ensure_database_exists(&db).await?;
            let pool = pool::create_pool(&db).await?;
            pool::run_migrations(&pool).await?;
            println!("database initialized at {}", db.database_url);
        }
        Commands::Run { status_port } => {
            let db = config::resolve_db_config(cli.database_url.as_deref());
            run_cmd::run(db, status_port).await?;
        }
        Commands::Diagram { recipe } => {
            let diagram = diagram_cmd::render_from_file(&recipe)
                .with_context(|| format!("failed to render {}", recipe.display()))?;
            print!("{diagram}");
        }
        Commands::Status => {
            let db = config::resolve_db_config(cli.database_url.as_deref());
            status_cmd::show(&db).await?;
        }
    }

    Ok(())
}
