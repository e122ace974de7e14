//! CLI for running schema migrations.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

use autopilot_core::config::Config;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Parser)]
#[command(name = "migrate_cli")]
#[command(about = "Schema migration CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all pending migrations
    Run,
    /// List known migrations
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Run => {
            let pool = PgPool::connect(&config.database_url)
                .await
                .context("failed to connect to database")?;
            MIGRATOR.run(&pool).await.context("migration failed")?;
            info!("migrations applied");
        }
        Commands::List => {
            for migration in MIGRATOR.iter() {
                println!("{:>4} {}", migration.version, migration.description);
            }
        }
    }

    Ok(())
}
