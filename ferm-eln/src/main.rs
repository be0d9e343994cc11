//! ferm-eln - fermentation lab notebook command-line tool
//!
//! Administrative entry point to the notebook database: initialise a root folder,
//! register batches, inspect status, abort or purge a batch and export its full
//! record set as JSON.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ferm_common::config::{self, RootFolderInitializer, RootFolderResolver, TomlConfig};
use ferm_common::db::init_database;
use ferm_eln::models::{NewBatch, Phase};
use ferm_eln::{Actor, AuthLevel, Notebook};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Command-line arguments for ferm-eln
#[derive(Parser, Debug)]
#[command(name = "ferm-eln")]
#[command(about = "Fermentation lab notebook: batch lifecycle and data-integrity engine")]
#[command(version)]
struct Cli {
    /// Notebook root folder (overrides FERM_ROOT_FOLDER and the config file)
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    /// Config file (defaults to the per-user config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the root folder, database and a default config file
    Init,

    /// Register a new batch in Setup
    CreateBatch {
        #[arg(long)]
        sequence: u32,
        #[arg(long)]
        phase: Phase,
        #[arg(long)]
        vessel: String,
        #[arg(long)]
        notes: Option<String>,
        #[command(flatten)]
        actor: ActorArgs,
    },

    /// List all batches
    List,

    /// Show a batch's status and T=0
    Status { batch_id: Uuid },

    /// Abort a live batch
    Abort {
        batch_id: Uuid,
        #[arg(long)]
        reason: String,
        #[command(flatten)]
        actor: ActorArgs,
    },

    /// Print a batch's full record set as JSON
    Report { batch_id: Uuid },

    /// Delete a batch and every record it owns
    Purge {
        batch_id: Uuid,
        #[command(flatten)]
        actor: ActorArgs,
    },
}

#[derive(Args, Debug)]
struct ActorArgs {
    /// Actor identity recorded with the change
    #[arg(long)]
    actor: String,

    /// Actor authorization level
    #[arg(long, default_value = "technician")]
    level: AuthLevel,
}

impl ActorArgs {
    fn actor(&self) -> Actor {
        Actor::new(self.actor.clone(), self.level)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let toml_config = config::load_or_default(cli.config.as_deref());

    init_tracing(&toml_config)?;

    info!(
        "Starting ferm-eln v{} ({:?})",
        env!("CARGO_PKG_VERSION"),
        cli.command
    );

    let root_folder = RootFolderResolver::new(cli.root_folder.as_deref(), Some(&toml_config)).resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open notebook database {}", db_path.display()))?;
    let notebook = Notebook::new(pool, toml_config.thresholds.clone())
        .context("Invalid threshold configuration")?;

    match cli.command {
        Command::Init => {
            let config_path = cli.config.clone().or_else(config::default_config_path);
            if let Some(path) = config_path.filter(|p| !p.exists()) {
                config::write_toml_config(&toml_config, &path)
                    .with_context(|| format!("Failed to write config {}", path.display()))?;
                println!("Wrote default config to {}", path.display());
            }
            println!("Notebook ready at {}", db_path.display());
        }

        Command::CreateBatch {
            sequence,
            phase,
            vessel,
            notes,
            actor,
        } => {
            let batch = notebook
                .create_batch(NewBatch {
                    sequence_number: sequence,
                    phase,
                    vessel_id: vessel,
                    operator: actor.actor(),
                    created_at: ferm_common::time::now(),
                    notes,
                })
                .await?;
            println!("{}", batch.id);
        }

        Command::List => {
            for batch in notebook.batches().await? {
                println!(
                    "{:>5}  {}  {:<8}  {:<10}  {}",
                    batch.sequence_number, batch.phase, batch.status, batch.vessel_id, batch.id
                );
            }
        }

        Command::Status { batch_id } => {
            let batch = notebook.batch(batch_id).await?;
            println!("batch     {}", batch.id);
            println!("sequence  {}", batch.sequence_number);
            println!("status    {}", batch.status);
            match batch.inoculated_at {
                Some(t0) => println!("t0        {}", t0.to_rfc3339()),
                None => println!("t0        (not inoculated)"),
            }
            if let Some(reason) = &batch.abort_reason {
                println!("aborted   {}", reason);
            }
        }

        Command::Abort {
            batch_id,
            reason,
            actor,
        } => {
            let batch = notebook.abort_batch(&actor.actor(), batch_id, &reason).await?;
            println!("{} {}", batch.id, batch.status);
        }

        Command::Report { batch_id } => {
            let records = notebook.record_set(batch_id).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }

        Command::Purge { batch_id, actor } => {
            let counts = notebook.purge_batch(&actor.actor(), batch_id).await?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }
    }

    Ok(())
}

/// Log to stderr, or to the configured file; RUST_LOG overrides the configured level
fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid logging level")?;

    match &config.logging.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    Ok(())
}
