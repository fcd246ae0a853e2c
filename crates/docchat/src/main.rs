//! # DocChat CLI (`docchat`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat init` | Create the SQLite database and run schema migrations |
//! | `docchat serve` | Start the HTTP API |
//! | `docchat ingest <file> --user <name>` | Ingest a PDF for an existing user |
//! | `docchat documents --user <name>` | List a user's documents |
//!
//! ```bash
//! docchat --config ./config/docchat.toml init
//! docchat --config ./config/docchat.toml serve
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use docchat::config::{self, Config, LoggingConfig};
use docchat::ingest::{ingest_pdf, IngestSettings};
use docchat::services::Services;
use docchat::{documents, migrate, server};

/// DocChat: ask questions about your PDFs.
#[derive(Parser)]
#[command(name = "docchat", version, about = "Ask questions about your PDFs")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start the HTTP API server.
    Serve,

    /// Ingest a PDF file on behalf of a registered user.
    Ingest {
        /// Path to the PDF.
        file: PathBuf,

        /// Username that will own the document.
        #[arg(long)]
        user: String,
    },

    /// List documents owned by a user.
    Documents {
        #[arg(long)]
        user: String,
    },
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn user_id_for(services: &Services, username: &str) -> anyhow::Result<String> {
    match services.store.find_user_by_username(username).await? {
        Some(user) => Ok(user.id),
        None => bail!("No such user: {}", username),
    }
}

async fn run_ingest(cfg: &Config, file: &Path, username: &str) -> anyhow::Result<()> {
    let services = Services::from_config(cfg).await?;
    let user_id = user_id_for(&services, username).await?;
    let settings = IngestSettings::from_config(cfg)?;

    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid file name: {}", file.display()))?;
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let doc = ingest_pdf(&services, &settings, &user_id, filename, bytes).await?;
    println!(
        "Ingested {} as {} ({}/{} chunks indexed)",
        doc.filename, doc.id, doc.indexed_chunks, doc.chunk_count
    );
    Ok(())
}

async fn run_documents(cfg: &Config, username: &str) -> anyhow::Result<()> {
    let services = Services::from_config(cfg).await?;
    let user_id = user_id_for(&services, username).await?;
    let docs = documents::list_documents(services.store.as_ref(), &user_id).await?;

    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    for doc in docs {
        println!(
            "{}  {}  {}  {}/{} chunks",
            doc.id,
            doc.upload_date.format("%Y-%m-%d %H:%M"),
            doc.filename,
            doc.indexed_chunks,
            doc.chunk_count
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_logging(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest { file, user } => {
            run_ingest(&cfg, &file, &user).await?;
        }
        Commands::Documents { user } => {
            run_documents(&cfg, &user).await?;
        }
    }

    Ok(())
}
