//! # Docshelf CLI
//!
//! The `docshelf` binary drives the document backend: schema setup, the HTTP
//! server, index rebuilds, and quick stats from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! docshelf --config ./config/docshelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docshelf init` | Create the SQLite database, search index, and upload directory |
//! | `docshelf serve` | Start the HTTP API server |
//! | `docshelf reindex` | Re-extract and re-index every stored file |
//! | `docshelf stats` | Print aggregate counts across all users |

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docshelf::{config, db, index::SearchIndex, migrate, pipeline, server, store::MetadataStore};

/// Docshelf — a self-hosted document storage and full-text search backend.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docshelf.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docshelf",
    about = "Docshelf — document storage with full-text search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docshelf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize storage.
    ///
    /// Creates the SQLite database with all tables, the search index
    /// directory, and the upload directory. Idempotent — running it
    /// multiple times is safe.
    Init,

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// upload, search, and auth endpoints.
    Serve,

    /// Rebuild the search index from stored files.
    ///
    /// Sweeps every file in the metadata store through extraction and
    /// indexing again. Recovers files whose original indexing job was
    /// dropped and rebuilds after an index wipe.
    Reindex,

    /// Print aggregate storage counts across all users.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docshelf=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            SearchIndex::open(&cfg.index.path)?;
            std::fs::create_dir_all(&cfg.uploads.dir)?;
            println!("Initialized database, search index, and upload directory.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Reindex => {
            let pool = db::connect(&cfg).await?;
            migrate::apply(&pool).await?;
            let store = MetadataStore::new(pool);
            let index = Arc::new(SearchIndex::open(&cfg.index.path)?);
            let report = pipeline::reindex_all(&store, &index).await?;
            println!("Reindexed {} files ({} failed).", report.indexed, report.failed);
        }
        Commands::Stats => {
            let pool = db::connect(&cfg).await?;
            migrate::apply(&pool).await?;
            let store = MetadataStore::new(pool);
            let stats = store.stats(None).await?;
            println!("Total files:    {}", stats.total_files);
            println!("Indexed files:  {}", stats.indexed_files);
            println!("Recent (7d):    {}", stats.recent_files);
            println!("Total size:     {}", stats.total_size);
            if !stats.file_types.is_empty() {
                println!("\nBy type:");
                for entry in &stats.file_types {
                    println!(
                        "  {:<8} {:>6}  {}",
                        entry.extension, entry.count, entry.total_size
                    );
                }
            }
        }
    }

    Ok(())
}
