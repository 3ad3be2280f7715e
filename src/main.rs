//! # Article Harness CLI (`ahx`)
//!
//! The `ahx` binary normalizes news-article exports, embeds them, indexes
//! them into a vector store, and serves the same pipeline over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! ahx --config ./config/ahx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ahx transform <file>` | Normalize raw records into canonical documents |
//! | `ahx run <file>` | Transform, embed and index in one go |
//! | `ahx search "<query>"` | Semantic search over the indexed collection |
//! | `ahx serve` | Start the HTTP service |
//! | `ahx dead-letters` | Show rejected records and their reasons |
//!
//! ## Examples
//!
//! ```bash
//! # Transform an export, writing documents to a file
//! ahx transform export.json --output clean.json
//!
//! # Full pipeline into Qdrant
//! ahx run export.json --config ./config/ahx.toml
//!
//! # What got rejected, and why
//! ahx dead-letters --limit 20
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use article_harness::config::{self, Config};
use article_harness::dead_letter::read_dead_letters;
use article_harness::pipeline::Pipeline;
use article_harness::progress::ProgressMode;
use article_harness::server;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

/// Article Harness CLI: normalize, embed and index news-article exports.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the file does not exist, built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "ahx",
    about = "Article Harness: normalize, embed and index news-article exports",
    version,
    long_about = "Article Harness turns heterogeneous content-management exports into \
    validated {text, metadata} documents, dead-letters whatever it cannot use, and \
    indexes the rest into a vector store for semantic search."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ahx.toml`.
    #[arg(long, global = true, default_value = "./config/ahx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Normalize raw records into canonical documents.
    ///
    /// Reads a JSON array of raw records (`-` for stdin), prints the
    /// transform result as JSON and appends rejected records to the
    /// dead-letter file.
    Transform {
        /// Input file holding a JSON array of records, or `-` for stdin.
        input: PathBuf,

        /// Write the result here instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Transform, embed and index raw records.
    ///
    /// Resets the configured collection before writing.
    Run {
        /// Input file holding a JSON array of records, or `-` for stdin.
        input: PathBuf,

        /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Semantic search over the indexed collection.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long, default_value_t = 3)]
        limit: usize,
    },

    /// Start the HTTP service on `[server].bind`.
    Serve,

    /// List rejected records from the dead-letter file, newest last.
    DeadLetters {
        /// Only show the last N entries.
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config_or_default(&cli.config)?;
    init_logging(&cfg)?;

    match cli.command {
        Commands::Transform {
            input,
            output,
            progress,
        } => {
            let pipeline = build_pipeline(&cfg, progress)?;
            let records = read_input(&input)?;
            let outcome = pipeline.transform_input(&records)?;

            let result = json!({
                "status": "success",
                "processed_count": outcome.processed_count(),
                "skipped_count": outcome.skipped_count(),
                "documents": outcome.into_documents(),
            });
            let rendered = serde_json::to_string_pretty(&result)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!(
                        "Transformed {} documents ({} skipped) -> {}",
                        result["processed_count"],
                        result["skipped_count"],
                        path.display()
                    );
                }
                None => println!("{}", rendered),
            }
        }
        Commands::Run { input, progress } => {
            let pipeline = build_pipeline(&cfg, progress)?;
            let records = read_input(&input)?;
            let outcome = pipeline.transform_input(&records)?;
            if outcome.documents.is_empty() {
                println!("No valid documents found ({} skipped).", outcome.skipped_count());
                return Ok(());
            }
            let summary = pipeline.finish(outcome).await?;
            println!(
                "Indexed {} of {} documents into '{}' ({} skipped).",
                summary.indexed_count,
                summary.processed_count,
                pipeline.collection(),
                summary.skipped_count
            );
        }
        Commands::Search { query, limit } => {
            let pipeline = Pipeline::from_config_quiet(&cfg)?;
            let hits = pipeline.search(&query, limit).await?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                let title = hit.metadata["title"].as_str().unwrap_or("(untitled)");
                let url = hit.metadata["url"].as_str().unwrap_or("");
                println!("{}. [{:.3}] {}", i + 1, hit.score, title);
                println!("    {}", url);
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::DeadLetters { limit } => {
            let path = &cfg.pipeline.dead_letter_path;
            let records = read_dead_letters(path)?;
            let skip = limit.map_or(0, |n| records.len().saturating_sub(n));
            for record in &records[skip..] {
                println!("{}\t{}", record.id, record.reason);
            }
            eprintln!("{} dead letters in {}", records.len(), path.display());
        }
    }

    Ok(())
}

/// Load `path`, or fall back to defaults when it does not exist.
fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        Ok(Config::default())
    }
}

/// Install the `tracing` subscriber on stderr. `RUST_LOG` overrides
/// `[logging].filter`.
fn init_logging(cfg: &Config) -> Result<()> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::try_new(&cfg.logging.filter)
            .with_context(|| format!("Invalid logging.filter: {}", cfg.logging.filter))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_pipeline(cfg: &Config, progress: Option<ProgressMode>) -> Result<Pipeline> {
    let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
    Pipeline::from_config(cfg, Arc::from(mode.reporter()))
}

fn read_input(path: &Path) -> Result<Value> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?
    };
    serde_json::from_str(&content)
        .with_context(|| format!("Input is not valid JSON: {}", path.display()))
}
