use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docqa::{config, context::AppContext, logging, processing::RetrievalService};

#[derive(Parser)]
#[command(
    name = "docqa-cli",
    about = "Ingest documents and query the local docqa store"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk, and store a text or PDF file.
    Ingest {
        path: PathBuf,
        /// Source label stored with each chunk (defaults to the file name).
        #[arg(long)]
        source: Option<String>,
    },
    /// Print the chunks most similar to a question.
    Ask {
        query: String,
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Summarize the themes of the chunks retrieved for a question.
    Themes {
        query: String,
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Print the collection name, record count, and database path.
    Stats,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("Invalid configuration")?;
    logging::init_cli_tracing();
    config.trace_loaded();

    let context = AppContext::initialize(config.clone())
        .await
        .context("Failed to initialize application context")?;
    let extractor = context.extractor.clone();
    let service = RetrievalService::new(context)?;

    match cli.command {
        Command::Ingest { path, source } => {
            let bytes =
                fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            let filename = file_label(&path);
            let text = extractor.extract(&bytes, &filename)?;
            let label = source.unwrap_or(filename);
            let outcome = service.ingest(&text, &label).await?;
            println!("stored {} chunks from {}", outcome.chunks, label);
        }
        Command::Ask { query, k } => {
            let hits = service.ask(&query, k).await?;
            if hits.is_empty() {
                println!("no matching chunks");
            }
            for (rank, hit) in hits.iter().enumerate() {
                println!("{}. [{}] {}", rank + 1, hit.meta.source, hit.content);
            }
        }
        Command::Themes { query, k } => {
            let summary = service.summarize_themes(&query, k).await?;
            println!("{}", summary.themes);
        }
        Command::Stats => {
            let health = service.health().await?;
            println!("collection: {}", health.collection);
            println!("records: {}", health.records);
            println!("database: {}", config.db_path.display());
        }
    }
    Ok(())
}

fn file_label(path: &std::path::Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}
