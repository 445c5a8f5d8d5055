//! # Commute Truth Engine CLI (`cte`)
//!
//! ## Usage
//!
//! ```bash
//! cte --config ./config/cte.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cte serve` | Start the HTTP API |
//! | `cte route <origin> <destination>` | Run the full pipeline and print the envelope |
//! | `cte threads <origin> <destination>` | Show the candidate threads only |
//! | `cte scrape <url>` | Print the extracted text of one thread |
//! | `cte knowledge` | List the loaded reference documents |
//!
//! Logs go to stderr and honor `RUST_LOG`; results go to stdout.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use commute_truth::config::{self, Config};
use commute_truth::knowledge::KnowledgeStore;
use commute_truth::models::RouteQuery;
use commute_truth::pipeline::RouteAnalyzer;
use commute_truth::scrape::{ContentExtractor, HttpFetcher};
use commute_truth::search::{RedditSearch, ThreadFinder};
use commute_truth::server;

/// Commute Truth Engine: community route advice, checked against official
/// fares.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/cte.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "cte",
    about = "Commute Truth Engine: crowd-sourced commute itineraries checked against official data",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/cte.toml`. When the file does not exist the
    /// built-in defaults are used.
    #[arg(long, global = true, default_value = "./config/cte.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API.
    ///
    /// Loads the knowledge store once, then serves `POST /analyze_route`
    /// and `GET /health` on `[server].bind`.
    Serve,

    /// Run the full pipeline for one route and print the JSON envelope.
    Route { origin: String, destination: String },

    /// Run the Thread Finder only and list the candidates.
    Threads { origin: String, destination: String },

    /// Fetch one thread and print its extracted text.
    Scrape { url: String },

    /// List the reference documents found under `[knowledge].root`.
    Knowledge,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &Path) -> Result<Config> {
    if path.exists() {
        return config::load_config(path);
    }
    warn!(path = %path.display(), "config file not found, using defaults");
    let config = Config::default();
    config::validate(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Route {
            origin,
            destination,
        } => {
            let knowledge = Arc::new(KnowledgeStore::load(&cfg.knowledge)?);
            let analyzer = RouteAnalyzer::from_config(&cfg, knowledge)?;
            let response = analyzer
                .respond(&RouteQuery::new(origin, destination))
                .await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Threads {
            origin,
            destination,
        } => {
            let finder = ThreadFinder::new(Arc::new(RedditSearch::new(&cfg.search)?), &cfg.search);
            let candidates = finder
                .find_threads(&RouteQuery::new(origin, destination))
                .await;
            if candidates.is_empty() {
                println!("No relevant threads found.");
            }
            for (i, c) in candidates.iter().enumerate() {
                println!(
                    "{}. [{} comments] {}",
                    i + 1,
                    c.comment_count,
                    c.title.as_deref().unwrap_or("(untitled)")
                );
                println!("   {}", c.url);
            }
        }
        Commands::Scrape { url } => {
            let extractor = ContentExtractor::new(
                Arc::new(HttpFetcher::new(&cfg.scrape)?),
                cfg.scrape.clone(),
            );
            let text = extractor.extract_content(&url).await;
            if text.is_empty() {
                println!("(no usable content)");
            } else {
                println!("{}", text);
            }
        }
        Commands::Knowledge => {
            let store = KnowledgeStore::load(&cfg.knowledge)?;
            if store.documents().is_empty() {
                println!("No reference documents under {}", cfg.knowledge.root.display());
            }
            for doc in store.documents() {
                println!("{:<40} {:>3} pages {:>8} chars", doc.name, doc.pages, doc.chars);
            }
            println!(
                "Total reference text: {} chars",
                store.reference_text().chars().count()
            );
        }
    }

    Ok(())
}
