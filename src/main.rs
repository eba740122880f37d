//! # forumrag CLI
//!
//! Usage:
//!   forumrag                             # Interactive question loop
//!   forumrag --api-key sk-...            # Key on the command line
//!   forumrag ingest posts.json           # Load a scraper export into the database

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use forumrag::config::{API_KEY_ENV, Config, Settings};
use forumrag::ingest::{self, DEFAULT_SOURCE};
use forumrag::query::{ForumQuerySystem, build_embedder};
use forumrag::store::SqliteStore;
use forumrag::{Error, repl};

#[derive(Parser)]
#[command(name = "forumrag", version, about = "Ask questions about scraped forum posts")]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, default_value = "")]
    config: String,

    /// OpenAI API key (otherwise OPENAI_API_KEY or the .env file)
    #[arg(long)]
    api_key: Option<String>,

    /// Database path, overrides the configuration file
    #[arg(long)]
    db: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive question loop (default)
    Query,
    /// Load a JSON export of scraped posts into the database
    Ingest {
        file: PathBuf,
        /// Source tag stored with every post
        #[arg(long, default_value = DEFAULT_SOURCE)]
        source: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "forumrag=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let mut config = Config::load(&cli.config)?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    match cli.command.unwrap_or(Command::Query) {
        Command::Query => run_query(config, cli.api_key.as_deref()),
        Command::Ingest { file, source } => run_ingest(&config, &file, &source),
    }
}

fn run_query(config: Config, api_key: Option<&str>) -> Result<()> {
    let settings = match Settings::resolve(config, api_key) {
        Ok(settings) => settings,
        Err(Error::Configuration(msg)) => {
            eprintln!("Error: {msg}");
            eprintln!("Please set your OpenAI API key:");
            eprintln!("1. Set environment variable: export {API_KEY_ENV}='your-key-here'");
            eprintln!("2. Or pass it directly: forumrag --api-key your-key-here");
            std::process::exit(2);
        }
        Err(e) => return Err(e.into()),
    };

    let system = ForumQuerySystem::open(&settings).context("failed to start query system")?;
    info!(
        posts = system.post_count()?,
        strategy = system.strategy(),
        "query system ready"
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let outcome = repl::run(&system, stdin.lock(), &mut stdout);

    system.close()?;
    outcome.context("terminal I/O failed")
}

fn run_ingest(config: &Config, file: &Path, source: &str) -> Result<()> {
    config.validate()?;

    let mut store = SqliteStore::create(&config.db_path)
        .with_context(|| format!("failed to open database: {}", config.db_path))?;
    let embedder = build_embedder(config)?;

    let summary = ingest::ingest_file(&mut store, embedder.as_ref(), file, source)?;
    println!(
        "Inserted {} posts ({} without text skipped, {} failed to embed)",
        summary.inserted, summary.skipped, summary.failed
    );
    Ok(())
}
