//! Diligence CLI
//!
//! Command-line surface over the retrieval & answer-synthesis engine:
//! document indexing, questionnaire projects, answer generation, and
//! human review.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AnswerCommand, DocumentCommand, ProjectCommand, SearchCommand, StatusCommand};
use diligence_core::{config::EngineConfig, logging, AppResult};
use std::path::PathBuf;

/// Diligence CLI - due-diligence questionnaire answering over indexed documents
#[derive(Parser, Debug)]
#[command(name = "diligence")]
#[command(about = "Answer due-diligence questionnaires from indexed documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the SQLite store
    #[arg(short, long, global = true, env = "DILIGENCE_STORE")]
    store: Option<PathBuf>,

    /// LLM provider (ollama, openai)
    #[arg(short, long, global = true, env = "DILIGENCE_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "DILIGENCE_MODEL")]
    model: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Document indexing and management
    Document(DocumentCommand),

    /// Questionnaire project management and batch generation
    Project(ProjectCommand),

    /// Single-answer generation and review
    Answer(AnswerCommand),

    /// Retrieval debugging: search the chunk index
    Search(SearchCommand),

    /// Show engine status counters
    Status(StatusCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    // Load base configuration from environment, then apply CLI overrides
    let config = EngineConfig::load()?.with_overrides(
        cli.store,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("Diligence CLI starting");
    tracing::debug!("Store: {:?}", config.store_path);
    tracing::debug!("Provider: {} ({})", config.provider, config.model);

    let command_name = match &cli.command {
        Commands::Document(_) => "document",
        Commands::Project(_) => "project",
        Commands::Answer(_) => "answer",
        Commands::Search(_) => "search",
        Commands::Status(_) => "status",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Document(cmd) => cmd.execute(&config).await,
        Commands::Project(cmd) => cmd.execute(&config).await,
        Commands::Answer(cmd) => cmd.execute(&config).await,
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Status(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
