//! # status-rag CLI (`srag`)
//!
//! Answers natural-language questions about project-status updates.
//!
//! ## Usage
//!
//! ```bash
//! srag --config ./config/srag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `srag serve` | Start the HTTP server (`POST /api/nl-search`, `GET /health`) |
//! | `srag ask "<question>"` | Answer one question and print sources and meta |
//! | `srag index` | Build the embedding index and report on it |
//! | `srag check` | Validate config and corpus, and probe both models |
//!
//! ## Examples
//!
//! ```bash
//! # Which projects are blocked on budget?
//! srag ask "budget shortfall" --config ./config/srag.toml
//!
//! # Same, with attempts, query terms, and top scores
//! srag ask "budget shortfall" --debug
//!
//! # Serve with JSON logs at debug level
//! SRAG_LOG=status_rag=debug srag --log-format json serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use status_rag::logging::{init_tracing, LogFormat};
use status_rag::{ask, check, config, index_cmd, server};

/// status-rag CLI: retrieval-augmented answers over project-status updates.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/srag.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "srag",
    about = "Retrieval-augmented question answering over project-status updates",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/srag.toml")]
    config: PathBuf,

    /// Log output format. Logs go to stderr; filter with `SRAG_LOG`.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind`. The embedding index is built on the
    /// first query, not at startup.
    Serve,

    /// Answer one question against the corpus.
    Ask {
        /// The question.
        question: String,

        /// Include attempts, query terms, and top scores.
        #[arg(long)]
        debug: bool,

        /// Print the raw JSON response body.
        #[arg(long)]
        json: bool,
    },

    /// Build the embedding index and print entry count, blank count, and fingerprint.
    Index,

    /// Validate config and corpus, construct providers, and probe both models.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ask {
            question,
            debug,
            json,
        } => {
            ask::run_ask(&cfg, &question, debug, json).await?;
        }
        Commands::Index => {
            index_cmd::run_index(&cfg).await?;
        }
        Commands::Check => {
            check::run_check(&cfg).await?;
        }
    }

    Ok(())
}
