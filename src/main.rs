//! # Folio CLI (`folio`)
//!
//! The `folio` binary answers questions about a personal document corpus
//! using intent-aware retrieval and a chat-completion model.
//!
//! ## Usage
//!
//! ```bash
//! folio --config ./config/folio.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `folio ask "<question>"` | Answer one question |
//! | `folio search "<query>"` | Show the scored retrieval candidates for a query |
//! | `folio chat` | Interactive session with shared cache and history |
//! | `folio stats` | Vector index status and configured budgets |
//!
//! ## Examples
//!
//! ```bash
//! # Ask with streaming output
//! folio ask "what projects have you built with Rust?" --stream
//!
//! # Inspect what retrieval would feed the model
//! folio search "caching" --intent experience_deepdive --rerank
//!
//! # Continue an earlier conversation
//! folio chat --session 3f1c...
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use folio_rag::ask::{run_ask, AskOptions};
use folio_rag::chat::run_chat;
use folio_rag::config;
use folio_rag::logging::init_logging;
use folio_rag::search::run_search;
use folio_rag::stats::run_stats;
use folio_rag_core::intent::Intent;

/// Folio: intent-aware retrieval-augmented chat over your documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/folio.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "folio",
    about = "Folio — intent-aware retrieval-augmented chat over your documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/folio.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Answer a single question.
    Ask {
        /// The question to answer.
        question: String,

        /// Skip classification and use this intent
        /// (quick_answer, project_deepdive, experience_deepdive, code_walkthrough,
        /// skill_assessment, comparison, tour, general).
        #[arg(long, value_parser = parse_intent)]
        intent: Option<Intent>,

        /// Session ID to attach the exchange to.
        #[arg(long)]
        session: Option<String>,

        /// Section of the site the question was asked from.
        #[arg(long)]
        section: Option<String>,

        /// Print the answer as it is generated.
        #[arg(long)]
        stream: bool,

        /// Do not read or write the response cache.
        #[arg(long)]
        no_cache: bool,
    },

    /// Show the candidates retrieval would hand to the model.
    Search {
        /// The search query string.
        query: String,

        /// Intent whose retrieval settings to use; classified by rules when omitted.
        #[arg(long, value_parser = parse_intent)]
        intent: Option<Intent>,

        /// Number of candidates; defaults to the intent's setting.
        #[arg(long)]
        k: Option<usize>,

        /// Apply model reranking to the fused candidates.
        #[arg(long)]
        rerank: bool,
    },

    /// Start an interactive chat session on stdin.
    Chat {
        /// Resume this session ID instead of starting a new one.
        #[arg(long)]
        session: Option<String>,

        /// Print answers as they are generated.
        #[arg(long)]
        stream: bool,
    },

    /// Show vector index status and configured budgets.
    Stats,
}

/// Parse an intent label for `--intent`.
fn parse_intent(s: &str) -> Result<Intent, String> {
    s.parse::<Intent>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ask {
            question,
            intent,
            session,
            section,
            stream,
            no_cache,
        } => {
            let opts = AskOptions {
                intent,
                session,
                section,
                stream,
                no_cache,
            };
            run_ask(&cfg, &question, &opts).await?;
        }
        Commands::Search {
            query,
            intent,
            k,
            rerank,
        } => {
            run_search(&cfg, &query, intent, k, rerank).await?;
        }
        Commands::Chat { session, stream } => {
            run_chat(&cfg, session, stream).await?;
        }
        Commands::Stats => {
            run_stats(&cfg).await?;
        }
    }

    Ok(())
}
