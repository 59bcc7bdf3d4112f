//! Thin CLI driver over the retrieval core. Prints JSON; anything richer
//! belongs to the orchestration layer.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use memnon::config::Config;
use memnon::init::MemnonContext;
use memnon::models::{Filters, QueryType};
use memnon::repository::sql::execute_readonly_sql;

#[derive(Parser)]
#[command(name = "memnon", version, about = "Narrative memory retrieval engine")]
struct Cli {
    /// Path to the configuration file (default: ./memnon.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Query narrative memory and print the ranked results as JSON
    Query {
        text: String,
        /// Maximum number of results
        #[arg(long)]
        k: Option<usize>,
        /// Override the classified query type
        #[arg(long, value_parser = parse_query_type)]
        query_type: Option<QueryType>,
        #[arg(long)]
        season: Option<i32>,
        #[arg(long)]
        episode: Option<i32>,
        #[arg(long)]
        world_layer: Option<String>,
        /// Use multi-model vector search instead of hybrid search
        #[arg(long)]
        no_hybrid: bool,
    },
    /// Run a whitelisted read-only SELECT and print the rows as JSON
    Sql {
        statement: String,
        #[arg(long, default_value_t = 50)]
        max_rows: usize,
        #[arg(long, default_value_t = 3_000)]
        timeout_ms: u64,
    },
    /// Rebuild the IDF dictionary cache from the corpus
    RebuildIdf,
}

fn parse_query_type(value: &str) -> Result<QueryType, String> {
    value.parse()
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    if let Some(path) = &config.logging.file {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false)
                    .init();
                return;
            }
            Err(e) => {
                eprintln!("Could not open log file {}: {}", path.display(), e);
            }
        }
    }

    if config.logging.console {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref());
    init_tracing(&config);

    match cli.command {
        Command::Query {
            text,
            k,
            query_type,
            season,
            episode,
            world_layer,
            no_hybrid,
        } => {
            let context = MemnonContext::init(config).await?;
            let filters = Filters {
                season,
                episode,
                world_layer,
            };
            let response = context
                .retrieval
                .query_memory(&text, query_type, &filters, k, !no_hybrid)
                .await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Sql {
            statement,
            max_rows,
            timeout_ms,
        } => {
            let context = MemnonContext::init(config).await?;
            let response =
                execute_readonly_sql(&context.pool, &statement, max_rows, timeout_ms).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::RebuildIdf => {
            let context = MemnonContext::init(config).await?;
            let dictionary = context.rebuild_idf().await?;
            println!(
                "{}",
                serde_json::json!({
                    "terms": dictionary.len(),
                    "total_docs": dictionary.total_docs(),
                    "cache_path": context.config.idf.resolved_cache_path(),
                })
            );
        }
    }

    Ok(())
}
