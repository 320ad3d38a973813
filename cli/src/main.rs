//! Prompt router command-line interface.
//!
//! Loads a prompt library, routes a query to the closest prompt and, unless
//! told otherwise, asks the completion model to answer under that prompt.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use prompt_router_core::{EmbeddingProviderType, PromptLibrary, RouterConfig, SemanticRouter};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Route free-text queries to the best matching system prompt.
#[derive(Parser, Debug)]
#[command(name = "prompt-router")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Query to route; starts an interactive session when omitted
    query: Option<String>,

    /// Number of matches to show
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// List the loaded prompts and exit
    #[arg(long)]
    list_prompts: bool,

    /// Show matches only, without asking the model for a response
    #[arg(long)]
    no_response: bool,

    /// Search prompt names and descriptions by keyword and exit
    #[arg(long, value_name = "KEYWORD")]
    search: Option<String>,

    /// Router configuration file (TOML)
    #[arg(short, long, env = "PROMPT_ROUTER_CONFIG")]
    config: Option<PathBuf>,

    /// Prompt library file (JSON or TOML); built-in prompts otherwise
    #[arg(short, long)]
    library: Option<PathBuf>,

    /// Embedding provider, overriding the configuration file
    #[arg(long, value_enum)]
    provider: Option<ProviderArg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProviderArg {
    /// OpenAI embeddings API (needs OPENAI_API_KEY)
    Openai,
    /// Offline feature hashing
    Hashing,
}

impl From<ProviderArg> for EmbeddingProviderType {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Openai => EmbeddingProviderType::OpenAI,
            ProviderArg::Hashing => EmbeddingProviderType::Hashing,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RouterConfig::load(path)
            .await
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RouterConfig::default(),
    };
    if let Some(provider) = cli.provider {
        config.embedding.provider = provider.into();
    }
    if let Some(top_k) = cli.top_k {
        config.query.top_k = top_k;
    }

    let library = load_library(cli.library.as_deref()).await?;

    if cli.list_prompts {
        for (name, spec) in library.iter() {
            println!("{name}: {}", spec.description);
        }
        return Ok(());
    }

    if let Some(keyword) = &cli.search {
        let hits = library.search(keyword);
        if hits.is_empty() {
            println!("No prompts match {keyword:?}.");
        }
        for (name, spec) in hits {
            println!("{name}: {}", spec.description);
        }
        return Ok(());
    }

    let router = SemanticRouter::from_config(&config);
    let report = router.load_library(library).await?;
    for failure in report.failures() {
        warn!("Prompt {} unavailable: {}", failure.name, failure.reason);
    }
    info!("Loaded {} prompts", report.succeeded().len());

    let top_k = config.query.top_k.max(1);
    let respond = !cli.no_response;
    match &cli.query {
        Some(query) => route(&router, query, top_k, respond).await,
        None => interactive(&router, top_k, respond).await,
    }
}

async fn load_library(path: Option<&Path>) -> Result<PromptLibrary> {
    let Some(path) = path else {
        return Ok(PromptLibrary::builtin());
    };

    let load = PromptLibrary::load(path)
        .await
        .with_context(|| format!("failed to load prompt library {}", path.display()))?;
    for rejected in &load.rejected {
        warn!("Skipping prompt {}: {}", rejected.name, rejected.reason);
    }
    Ok(load.library)
}

async fn route(
    router: &SemanticRouter<String>,
    query: &str,
    top_k: usize,
    respond: bool,
) -> Result<()> {
    let matches = router.find_matches(query, top_k).await?;
    let Some(best) = matches.first() else {
        println!("No matching prompts.");
        return Ok(());
    };

    println!("Top matches:");
    for (rank, m) in matches.iter().enumerate() {
        println!("  {}. {} ({:.3})", rank + 1, m.name, m.score);
    }

    if respond {
        let outcome = router.complete_match(best, query).await?;
        println!("\n[{}]\n{}", outcome.name, outcome.completion.text);
    }
    Ok(())
}

async fn interactive(router: &SemanticRouter<String>, top_k: usize, respond: bool) -> Result<()> {
    println!("Type a query, 'list' to show prompts, or 'quit' to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "" => continue,
            "quit" | "exit" => break,
            "list" => {
                for (name, description) in router.list().await {
                    println!("{name}: {description}");
                }
            }
            query => {
                if let Err(e) = route(router, query, top_k, respond).await {
                    eprintln!("error: {e:#}");
                }
            }
        }
    }
    Ok(())
}
