//! CLI command definitions, routing, and tracing setup.

use std::io::{BufRead, Write as _};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

use deskbot_core::{AskContext, AskPipeline, IngestResult, IngestionPipeline, ProgressReporter};
use deskbot_crawler::Crawler;
use deskbot_index::EmbeddingIndex;
use deskbot_llm::OllamaClient;
use deskbot_shared::{AppConfig, DeskbotError, Route, init_config, load_config};
use deskbot_text::Segmenter;

/// File name of the index database inside the index directory.
const INDEX_DB_FILE: &str = "deskbot.db";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Deskbot — route support questions to specialized answer agents.
#[derive(Parser)]
#[command(
    name = "deskbot",
    version,
    about = "Answer support questions via RAG over a crawled help center, or evaluate math inline.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// With no subcommand, an interactive REPL reads questions until EOF.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Crawl the help center, chunk and embed it, and persist the index.
    Ingest {
        /// Seed URL for the crawl (defaults to the configured help center).
        #[arg(long)]
        seed: Option<String>,

        /// Maximum crawl depth from the seed.
        #[arg(long)]
        max_depth: Option<u32>,

        /// HTTP timeout per request, in seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Target chunk size in characters.
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Overlap between consecutive chunks, in characters.
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },

    /// Ask one question against the persisted index.
    Ask {
        /// Your question.
        #[arg(long = "q")]
        question: String,

        /// Force a route instead of classifying.
        #[arg(long, value_enum)]
        route: Option<RouteArg>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Forced route choices for `ask --route`.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum RouteArg {
    Math,
    Knowledge,
}

impl From<RouteArg> for Route {
    fn from(arg: RouteArg) -> Self {
        match arg {
            RouteArg::Math => Route::Math,
            RouteArg::Knowledge => Route::Knowledge,
        }
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "deskbot=info",
        1 => "deskbot=debug",
        _ => "deskbot=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Command::Ingest {
            seed,
            max_depth,
            timeout,
            chunk_size,
            chunk_overlap,
        }) => {
            cmd_ingest(
                seed.as_deref(),
                max_depth,
                timeout,
                chunk_size,
                chunk_overlap,
            )
            .await
        }
        Some(Command::Ask { question, route }) => cmd_ask(&question, route.map(Into::into)).await,
        Some(Command::Config { action }) => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
        None => cmd_repl().await,
    }
}

// ---------------------------------------------------------------------------
// ingest
// ---------------------------------------------------------------------------

async fn cmd_ingest(
    seed: Option<&str>,
    max_depth: Option<u32>,
    timeout: Option<u64>,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
) -> Result<()> {
    let mut config = load_config()?;

    // CLI flags override config/env values.
    if let Some(seed) = seed {
        config.crawl.seed = seed.to_string();
    }
    if let Some(depth) = max_depth {
        config.crawl.max_depth = depth;
    }
    if let Some(timeout) = timeout {
        config.crawl.timeout_secs = timeout;
    }
    if let Some(size) = chunk_size {
        config.chunking.chunk_size = size;
    }
    if let Some(overlap) = chunk_overlap {
        config.chunking.chunk_overlap = overlap;
    }
    config.validate()?;

    let seed_url = Url::parse(&config.crawl.seed)
        .map_err(|e| eyre!("invalid seed URL '{}': {e}", config.crawl.seed))?;

    info!(
        seed = %seed_url,
        max_depth = config.crawl.max_depth,
        collection = %config.index.collection,
        "starting ingestion"
    );

    let index = open_index(&config).await?;
    let embedder = OllamaClient::new(&config.models.ollama_url, &config.models.embed_model)?;
    let crawler = Crawler::new(config.crawl.clone())?;
    let segmenter = Segmenter::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;

    let pipeline = IngestionPipeline::new(
        crawler,
        segmenter,
        &embedder,
        &index,
        &config.index.collection,
    );

    let reporter = CliProgress::new();
    let result = pipeline.run(&seed_url, &reporter).await?;

    println!();
    println!("  Knowledge base ingested!");
    println!("  Documents:  {}", result.documents);
    println!("  Chunks:     {}", result.chunks);
    println!("  Indexed:    {}", result.entries_upserted);
    println!("  Unchanged:  {}", result.chunks_unchanged);
    println!("  Total:      {}", result.entry_count);
    if result.crawl_errors > 0 {
        println!("  Fetch errors (skipped): {}", result.crawl_errors);
    }
    println!("  Time:       {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

/// Open the index database under the configured directory.
async fn open_index(config: &AppConfig) -> Result<EmbeddingIndex> {
    let path = PathBuf::from(&config.index.dir).join(INDEX_DB_FILE);
    Ok(EmbeddingIndex::open(&path).await?)
}

// ---------------------------------------------------------------------------
// ask & REPL
// ---------------------------------------------------------------------------

async fn cmd_ask(question: &str, route: Option<Route>) -> Result<()> {
    let config = load_config()?;
    let index = open_index(&config).await?;

    let completion = OllamaClient::new(&config.models.ollama_url, &config.models.router_model)?;
    let embedder = OllamaClient::new(&config.models.ollama_url, &config.models.embed_model)?;

    let pipeline = AskPipeline::new(
        &completion,
        &embedder,
        &index,
        &config.index.collection,
        config.retrieval.k,
    );

    let ctx = AskContext {
        user_id: "cli".into(),
        conversation_id: uuid::Uuid::now_v7().to_string(),
    };

    match pipeline.ask(question, route, &ctx).await {
        Ok(outcome) => {
            let agent = &outcome.agent_workflow[1].agent;
            println!("[Router] {} → {agent}", outcome.decision.rationale);
            println!();
            println!("{}", outcome.response);
            Ok(())
        }
        Err(DeskbotError::KnowledgeUnavailable(detail)) => {
            tracing::error!(error = %detail, "knowledge path unavailable");
            println!(
                "Desculpe, o serviço de conhecimento está indisponível no momento. \
                 Tente novamente em instantes."
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Interactive loop: read questions line by line until EOF (or `q`).
async fn cmd_repl() -> Result<()> {
    let config = load_config()?;
    let index = open_index(&config).await?;

    let completion = OllamaClient::new(&config.models.ollama_url, &config.models.router_model)?;
    let embedder = OllamaClient::new(&config.models.ollama_url, &config.models.embed_model)?;

    let pipeline = AskPipeline::new(
        &completion,
        &embedder,
        &index,
        &config.index.collection,
        config.retrieval.k,
    );

    let ctx = AskContext {
        user_id: "cli".into(),
        conversation_id: uuid::Uuid::now_v7().to_string(),
    };

    println!("Deskbot — digite sua pergunta ('q' para sair)");

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next() else {
            break; // EOF
        };
        let question = line?;
        let question = question.trim();

        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("q") {
            break;
        }

        match pipeline.ask(question, None, &ctx).await {
            Ok(outcome) => {
                let agent = &outcome.agent_workflow[1].agent;
                println!("[Router] → {agent}");
                println!("{}", outcome.response);
                println!();
            }
            Err(DeskbotError::KnowledgeUnavailable(detail)) => {
                tracing::error!(error = %detail, "knowledge path unavailable");
                println!("Desculpe, o serviço de conhecimento está indisponível no momento.");
                println!();
            }
            Err(e) => return Err(e.into()),
        }
    }

    println!("Até logo!");
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("static template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn chunk_indexed(&self, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Embedding [{current}/{total}]"));
    }

    fn done(&self, _result: &IngestResult) {
        self.spinner.finish_and_clear();
    }
}
