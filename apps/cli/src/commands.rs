//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use paperflow_core::{
    BatchReport, BatchSummary, EnrichStage, EnrichmentOrchestrator, ExtractStage,
    ProgressReporter, ValidateStage, run_dir_stage,
};
use paperflow_ingest::ExtractionChain;
use paperflow_providers::{ChatSummarizer, Embedder, HttpEmbedder};
use paperflow_search::{PaperStore, RemoteSearch, SearchDocument};
use paperflow_shared::{
    AppConfig, EnrichedPaper, init_config, init_config_at, load_config, load_config_from,
    validate_api_key,
};
use paperflow_storage::{EnrichmentCache, RecordDir};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Paperflow: turn arXiv papers into a searchable, summarized corpus.
#[derive(Parser)]
#[command(
    name = "paperflow",
    version,
    about = "Ingest, validate, enrich and search academic papers.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.paperflow/paperflow.toml).
    #[arg(long, global = true, env = "PAPERFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
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
    /// Fetch paper metadata and documents from arXiv.
    Ingest {
        #[command(flatten)]
        query: IngestArgs,
    },

    /// Extract text from downloaded documents.
    Extract,

    /// Run the quality gate over extracted text.
    Validate,

    /// Summarize, tag and embed validated papers.
    Enrich {
        /// Skip indexing into the remote search service.
        #[arg(long)]
        no_index: bool,
    },

    /// Run every stage in order.
    Run {
        #[command(flatten)]
        query: IngestArgs,

        /// Skip indexing into the remote search service.
        #[arg(long)]
        no_index: bool,
    },

    /// Query the enriched corpus.
    Search {
        /// Natural-language query.
        query: String,

        /// Number of results (1-50).
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,
    },

    /// Serve the paper API over HTTP.
    Serve {
        /// Bind address (overrides config).
        #[arg(long)]
        host: Option<String>,

        /// Port (overrides config).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Inspect or prune the remote index and enrichment cache.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
pub(crate) struct IngestArgs {
    /// arXiv category (overrides config).
    #[arg(short, long)]
    category: Option<String>,

    /// Papers to fetch, at most 20 (overrides config).
    #[arg(short = 'n', long)]
    max_results: Option<usize>,
}

#[derive(Subcommand)]
pub(crate) enum IndexAction {
    /// Remote document count and cache entry count.
    Status,
    /// Print one indexed document without its vector.
    Show { paper_id: String },
    /// Delete a paper from the remote index and drop its cached responses.
    Remove { paper_id: String },
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
        0 => "paperflow=info,tower_http=info",
        1 => "paperflow=debug,tower_http=debug",
        _ => "paperflow=trace,tower_http=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
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
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init(cli.config.as_deref()),
            ConfigAction::Show => cmd_config_show(&resolve_config(&cli)?),
        };
    }

    let config = resolve_config(&cli)?;
    match cli.command {
        Command::Ingest { query } => cmd_ingest(&config, &query).await,
        Command::Extract => cmd_extract(&config).await.map(|_| ()),
        Command::Validate => cmd_validate(&config).await.map(|_| ()),
        Command::Enrich { no_index } => cmd_enrich(&config, !no_index).await,
        Command::Run { query, no_index } => {
            cmd_ingest(&config, &query).await?;
            cmd_extract(&config).await?;
            cmd_validate(&config).await?;
            cmd_enrich(&config, !no_index).await
        }
        Command::Search { query, top_k } => cmd_search(&config, &query, top_k).await,
        Command::Serve { host, port } => cmd_serve(&config, host, port).await,
        Command::Index { action } => cmd_index(&config, action).await,
        Command::Config { .. } => Ok(()),
    }
}

fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Stage commands
// ---------------------------------------------------------------------------

async fn cmd_ingest(config: &AppConfig, query: &IngestArgs) -> Result<()> {
    let category = query
        .category
        .clone()
        .unwrap_or_else(|| config.ingest.category.clone());
    let max_results = query.max_results.unwrap_or(config.ingest.max_results);
    let out = RecordDir::create(config.paths.raw_dir())?;

    info!(%category, max_results, "ingesting papers");
    let report = paperflow_ingest::ingest(&config.ingest, &category, max_results, &out).await?;

    println!();
    println!("  Ingest finished");
    println!("  Found:       {}", report.found);
    println!("  Downloaded:  {}", report.downloaded);
    println!("  Too large:   {}", report.skipped_too_large);
    println!("  Errors:      {}", report.download_errors);
    println!();
    Ok(())
}

async fn cmd_extract(config: &AppConfig) -> Result<BatchSummary> {
    let chain = ExtractionChain::from_config(&config.extraction)?;
    let raw = RecordDir::new(config.paths.raw_dir());
    let out = RecordDir::create(config.paths.extracted_dir())?;

    let stage = Arc::new(ExtractStage::new(chain, raw.clone()));
    let reporter = CliProgress::new();
    let report = run_dir_stage(stage, &raw, &out, config.pipeline.concurrency, &reporter).await?;
    print_summary(&report);
    Ok(report.summary)
}

async fn cmd_validate(config: &AppConfig) -> Result<BatchSummary> {
    let input = RecordDir::new(config.paths.extracted_dir());
    let out = RecordDir::create(config.paths.validated_dir())?;

    let stage = Arc::new(ValidateStage::new(config.validation.clone()));
    let reporter = CliProgress::new();
    let report =
        run_dir_stage(stage, &input, &out, config.pipeline.concurrency, &reporter).await?;
    print_summary(&report);
    Ok(report.summary)
}

async fn cmd_enrich(config: &AppConfig, index_remote: bool) -> Result<()> {
    validate_api_key(config)?;
    let summarizer = Arc::new(ChatSummarizer::from_config(&config.llm)?);
    let embedder = Arc::new(HttpEmbedder::from_config(&config.embedding)?);

    let mut orchestrator =
        EnrichmentOrchestrator::new(summarizer, embedder, config.embedding.max_chars);
    if config.cache.enabled {
        match EnrichmentCache::open(&config.cache_path()).await {
            Ok(cache) => orchestrator = orchestrator.with_cache(Arc::new(cache)),
            Err(e) => warn!(error = %e, "enrichment cache unavailable, continuing without it"),
        }
    }
    let orchestrator = Arc::new(orchestrator);

    let input = RecordDir::new(config.paths.validated_dir());
    let out = RecordDir::create(config.paths.enriched_dir())?;
    let stage = Arc::new(EnrichStage::new(Arc::clone(&orchestrator)));
    let reporter = CliProgress::new();
    let report =
        run_dir_stage(stage, &input, &out, config.pipeline.concurrency, &reporter).await?;
    print_summary(&report);

    let stats = orchestrator.cache_stats();
    info!(hits = stats.hits, misses = stats.misses, "enrichment cache");

    if index_remote {
        let papers: Vec<&EnrichedPaper> = report.advanced().collect();
        index_papers(config, &papers).await?;
    }
    Ok(())
}

/// Push freshly enriched papers to the remote index when it is configured.
async fn index_papers(config: &AppConfig, papers: &[&EnrichedPaper]) -> Result<()> {
    let Some(remote) = RemoteSearch::from_env(&config.search, config.embedding.dimensions)? else {
        info!("remote search not configured, skipping indexing");
        return Ok(());
    };
    if papers.is_empty() {
        return Ok(());
    }

    remote
        .ensure_index()
        .await
        .wrap_err("failed to prepare remote search index")?;
    let documents: Vec<SearchDocument> =
        papers.iter().map(|p| SearchDocument::from_paper(p)).collect();
    let report = remote.upsert_documents(&documents).await?;

    println!(
        "  Indexed:  {}/{} into '{}'",
        report.succeeded,
        report.submitted,
        remote.index_name()
    );
    for (key, message) in &report.failures {
        println!("    ! {key}: {message}");
    }
    Ok(())
}

fn print_summary<O>(report: &BatchReport<O>) {
    let s = &report.summary;
    println!();
    println!("  Stage '{}' finished", report.stage);
    println!("  Processed: {}", s.processed);
    println!("  Advanced:  {}", s.advanced);
    println!("  Failed:    {} ({} errored)", s.failed, s.errored);
    println!("  Skipped:   {}", s.skipped);
    println!();
}

// ---------------------------------------------------------------------------
// Query commands
// ---------------------------------------------------------------------------

/// Build the store. An unreachable remote backend, or one whose vector
/// dimension differs from the embedder's, is fatal here rather than a
/// silent fallback to the local index.
async fn open_store(config: &AppConfig) -> Result<PaperStore> {
    let embedder = Arc::new(
        HttpEmbedder::from_config(&config.embedding)
            .wrap_err("query embedding requires an embedder")?,
    );
    let remote = RemoteSearch::from_env(&config.search, embedder.dimension())?;
    if let Some(remote) = &remote {
        remote
            .ensure_index()
            .await
            .wrap_err("remote search backend unavailable")?;
    }
    let dir = RecordDir::new(config.paths.enriched_dir());
    Ok(PaperStore::load(&dir, embedder, remote)?)
}

async fn cmd_search(config: &AppConfig, query: &str, top_k: usize) -> Result<()> {
    let store = open_store(config).await?;
    let results = store.search(query, top_k).await?;

    if results.is_empty() {
        println!("No papers indexed yet");
        return Ok(());
    }
    for (rank, result) in results.iter().enumerate() {
        println!("{:>2}. [{:.3}] {} ({})", rank + 1, result.score, result.title, result.paper_id);
        if !result.topics.is_empty() {
            println!("    topics: {}", result.topics.join(", "));
        }
    }
    Ok(())
}

async fn cmd_serve(config: &AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    let metrics = crate::telemetry::install().wrap_err("failed to install metrics recorder")?;
    // The store is fully built before the listener binds.
    let store = Arc::new(open_store(config).await?);
    let app = crate::server::build_router(store, metrics);

    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .map_err(|e| eyre!("failed to bind {host}:{port}: {e}"))?;

    info!(%host, port, "serving paper API");
    println!("Serving on http://{host}:{port}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Index maintenance
// ---------------------------------------------------------------------------

async fn open_cache(config: &AppConfig) -> Result<Option<EnrichmentCache>> {
    if !config.cache.enabled {
        return Ok(None);
    }
    Ok(Some(EnrichmentCache::open(&config.cache_path()).await?))
}

async fn cmd_index(config: &AppConfig, action: IndexAction) -> Result<()> {
    let remote = RemoteSearch::from_env(&config.search, config.embedding.dimensions)?;

    match action {
        IndexAction::Status => {
            match &remote {
                Some(remote) => println!(
                    "  Index '{}':  {} documents",
                    remote.index_name(),
                    remote.document_count().await?
                ),
                None => println!("  Remote search not configured"),
            }
            match open_cache(config).await? {
                Some(cache) => println!("  Cache entries:  {}", cache.entry_count().await?),
                None => println!("  Cache disabled"),
            }
        }
        IndexAction::Show { paper_id } => {
            let remote = remote.ok_or_else(|| eyre!("remote search not configured"))?;
            match remote.get_document(&paper_id).await? {
                Some(mut doc) => {
                    let dims = doc.embedding.take().map_or(0, |e| e.len());
                    println!("{}", serde_json::to_string_pretty(&doc)?);
                    println!("embedding: {dims} dimensions");
                }
                None => println!("{paper_id} is not indexed"),
            }
        }
        IndexAction::Remove { paper_id } => {
            if let Some(remote) = &remote {
                remote.delete_document(&paper_id).await?;
                println!("  Removed {paper_id} from '{}'", remote.index_name());
            }
            if let Some(cache) = open_cache(config).await? {
                let dropped = cache.invalidate_paper(&paper_id).await?;
                println!("  Dropped {dropped} cached responses for {paper_id}");
            }
        }
    }
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
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(format!("Running {name}"));
    }

    fn item_done(&self, paper_id: &str, outcome: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {paper_id}: {outcome}"));
    }

    fn done(&self, _stage: &str, _summary: &BatchSummary) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

fn cmd_config_init(path: Option<&std::path::Path>) -> Result<()> {
    let path = match path {
        Some(p) => init_config_at(p)?,
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
