//! CLI command definitions for kgforge.
//!
//! This module provides the command-line surface over the dataset
//! lifecycle: creating datasets, dispatching extraction, training and
//! indexing jobs, inspecting tasks, and running the outcome poller.

use crate::config::ServiceConfig;
use crate::dataset::{DatasetKind, DatasetView};
use crate::files::{DatasetFiles, LocalDatasetFiles};
use crate::jobs::queue::RedisJobRunner;
use crate::jobs::{JobKind, JobRunner, TriplesSpec};
use crate::lifecycle::{LifecycleController, OutcomePoller, PollerConfig, TaskHandle};
use crate::storage::{self, AlgorithmCatalog, DatasetStore, TaskRegistry};
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Default SQLite registry database.
const DEFAULT_DATABASE: &str = "kgforge.db";

/// Default directory for dataset binaries and their stats sidecars.
const DEFAULT_BIN_DIR: &str = "./binaries";

/// Default Redis connection string for the job queue.
const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Default Redis list jobs are pushed onto.
const DEFAULT_QUEUE: &str = "kgforge_jobs";

/// Knowledge graph dataset lifecycle service.
#[derive(Parser)]
#[command(name = "kgforge")]
#[command(about = "Manage knowledge graph embedding datasets and their lifecycle jobs")]
#[command(version)]
#[command(
    long_about = "kgforge tracks knowledge graph datasets from empty shells through triple\nextraction, embedding training and search index builds.\n\nLong-running work is handed to external workers over a Redis queue; the\n`watch` command polls job outcomes back into the registry.\n\nExample usage:\n  kgforge create wikidata\n  kgforge triples 1 --graph-pattern \"?subject wdt:P31 wd:Q146 .\"\n  kgforge watch"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// SQLite database holding datasets, tasks and the algorithm catalog.
    #[arg(long, default_value = DEFAULT_DATABASE, env = "KGFORGE_DB", global = true)]
    pub database: String,

    /// Directory holding dataset binaries and their stats sidecars.
    #[arg(long, default_value = DEFAULT_BIN_DIR, env = "KGFORGE_BIN_DIR", global = true)]
    pub bin_dir: String,

    /// Redis connection string for the job queue.
    #[arg(long, default_value = DEFAULT_REDIS_URL, env = "REDIS_URL", global = true)]
    pub redis_url: String,

    /// Redis list name jobs are pushed onto.
    #[arg(long, default_value = DEFAULT_QUEUE, global = true)]
    pub queue: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Create an empty dataset.
    #[command(alias = "new")]
    Create(CreateArgs),

    /// Show a dataset record, optionally with triple store counts.
    #[command(alias = "get")]
    Show(ShowArgs),

    /// List all datasets in the registry.
    #[command(alias = "ls")]
    List(ListArgs),

    /// Dispatch a triple extraction job for an empty dataset.
    #[command(name = "generate-triples", alias = "triples")]
    GenerateTriples(GenerateTriplesArgs),

    /// Dispatch an embedding training job using a catalog algorithm.
    Train(TrainArgs),

    /// Dispatch a search index build for a trained dataset.
    #[command(name = "build-index", alias = "index")]
    BuildIndex(BuildIndexArgs),

    /// Load and describe the search index of a ready dataset.
    Search(SearchArgs),

    /// Show a dispatched task together with a live poll of its job.
    Task(TaskArgs),

    /// List the dataset kinds this binary understands.
    Kinds(KindsArgs),

    /// List the training algorithm catalog.
    Algorithms(AlgorithmsArgs),

    /// Poll job outcomes back into the registry until interrupted.
    Watch(WatchArgs),
}

/// Arguments for `kgforge create`.
#[derive(Parser, Debug)]
pub struct CreateArgs {
    /// Dataset kind (generic, wikidata).
    #[arg(default_value = "generic")]
    pub kind: String,

    /// Output the created dataset as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `kgforge show`.
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Dataset id.
    pub dataset_id: i64,

    /// Also read entity, relation and triple counts from the triple store.
    #[arg(short = 'c', long)]
    pub counts: bool,

    /// Output the dataset as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `kgforge list`.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Output the datasets as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `kgforge generate-triples`.
#[derive(Parser, Debug)]
pub struct GenerateTriplesArgs {
    /// Dataset id. The dataset must currently be empty.
    pub dataset_id: i64,

    /// SPARQL graph pattern selecting the seed entities.
    #[arg(short = 'g', long)]
    pub graph_pattern: String,

    /// Expansion levels to crawl out from the seed entities.
    #[arg(long, default_value = "2")]
    pub levels: u32,

    /// Batch size hint for the extraction worker.
    #[arg(long)]
    pub batch_size: Option<u32>,

    /// Output the accepted task as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `kgforge train`.
#[derive(Parser, Debug)]
pub struct TrainArgs {
    /// Dataset id. The dataset must have triples and no model yet.
    pub dataset_id: i64,

    /// Catalog id of the training algorithm.
    #[arg(short = 'a', long, default_value = "1")]
    pub algorithm: i64,

    /// Output the accepted task as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `kgforge build-index`.
#[derive(Parser, Debug)]
pub struct BuildIndexArgs {
    /// Dataset id. The dataset must be trained and not yet indexed.
    pub dataset_id: i64,

    /// Number of trees for the approximate nearest neighbour index.
    #[arg(long)]
    pub n_trees: Option<u32>,

    /// Output the accepted task as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `kgforge search`.
#[derive(Parser, Debug)]
pub struct SearchArgs {
    /// Dataset id. The dataset must be ready for search.
    pub dataset_id: i64,

    /// Output the index description as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `kgforge task`.
#[derive(Parser, Debug)]
pub struct TaskArgs {
    /// Task id returned by a dispatch command.
    pub task_id: i64,

    /// Output the task as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `kgforge kinds`.
#[derive(Parser, Debug)]
pub struct KindsArgs {
    /// Output the kinds as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `kgforge algorithms`.
#[derive(Parser, Debug)]
pub struct AlgorithmsArgs {
    /// Output the catalog as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `kgforge watch`.
#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Seconds between outcome sweeps.
    #[arg(short = 's', long, default_value = "5")]
    pub sweep_interval: u64,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// This is a convenience function that parses CLI args and runs the command.
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
///
/// This is the main entry point for the kgforge CLI.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = ServiceConfig::default()
        .with_database_path(&cli.database)
        .with_bin_dir(&cli.bin_dir)
        .with_redis_url(&cli.redis_url)
        .with_queue_name(&cli.queue);

    match cli.command {
        Commands::Create(args) => run_create_command(&config, args).await,
        Commands::Show(args) => run_show_command(&config, args).await,
        Commands::List(args) => run_list_command(&config, args).await,
        Commands::GenerateTriples(args) => run_generate_triples_command(&config, args).await,
        Commands::Train(args) => run_train_command(&config, args).await,
        Commands::BuildIndex(args) => run_build_index_command(&config, args).await,
        Commands::Search(args) => run_search_command(&config, args).await,
        Commands::Task(args) => run_task_command(&config, args).await,
        Commands::Kinds(args) => run_kinds_command(args),
        Commands::Algorithms(args) => run_algorithms_command(&config, args).await,
        Commands::Watch(args) => {
            let config = config
                .with_sweep_interval(Duration::from_secs(args.sweep_interval.max(1)));
            run_watch_command(&config).await
        }
    }
}

// ============================================================================
// Service wiring
// ============================================================================

/// Shared handles behind every command that touches the backend.
struct Service {
    controller: Arc<LifecycleController>,
    tasks: TaskRegistry,
    algorithms: AlgorithmCatalog,
    runner: Arc<dyn JobRunner>,
}

/// Opens the registry database and connects the Redis job runner.
async fn build_service(config: &ServiceConfig) -> anyhow::Result<Service> {
    let pool = storage::open_pool(&config.database_path).await?;
    let datasets = DatasetStore::new(pool.clone());
    let tasks = TaskRegistry::new(pool.clone());
    let algorithms = AlgorithmCatalog::new(pool);

    let runner: Arc<dyn JobRunner> =
        Arc::new(RedisJobRunner::connect(&config.redis_url, &config.queue_name).await?);
    let files: Arc<dyn DatasetFiles> = Arc::new(LocalDatasetFiles::new(&config.bin_dir));

    let controller = Arc::new(LifecycleController::new(
        datasets,
        tasks.clone(),
        algorithms.clone(),
        Arc::clone(&runner),
        files,
    ));

    Ok(Service {
        controller,
        tasks,
        algorithms,
        runner,
    })
}

// ============================================================================
// Dataset commands
// ============================================================================

async fn run_create_command(config: &ServiceConfig, args: CreateArgs) -> anyhow::Result<()> {
    let Some(kind) = DatasetKind::parse(&args.kind) else {
        anyhow::bail!(
            "Unknown dataset kind: {} (expected one of: generic, wikidata)",
            args.kind
        );
    };

    let service = build_service(config).await?;
    let view = service.controller.create_dataset(kind).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("✓ Dataset {} created ({})", view.id, view.kind);
    println!("  Status:       {}", view.status);
    println!("  Triple store: {}", view.binary_dataset);
    Ok(())
}

async fn run_show_command(config: &ServiceConfig, args: ShowArgs) -> anyhow::Result<()> {
    let service = build_service(config).await?;
    let view = if args.counts {
        service
            .controller
            .get_dataset_with_stats(args.dataset_id)
            .await?
    } else {
        service.controller.get_dataset(args.dataset_id).await?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    print_dataset(&view);
    Ok(())
}

async fn run_list_command(config: &ServiceConfig, args: ListArgs) -> anyhow::Result<()> {
    let service = build_service(config).await?;
    let views = service.controller.list_datasets().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    if views.is_empty() {
        println!("No datasets registered");
        return Ok(());
    }

    println!(
        "{:>5}  {:<22}  {:<8}  {}",
        "ID", "STATUS", "KIND", "TRIPLE STORE"
    );
    for view in &views {
        println!(
            "{:>5}  {:<22}  {:<8}  {}",
            view.id,
            view.status.as_str(),
            view.kind.as_str(),
            display_path(&view.binary_dataset),
        );
    }
    Ok(())
}

fn print_dataset(view: &DatasetView) {
    println!("Dataset {} ({})", view.id, view.kind);
    println!("  Status:         {} (code {})", view.status, view.status_code);
    println!("  Triple store:   {}", display_path(&view.binary_dataset));
    println!("  Model:          {}", display_path(&view.binary_model));
    println!("  Index:          {}", display_path(&view.binary_index));
    println!("  Embedding size: {}", view.embedding_size);
    if let Some(entities) = view.entities {
        println!("  Entities:       {entities}");
    }
    if let Some(relations) = view.relations {
        println!("  Relations:      {relations}");
    }
    if let Some(triples) = view.triples {
        println!("  Triples:        {triples}");
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "-"
    } else {
        path
    }
}

// ============================================================================
// Lifecycle job commands
// ============================================================================

#[derive(Debug, Clone, Serialize)]
struct DispatchOutput {
    status: &'static str,
    operation: &'static str,
    task_id: i64,
    dataset_id: i64,
    location: String,
    next: String,
}

fn print_dispatch(
    operation: &'static str,
    handle: TaskHandle,
    json: bool,
) -> anyhow::Result<()> {
    let output = DispatchOutput {
        status: "accepted",
        operation,
        task_id: handle.task_id,
        dataset_id: handle.dataset_id,
        next: format!("/datasets/{}", handle.dataset_id),
        location: handle.location,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("✓ Task {} accepted ({})", output.task_id, output.operation);
    println!("  Poll:    {}", output.location);
    println!("  Dataset: {}", output.next);
    Ok(())
}

async fn run_generate_triples_command(
    config: &ServiceConfig,
    args: GenerateTriplesArgs,
) -> anyhow::Result<()> {
    let mut spec = TriplesSpec::new(args.graph_pattern, args.levels);
    if let Some(batch_size) = args.batch_size {
        spec = spec.with_batch_size(batch_size);
    }

    let service = build_service(config).await?;
    let handle = service
        .controller
        .generate_triples(args.dataset_id, spec)
        .await?;

    print_dispatch(JobKind::GenerateTriples.as_str(), handle, args.json)
}

async fn run_train_command(config: &ServiceConfig, args: TrainArgs) -> anyhow::Result<()> {
    let service = build_service(config).await?;
    let handle = service
        .controller
        .train(args.dataset_id, args.algorithm)
        .await?;

    print_dispatch(JobKind::Train.as_str(), handle, args.json)
}

async fn run_build_index_command(
    config: &ServiceConfig,
    args: BuildIndexArgs,
) -> anyhow::Result<()> {
    let service = build_service(config).await?;
    let handle = service
        .controller
        .build_index(args.dataset_id, args.n_trees)
        .await?;

    print_dispatch(JobKind::BuildSearchIndex.as_str(), handle, args.json)
}

async fn run_search_command(config: &ServiceConfig, args: SearchArgs) -> anyhow::Result<()> {
    let service = build_service(config).await?;
    let index = service.controller.search_index(args.dataset_id).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&index)?);
        return Ok(());
    }

    println!("✓ Search index ready for dataset {}", args.dataset_id);
    println!("  Path:           {}", index.path);
    println!("  Embedding size: {}", index.embedding_size);
    println!("  Size:           {} bytes", index.size_bytes);
    Ok(())
}

async fn run_task_command(config: &ServiceConfig, args: TaskArgs) -> anyhow::Result<()> {
    let service = build_service(config).await?;
    let view = service.controller.task_status(args.task_id).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("Task {} ({})", view.task_id, view.operation.as_str());
    println!("  Dataset: {}", view.dataset_id);
    println!("  State:   {}", view.state.as_str());
    if let Some(next) = &view.next {
        println!("  Next:    {next}");
    }
    if let Some(error) = &view.error {
        println!("  Error:   {error}");
    }
    Ok(())
}

// ============================================================================
// Catalog commands
// ============================================================================

#[derive(Debug, Clone, Serialize)]
struct KindEntry {
    id: i64,
    name: &'static str,
}

fn run_kinds_command(args: KindsArgs) -> anyhow::Result<()> {
    let kinds: Vec<KindEntry> = DatasetKind::ALL
        .iter()
        .map(|kind| KindEntry {
            id: kind.id(),
            name: kind.as_str(),
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&kinds)?);
        return Ok(());
    }

    println!("Available dataset kinds:");
    for entry in &kinds {
        println!("  {}: {}", entry.id, entry.name);
    }
    Ok(())
}

async fn run_algorithms_command(
    config: &ServiceConfig,
    args: AlgorithmsArgs,
) -> anyhow::Result<()> {
    let service = build_service(config).await?;
    let algorithms = service.algorithms.list().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&algorithms)?);
        return Ok(());
    }

    if algorithms.is_empty() {
        println!("No algorithms in the catalog");
        return Ok(());
    }

    println!("Available algorithms:");
    for algorithm in &algorithms {
        println!(
            "  {}: {} (embedding size {})",
            algorithm.id, algorithm.name, algorithm.embedding_size
        );
        println!("     params: {}", algorithm.params);
    }
    Ok(())
}

// ============================================================================
// Poller command
// ============================================================================

async fn run_watch_command(config: &ServiceConfig) -> anyhow::Result<()> {
    let service = build_service(config).await?;

    let poller_config = PollerConfig::default().with_sweep_interval(config.sweep_interval);
    let mut poller = OutcomePoller::new(
        poller_config,
        Arc::clone(&service.controller),
        service.tasks.clone(),
        Arc::clone(&service.runner),
    );

    poller.start()?;
    info!(
        sweep_interval_secs = config.sweep_interval.as_secs(),
        "Outcome poller running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    poller.shutdown().await?;

    let stats = poller.stats();
    println!("✓ Poller stopped");
    println!("  Sweeps:           {}", stats.sweeps);
    println!("  Outcomes applied: {}", stats.outcomes_applied);
    println!("  Errors:           {}", stats.errors);
    Ok(())
}
