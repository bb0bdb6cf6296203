//! CLI command definitions for jobforge.
//!
//! Operational entry points over the lifecycle core: schema migration, job
//! submission, the queue-draining worker, and the recovery sweeper.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::dispatch::{Dispatcher, HttpInvoker};
use crate::lifecycle::{ConsumerConfig, HandlerRegistry, JobService, NoticeConsumer};
use crate::metrics;
use crate::queue::{DeliveryQueue, RedisDeliveryQueue};
use crate::store::{JobStore, PgJobStore};
use crate::sweeper::{RecoverySweeper, SweeperConfig};

/// Asynchronous job lifecycle service.
#[derive(Parser)]
#[command(name = "jobforge")]
#[command(about = "Submit, dispatch and recover background jobs")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Apply the database schema.
    Migrate,

    /// Submit a job and print the created record.
    Submit(SubmitArgs),

    /// Run the delivery-queue worker.
    Worker(WorkerArgs),

    /// Run the recovery sweeper.
    Sweep(SweepArgs),
}

/// Arguments for job submission.
#[derive(Parser, Debug)]
pub struct SubmitArgs {
    /// Job type tag (e.g. sample_task).
    #[arg(long)]
    pub job_type: String,

    /// Owner user id.
    #[arg(long)]
    pub user_id: Uuid,

    /// JSON-encoded job parameters.
    #[arg(long, default_value = "{}")]
    pub params: String,
}

/// Arguments for the queue worker.
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Process one batch and exit instead of looping.
    #[arg(long)]
    pub once: bool,
}

/// Arguments for the recovery sweeper.
#[derive(Parser, Debug)]
pub struct SweepArgs {
    /// Run a single sweep pass and exit instead of looping.
    #[arg(long)]
    pub once: bool,
}

/// Parses command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses arguments and runs the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Runs the selected command with already-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    match cli.command {
        Commands::Migrate => migrate(&config).await,
        Commands::Submit(args) => submit(&config, args).await,
        Commands::Worker(args) => worker(&config, args).await,
        Commands::Sweep(args) => sweep(&config, args).await,
    }
}

/// Builds the full service stack from configuration.
async fn build_service(
    config: &AppConfig,
) -> anyhow::Result<(Arc<JobService>, Arc<dyn DeliveryQueue>)> {
    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::connect(&config.database_url).await?);
    let queue: Arc<dyn DeliveryQueue> = Arc::new(
        RedisDeliveryQueue::connect(&config.redis_url, &config.queue_name).await?,
    );

    let invoker = Arc::new(HttpInvoker::new(&config.worker_gateway_url));
    let dispatcher = Dispatcher::new(invoker, &config.environment);

    let service = Arc::new(JobService::new(
        store,
        queue.clone(),
        dispatcher,
        HandlerRegistry::with_defaults(),
    ));

    Ok((service, queue))
}

async fn migrate(config: &AppConfig) -> anyhow::Result<()> {
    let store = PgJobStore::connect(&config.database_url).await?;
    store.run_migrations().await?;
    info!("Migrations applied");
    Ok(())
}

async fn submit(config: &AppConfig, args: SubmitArgs) -> anyhow::Result<()> {
    let job_parameters: serde_json::Value = serde_json::from_str(&args.params)?;

    let (service, _queue) = build_service(config).await?;
    let job = service
        .create_job(&args.job_type, args.user_id, job_parameters)
        .await?;

    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}

async fn worker(config: &AppConfig, args: WorkerArgs) -> anyhow::Result<()> {
    metrics::init_metrics()?;

    let (service, queue) = build_service(config).await?;
    let consumer_config = ConsumerConfig::default()
        .with_read_batch(config.queue_read_batch)
        .with_visibility_timeout(config.visibility_timeout);
    let consumer = NoticeConsumer::new(service, queue, consumer_config);

    if args.once {
        let processed = consumer.poll_once().await?;
        info!(processed = processed, "Worker batch complete");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(consumer.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    let _ = shutdown_tx.send(());
    handle.await?;

    Ok(())
}

async fn sweep(config: &AppConfig, args: SweepArgs) -> anyhow::Result<()> {
    metrics::init_metrics()?;

    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::connect(&config.database_url).await?);
    let sweeper_config = SweeperConfig {
        stuck_timeout: config.stuck_timeout,
        interval: config.sweep_interval,
    };
    let sweeper = RecoverySweeper::new(store, sweeper_config);

    if args.once {
        let report = sweeper.sweep_once().await?;
        info!(
            stuck = report.stuck_failed,
            orphaned = report.orphaned_failed,
            "Sweep complete"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(sweeper.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    let _ = shutdown_tx.send(());
    handle.await?;

    Ok(())
}
