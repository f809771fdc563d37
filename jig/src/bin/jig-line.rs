//! jig-line: simulate a production line feeding a fixture pool.
//!
//! Products arrive at a fixed cadence with a random work time, wait for an
//! idle fixture, and the line shuts down gracefully after `--run-secs` or on
//! Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jig::{
    Dispatcher, FixturePoolBuilder, JobSource, LogPublisher, PoolConfig, ShutdownCoordinator,
    SourceConfig, TimedWorkload, UniformSeconds,
};

#[derive(Parser, Debug)]
#[command(name = "jig-line", about = "Run products through a fixed pool of fixtures")]
struct Args {
    /// Number of trays
    #[arg(long, default_value_t = 8)]
    trays: u32,

    /// Fixtures mounted on each tray
    #[arg(long, default_value_t = 12)]
    per_tray: u32,

    /// Milliseconds between product arrivals
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Shortest work time per product, in seconds
    #[arg(long, default_value_t = 3)]
    min_secs: u64,

    /// Longest work time per product, in seconds
    #[arg(long, default_value_t = 6)]
    max_secs: u64,

    /// Stop accepting products after this many seconds
    #[arg(long, default_value_t = 60)]
    run_secs: u64,

    /// Seed for work times; random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .init();

    #[cfg(feature = "metrics")]
    jig::metrics::init_metrics().context("register metrics")?;

    let pool_config = PoolConfig::default().with_layout(args.trays, args.per_tray);
    let mut source_config = SourceConfig::default()
        .with_interval(args.interval_ms)
        .with_duration_range(args.min_secs * 1000, args.max_secs * 1000);
    source_config.seed = args.seed;

    let model = UniformSeconds::from_config(&source_config).context("invalid work time range")?;
    let source = JobSource::new(&source_config, model);

    let pool = Arc::new(
        FixturePoolBuilder::new(pool_config)
            .with_workload(Arc::new(TimedWorkload))
            .with_events(Arc::new(LogPublisher::new()))
            .build()
            .context("build fixture pool")?,
    );

    let coordinator = ShutdownCoordinator::new(Arc::clone(&pool));
    let timer = coordinator.trigger_after(Duration::from_secs(args.run_secs));
    let ctrl_c = coordinator.trigger_on_ctrl_c();

    let stop = coordinator.token();
    let producer = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move {
            let mut dispatcher = Dispatcher::new(pool);
            dispatcher.run(source.into_stream(), &stop).await
        }
    });

    let snapshot = coordinator.run().await.context("drain fixture pool")?;
    let summary = producer.await.context("producer task failed")?;
    timer.abort();
    ctrl_c.abort();

    tracing::info!(
        submitted = summary.submitted,
        rejected = summary.rejected,
        completed = snapshot.completed,
        failed = snapshot.failed,
        "All fixtures stopped"
    );

    #[cfg(feature = "metrics")]
    tracing::debug!("{}", jig::metrics::gather_metrics()?);

    Ok(())
}
