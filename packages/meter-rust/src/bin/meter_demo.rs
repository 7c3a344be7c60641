//! meter-demo: runs a handful of instrumented operations so the emitted
//! events can be inspected.
//!
//!   cargo run -p opmeter --features demo --bin meter-demo
//!
//!   meter-demo                      # readable output, INFO and up
//!   meter-demo --json               # one JSON object per event
//!   RUST_LOG=opmeter=trace meter-demo   # include data records

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use opmeter::{MeterConfig, MeterFactory, TracingSink};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "meter-demo")]
#[command(about = "Exercise opmeter lifecycle events")]
struct Cli {
    /// Emit events as JSON lines
    #[arg(long)]
    json: bool,

    /// Items processed by the batch operation
    #[arg(long, default_value_t = 20)]
    items: i64,

    /// Time limit for the slow operation, in milliseconds
    #[arg(long, default_value_t = 5)]
    limit_ms: u64,

    /// Progress reporting period, in milliseconds
    #[arg(long, default_value_t = 10)]
    progress_ms: u64,

    /// Print category and position on each message
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("no record for {0}")]
struct LookupError(String);

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let mut config = MeterConfig::from_env().context("reading OPMETER_* configuration")?;
    config.progress_period = Duration::from_millis(cli.progress_ms);
    if cli.verbose {
        config.print_category = true;
        config.print_position = true;
    }
    let factory = MeterFactory::builder(Arc::new(TracingSink))
        .config(config)
        .build();

    // ok with a path
    let mut lookup = factory.operation_meter("demo", "lookup");
    lookup.ctx("key", "alpha").start();
    lookup.ok_with("cache-hit");

    // reject
    let mut login = factory.operation_meter("demo", "login");
    login.describe("password check").start();
    login.reject("bad-credentials");

    // slow
    let mut report = factory.operation_meter("demo", "report");
    report.limit(Duration::from_millis(cli.limit_ms)).start();
    thread::sleep(Duration::from_millis(cli.limit_ms * 2));
    report.ok();

    // progress, with sub-operations per item
    let mut batch = factory.operation_meter("demo", "batch");
    batch.iterations(cli.items).start();
    for item in 0..cli.items {
        let mut step = factory.current_sub_meter("item");
        step.ctx("item", item).start();
        thread::sleep(Duration::from_millis(1));
        step.ok();
        batch.inc().progress();
    }
    batch.ok();

    // call wrapper: success, error, and a meter dropped while running
    let mut sum = factory.operation_meter("demo", "sum");
    let total = sum.call(|_| Ok::<_, LookupError>((1..=10).sum::<i64>()))?;
    tracing::info!(total, "sum computed");

    let mut fetch = factory.operation_meter("demo", "fetch");
    if let Err(err) = fetch.call(|_| Err::<(), _>(LookupError("beta".into()))) {
        tracing::info!(error = %err, "fetch failed as expected");
    }

    {
        let mut forgotten = factory.operation_meter("demo", "forgotten");
        forgotten.start();
    }

    Ok(())
}
