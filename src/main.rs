use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use pulsepay::application::broadcast::Broadcaster;
use pulsepay::application::driver::SimulatorDriver;
use pulsepay::application::lifecycle::LifecycleSimulator;
use pulsepay::application::metrics::{
    FailureReasonCount, Granularity, MetricsEngine, MetricsSummary,
};
use pulsepay::application::seed::seed_payments;
use pulsepay::clock::{Clock, SystemClock};
use pulsepay::config::SimulatorConfig;
use pulsepay::domain::payment::PaymentId;
use pulsepay::domain::ports::{EventStoreBox, PaymentFilter};
use pulsepay::error::PaymentError;
use pulsepay::infrastructure::in_memory::InMemoryEventStore;
use pulsepay::interfaces::csv::payment_reader::PaymentReader;
use pulsepay::interfaces::csv::payment_writer::PaymentWriter;
use pulsepay::interfaces::query::{MetricsQuery, PaymentQuery};
use pulsepay::rng::{RandomSource, SeededRandom};
use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Payment lifecycle simulator and metrics", long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Simulator settings as JSON. Missing fields keep their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the simulator for a while, then print a summary of what it produced
    Simulate {
        #[arg(long)]
        duration_ms: u64,
        /// Tick period; defaults to the configured interval
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
        /// Print the live feed as JSON lines while running
        #[arg(long)]
        feed: bool,
        /// Write the payments of this run to a CSV file
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Generate demo payments spread over the last 30 days and print them as CSV
    Seed {
        #[arg(long, default_value_t = 25)]
        count: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// List payments as CSV, newest first
    Payments {
        /// Payments CSV to load before querying
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        merchant_id: Option<String>,
        #[arg(long)]
        min_amount: Option<String>,
        #[arg(long)]
        max_amount: Option<String>,
    },
    /// Print one payment as JSON
    Get {
        id: PaymentId,
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Print dashboard metrics as JSON
    Metrics {
        #[arg(long, global = true)]
        input: Option<PathBuf>,
        #[command(subcommand)]
        report: Report,
    },
}

#[derive(Subcommand)]
enum Report {
    Summary {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
    Timeseries {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long, default_value_t = Granularity::Day)]
        bucket: Granularity,
    },
    FailureReasons {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SimulatorConfig::from_json_file(path).into_diagnostic()?,
        None => SimulatorConfig::default(),
    };
    let store = open_store(cli.db_path.as_deref())?;
    let clock = SystemClock;

    match cli.command {
        Command::Simulate {
            duration_ms,
            interval_ms,
            seed,
            feed,
            export,
        } => {
            let run = SimulateRun {
                duration: Duration::from_millis(duration_ms),
                interval: interval_ms.map(Duration::from_millis),
                feed,
                export,
            };
            simulate(store, config, random_source(seed), run).await?;
        }
        Command::Seed { count, seed } => {
            let rng = random_source(seed);
            let mut payments = seed_payments(&store, rng.as_ref(), &clock, &config, count)
                .await
                .into_diagnostic()?;
            payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            PaymentWriter::new(io::stdout().lock())
                .write_payments(&payments)
                .into_diagnostic()?;
        }
        Command::Payments {
            input,
            status,
            merchant_id,
            min_amount,
            max_amount,
        } => {
            let filter = PaymentQuery {
                status: status.as_deref(),
                merchant_id: merchant_id.as_deref(),
                min_amount: min_amount.as_deref(),
                max_amount: max_amount.as_deref(),
            }
            .into_filter()
            .into_diagnostic()?;
            import_csv(&store, input.as_deref()).await?;

            let payments = store.find_payments(&filter).await.into_diagnostic()?;
            PaymentWriter::new(io::stdout().lock())
                .write_payments(&payments)
                .into_diagnostic()?;
        }
        Command::Get { id, input } => {
            import_csv(&store, input.as_deref()).await?;
            let payment = store
                .get_payment(id)
                .await
                .into_diagnostic()?
                .ok_or(PaymentError::PaymentNotFound(id))
                .into_diagnostic()?;
            print_json(&payment)?;
        }
        Command::Metrics { input, report } => {
            import_csv(&store, input.as_deref()).await?;
            let engine = MetricsEngine::new(store);
            match report {
                Report::Summary { from, to } => {
                    let (from, to) = MetricsQuery::parse(from.as_deref(), to.as_deref())
                        .into_diagnostic()?
                        .summary_window(&clock);
                    print_json(&engine.summary(from, to).await.into_diagnostic()?)?;
                }
                Report::Timeseries { from, to, bucket } => {
                    let (from, to) = MetricsQuery::parse(from.as_deref(), to.as_deref())
                        .into_diagnostic()?
                        .timeseries_window(&clock, bucket)
                        .into_diagnostic()?;
                    print_json(&engine.timeseries(from, to, bucket).await.into_diagnostic()?)?;
                }
                Report::FailureReasons { from, to } => {
                    let (from, to) = MetricsQuery::parse(from.as_deref(), to.as_deref())
                        .into_diagnostic()?
                        .summary_window(&clock);
                    print_json(&engine.failure_reasons(from, to).await.into_diagnostic()?)?;
                }
            }
        }
    }

    Ok(())
}

struct SimulateRun {
    duration: Duration,
    interval: Option<Duration>,
    feed: bool,
    export: Option<PathBuf>,
}

/// What `simulate` prints once the run has drained.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReport {
    #[serde(flatten)]
    summary: MetricsSummary,
    failure_reasons: Vec<FailureReasonCount>,
}

async fn simulate(
    store: EventStoreBox,
    config: SimulatorConfig,
    rng: Arc<dyn RandomSource>,
    run: SimulateRun,
) -> Result<()> {
    let clock = SystemClock;
    let broadcaster = Arc::new(Broadcaster::new(config.subscriber_buffer));
    let printer = run.feed.then(|| {
        let mut feed = broadcaster.subscribe();
        tokio::spawn(async move {
            while let Some(message) = feed.recv().await {
                println!("{message}");
            }
        })
    });

    let lifecycle = LifecycleSimulator::new(store.clone(), broadcaster.clone(), rng, Arc::new(config));
    let driver = SimulatorDriver::new(Arc::new(lifecycle));

    let from = clock.now();
    let status = driver.start(run.interval);
    tracing::info!(interval_ms = status.interval_ms, "running for {:?}", run.duration);
    tokio::time::sleep(run.duration).await;
    driver.stop();
    driver.drain().await;
    let to = clock.now();

    // Closing every sender ends the feed printer once its buffer is empty.
    drop(driver);
    drop(broadcaster);
    if let Some(printer) = printer {
        printer.await.into_diagnostic()?;
    }

    if let Some(path) = &run.export {
        let payments = store
            .find_payments(&PaymentFilter::created_between(from, to))
            .await
            .into_diagnostic()?;
        let file = File::create(path).into_diagnostic()?;
        PaymentWriter::new(file)
            .write_payments(&payments)
            .into_diagnostic()?;
    }

    let engine = MetricsEngine::new(store);
    let report = RunReport {
        summary: engine.summary(from, to).await.into_diagnostic()?,
        failure_reasons: engine.failure_reasons(from, to).await.into_diagnostic()?,
    };
    print_json(&report)
}

fn open_store(db_path: Option<&Path>) -> Result<EventStoreBox> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(path) = db_path {
        use pulsepay::infrastructure::rocksdb::RocksDbEventStore;
        let store = RocksDbEventStore::open(path).into_diagnostic()?;
        return Ok(Arc::new(store));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }

    Ok(Arc::new(InMemoryEventStore::new()))
}

fn random_source(seed: Option<u64>) -> Arc<dyn RandomSource> {
    match seed {
        Some(seed) => Arc::new(SeededRandom::from_seed(seed)),
        None => Arc::new(SeededRandom::from_entropy()),
    }
}

/// Loads payments from a CSV file. Bad rows are reported and skipped.
async fn import_csv(store: &EventStoreBox, input: Option<&Path>) -> Result<()> {
    let Some(path) = input else {
        return Ok(());
    };
    let file = File::open(path).into_diagnostic()?;
    for row in PaymentReader::new(file).payments() {
        match row {
            Ok(payment) => store.import_payment(payment).await.into_diagnostic()?,
            Err(e) => eprintln!("Error reading payment: {}", e),
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}
