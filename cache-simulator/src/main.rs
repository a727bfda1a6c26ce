use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gencache::HaltPolicy;
use gencache_simulator::runner::{self, SimulationConfig};
use gencache_simulator::stats::{self, CsvResultRow};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Order-storage workload simulator for gencache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// Warm-up halt policy
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Policy {
    /// Close only the bucket that would evict
    PerBucket,
    /// End the warm-up at the first bucket that would evict
    Abort,
}

impl From<Policy> for HaltPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::PerBucket => HaltPolicy::PerBucket,
            Policy::Abort => HaltPolicy::Abort,
        }
    }
}

/// Subcommands for the CLI
#[derive(Subcommand, Debug)]
enum Commands {
    /// Seed a store, warm the cache and replay read/write traffic
    Simulate {
        /// Orders seeded into the backing store
        #[arg(long, default_value = "100000")]
        orders: usize,

        /// Reader threads
        #[arg(long, default_value = "4")]
        threads: usize,

        /// Lookups per reader thread
        #[arg(long, default_value = "50000")]
        reads: usize,

        /// Writer threads ingesting new orders during traffic
        #[arg(long, default_value = "1")]
        writers: usize,

        /// Orders ingested per writer thread
        #[arg(long, default_value = "5000")]
        writes: usize,

        /// Cache capacity in MiB
        #[arg(long, default_value = "32")]
        capacity_mb: usize,

        /// Number of cache buckets (default: derived from CPU count)
        #[arg(long)]
        buckets: Option<usize>,

        /// Chunk size in bytes, a power of two (default: 64 KiB)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Warm-up page size
        #[arg(long, default_value = "1024")]
        page_size: usize,

        /// Warm-up halt policy
        #[arg(long, value_enum, default_value_t = Policy::PerBucket)]
        policy: Policy,

        /// Line items per order
        #[arg(long, default_value = "2")]
        items: usize,

        /// Probability that a lookup targets a recent order
        #[arg(long, default_value = "0.8")]
        recent_bias: f64,

        /// Number of newest orders counted as recent
        #[arg(long, default_value = "10000")]
        recent_window: usize,

        /// RNG seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Append results to a CSV file
        #[arg(long, value_name = "PATH")]
        output_csv: Option<PathBuf>,

        /// Also print the cache statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    match args.command {
        Commands::Simulate {
            orders,
            threads,
            reads,
            writers,
            writes,
            capacity_mb,
            buckets,
            chunk_size,
            page_size,
            policy,
            items,
            recent_bias,
            recent_window,
            seed,
            output_csv,
            json,
        } => {
            let config = SimulationConfig {
                orders,
                threads,
                reads_per_thread: reads,
                writers,
                writes_per_thread: writes,
                capacity_mb,
                buckets,
                chunk_size,
                page_size,
                policy: policy.into(),
                items_per_order: items,
                recent_bias,
                recent_window,
                seed,
            };

            println!("Order Storage Simulation");
            println!("========================");
            println!("Orders: {orders}, readers: {threads}, writers: {writers}");
            println!("Cache capacity: {capacity_mb} MiB, warm-up policy: {policy:?}");
            println!();

            let result = runner::run(config)?;

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            stats::print_report(&mut out, &result)?;
            if json {
                writeln!(out)?;
                serde_json::to_writer_pretty(&mut out, &result.stats)?;
                writeln!(out)?;
            }

            if let Some(path) = output_csv {
                stats::append_csv(&path, &CsvResultRow::from_result(&result))
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("\nResults appended to: {}", path.display());
            }
            Ok(())
        }
    }
}
