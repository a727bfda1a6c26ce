// Statistics reporting and CSV export for simulation runs

use crate::runner::SimulationResult;
use gencache::HaltPolicy;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

/// One CSV row per simulation run
#[derive(Debug, Clone, Serialize)]
pub struct CsvResultRow {
    pub orders: usize,
    pub threads: usize,
    pub writers: usize,
    pub capacity_mb: usize,
    pub buckets: usize,
    pub policy: &'static str,
    pub avg_order_bytes: usize,
    pub warm_up_loaded: u64,
    pub warm_up_skipped: u64,
    pub warm_up_pages: u64,
    pub warm_up_ms: u64,
    pub reads: u64,
    pub cache_hits: u64,
    pub hit_rate: f64,
    pub store_lookups: u64,
    pub ingested: u64,
    pub traffic_ms: u64,
    pub reads_per_sec: f64,
    pub evictions: u64,
    pub collisions: u64,
    pub dropped: u64,
    pub entries_count: u64,
    pub bytes_size: u64,
    pub max_bytes_size: u64,
    pub generations: u64,
}

fn policy_name(policy: HaltPolicy) -> &'static str {
    match policy {
        HaltPolicy::PerBucket => "per-bucket",
        HaltPolicy::Abort => "abort",
    }
}

impl CsvResultRow {
    pub fn from_result(result: &SimulationResult) -> Self {
        let stats = &result.stats;
        Self {
            orders: result.config.orders,
            threads: result.config.threads,
            writers: result.config.writers,
            capacity_mb: result.config.capacity_mb,
            buckets: result.buckets,
            policy: policy_name(result.config.policy),
            avg_order_bytes: result.avg_order_bytes,
            warm_up_loaded: result.warm_up.loaded,
            warm_up_skipped: result.warm_up.skipped,
            warm_up_pages: result.warm_up.pages,
            warm_up_ms: result.warm_up_time.as_millis() as u64,
            reads: result.reads,
            cache_hits: result.cache_hits,
            hit_rate: result.cache_hit_rate(),
            store_lookups: result.store_lookups,
            ingested: result.ingested,
            traffic_ms: result.traffic_time.as_millis() as u64,
            reads_per_sec: result.reads_per_sec(),
            evictions: stats.evictions,
            collisions: stats.collisions,
            dropped: stats.dropped,
            entries_count: stats.entries_count,
            bytes_size: stats.bytes_size,
            max_bytes_size: stats.max_bytes_size,
            generations: stats.generations,
        }
    }
}

/// Print a human-readable report
pub fn print_report<W: Write>(out: &mut W, result: &SimulationResult) -> io::Result<()> {
    let stats = &result.stats;
    writeln!(out, "Warm-up")?;
    writeln!(out, "-------")?;
    writeln!(
        out,
        "Loaded {} orders in {} pages ({:.2?}), skipped {}, closed buckets {}",
        result.warm_up.loaded,
        result.warm_up.pages,
        result.warm_up_time,
        result.warm_up.skipped,
        result.warm_up.halted_buckets
    )?;
    writeln!(out)?;

    writeln!(out, "Traffic")?;
    writeln!(out, "-------")?;
    writeln!(
        out,
        "{} reads in {:.2?} ({:.0} reads/s), {} orders ingested",
        result.reads,
        result.traffic_time,
        result.reads_per_sec(),
        result.ingested
    )?;
    writeln!(
        out,
        "Cache hit rate: {:.2}% ({} hits, {} store lookups, {} not found)",
        result.cache_hit_rate() * 100.0,
        result.cache_hits,
        result.store_lookups,
        result.not_found
    )?;
    writeln!(out)?;

    writeln!(out, "Cache")?;
    writeln!(out, "-----")?;
    writeln!(
        out,
        "{:<16} {:>14} {:>14} {:>12} {:>12} {:>10}",
        "Resident (MB)", "Entries", "Evictions", "Collisions", "Dropped", "Gens"
    )?;
    writeln!(
        out,
        "{:<16.2} {:>14} {:>14} {:>12} {:>12} {:>10}",
        stats.bytes_size as f64 / 1_048_576.0,
        stats.entries_count,
        stats.evictions,
        stats.collisions,
        stats.dropped,
        stats.generations
    )?;
    writeln!(
        out,
        "Utilization {:.1}% of {:.2} MB",
        stats.utilization() * 100.0,
        stats.max_bytes_size as f64 / 1_048_576.0
    )?;
    Ok(())
}

/// Append a row to `path`, writing the header only when the file is new
pub fn append_csv(path: &Path, row: &CsvResultRow) -> Result<(), csv::Error> {
    let exists = path.metadata().map(|m| m.len() > 0).unwrap_or(false);
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(!exists)
        .from_writer(file);
    writer.serialize(row)?;
    writer.flush()?;
    Ok(())
}
