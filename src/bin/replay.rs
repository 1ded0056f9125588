//! Feed a captured serial log through the ingestion pipeline offline and
//! print the resulting snapshots as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use gashealth::aggregator::{IngestOutcome, TelemetryAggregator};
use log::{info, warn};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay a captured serial log", long_about = None)]
struct Args {
    /// Captured raw serial output
    input: PathBuf,

    /// Bytes handed to the framer per read
    #[arg(long, default_value_t = 64)]
    chunk: usize,

    /// Seconds between synthetic read timestamps
    #[arg(long, default_value_t = 0.1)]
    interval: f64,

    /// Print a snapshot after every N reads instead of only at the end
    #[arg(long)]
    every: Option<usize>,

    /// Log rejected lines
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::builder()
        .format_timestamp(None)
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();
    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let mut aggregator = TelemetryAggregator::new();
    aggregator.on_connect();

    let chunk = args.chunk.max(1);
    for (i, piece) in bytes.chunks(chunk).enumerate() {
        let at = i as f64 * args.interval;
        for outcome in aggregator.ingest_bytes(piece, at) {
            if let IngestOutcome::Rejected(e) = outcome {
                if args.verbose {
                    warn!("Rejected line: {}", e);
                }
            }
        }

        if let Some(every) = args.every {
            if every > 0 && (i + 1) % every == 0 {
                println!("{}", serde_json::to_string(&aggregator.store().telemetry())?);
            }
        }
    }

    let stats = aggregator.stats();
    info!(
        "Replayed {} bytes: {} lines, {} readings, {} skipped, {} acks, {} parse errors",
        bytes.len(),
        stats.lines,
        stats.readings,
        stats.skipped,
        stats.acks,
        stats.parse_errors
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&aggregator.store().telemetry())?
    );
    Ok(())
}
