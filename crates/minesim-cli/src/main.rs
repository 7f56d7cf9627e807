//! Mining network simulator CLI
//!
//! # Example
//!
//! ```bash
//! # Simulate one million events on the network described in ./network
//! minesim
//!
//! # Trace every event until a block of height 100 is mined
//! minesim -f testnet -i 600 --height 100 -t
//!
//! # Mean of 50 repeated runs, as CSV
//! minesim -f testnet --height 5000 --repeat 50 --average mean --format csv
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use minesim::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Proof-of-work mining network simulator
///
/// Reads a network of miners and relay links, simulates block discovery and
/// propagation, and reports how the agreed chain was shared between miners.
/// Runs are reproducible when the same seed is used.
#[derive(Parser, Debug)]
#[command(name = "minesim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Topology file: one `name hashrate [peer delay]...` line per miner
    #[arg(short = 'f', long, default_value = "./network")]
    network: PathBuf,

    /// Mean time between blocks across the whole network
    #[arg(short = 'i', long, default_value = "300")]
    interval: f64,

    /// Number of events to simulate
    #[arg(short = 'r', long, default_value = "1000000")]
    repetitions: u64,

    /// Stop once a block of this height is mined, instead of after a fixed
    /// number of events
    #[arg(long, conflicts_with = "repetitions")]
    height: Option<u64>,

    /// Print one line per processed event
    #[arg(short = 't', long, conflicts_with = "repeat")]
    trace: bool,

    /// Seed of the random stream. -1 derives a seed from the clock.
    #[arg(short = 's', long, default_value = "0", allow_negative_numbers = true)]
    seed: i64,

    /// Prune every time the chain grows by this many blocks, instead of
    /// whenever all miners agree on a tip
    #[arg(long)]
    prune_batch: Option<u64>,

    /// Run the simulation this many times with consecutive seeds and print a
    /// table of results
    #[arg(long, default_value = "1")]
    repeat: usize,

    /// How repeated runs are combined into one row
    #[arg(long, value_enum, default_value_t = AverageArg::None)]
    average: AverageArg,

    /// Table format for repeated runs
    #[arg(long, value_enum, default_value_t = FormatArg::Pretty)]
    format: FormatArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AverageArg {
    None,
    Mean,
    Median,
    Max,
    Min,
}

impl From<AverageArg> for Average {
    fn from(value: AverageArg) -> Self {
        match value {
            AverageArg::None => Average::None,
            AverageArg::Mean => Average::Mean,
            AverageArg::Median => Average::Median,
            AverageArg::Max => Average::Max,
            AverageArg::Min => Average::Min,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Csv,
    Pretty,
}

impl From<FormatArg> for Format {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Csv => Format::CSV,
            FormatArg::Pretty => Format::PrettyPrint,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let topology = Topology::from_file(&args.network).with_context(|| {
        format!("invalid network topology in {}", args.network.display())
    })?;

    info!(
        network = %args.network.display(),
        miners = topology.len(),
        total_hashrate = topology.total_hashrate(),
        "Loaded topology"
    );

    let mut builder = SimulationBuilder::new()
        .topology(topology)
        .block_interval(args.interval)
        .repeat_all(args.repeat);

    builder = match args.height {
        Some(height) => builder.height(height),
        None => builder.steps(args.repetitions),
    };

    builder = match args.seed {
        -1 => builder.entropy_seed(),
        seed if seed < 0 => bail!("seed must be non-negative or -1, got {}", seed),
        seed => builder.seed(seed as u64),
    };

    if let Some(batch) = args.prune_batch {
        builder = builder.prune_trigger(PruneTrigger::HeightBatch(batch));
    }

    if args.trace {
        builder = builder.tracer(|event: &TraceEvent<'_>| println!("{}", event));
    }

    if args.repeat > 1 {
        let results = builder
            .build()
            .context("invalid simulation parameters")?
            .run_all()?
            .all()
            .average(args.average.into())
            .format(args.format.into())
            .build();

        println!("{}", results);
    } else {
        let output = builder
            .build_simulation()
            .context("invalid simulation parameters")?
            .run()?;

        println!("{}", Summary::new(&output));
    }

    Ok(())
}
