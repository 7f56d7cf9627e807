/*!
Summary statistics of a finished simulation run

```
use minesim::prelude::*;

let mut topology = Topology::new();
let a = topology.add_miner("a", 1.0).unwrap();
let b = topology.add_miner("b", 3.0).unwrap();
topology.connect(a, b, 1.0).unwrap();

let output = SimulationBuilder::new()
    .topology(topology)
    .block_interval(60.0)
    .steps(10_000)
    .build_simulation()
    .unwrap()
    .run()
    .unwrap();

let summary = Summary::new(&output);
assert_eq!(summary.stale, summary.mined - summary.confirmed_height);
println!("{}", summary);
```
*/

use std::fmt::Display;

use crate::{block::BlockId, simulation::SimulationOutput};

/// Aggregate statistics derived from a [`SimulationOutput`]. Ratios whose
/// denominator is zero are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub seed: u64,
    pub block_interval: f64,
    pub steps: u64,
    /// Blocks mined by all miners, including stale ones.
    pub mined: u64,
    /// Length of the agreed chain, i.e. the number of credited blocks.
    pub confirmed_height: u64,
    /// Fraction of mined blocks which were credited.
    pub confirmed_fraction: Option<f64>,
    /// Simulated time at the end of the run.
    pub clock: f64,
    pub average_block_time: Option<f64>,
    pub total_hashrate: f64,
    /// Mined blocks which never made it into the agreed chain.
    pub stale: u64,
    pub max_reorg_depth: u64,
    pub base_id: BlockId,
    pub miners: Vec<MinerSummary>,
}

/// Statistics of a single miner.
#[derive(Debug, Clone, PartialEq)]
pub struct MinerSummary {
    pub name: String,
    pub hashrate: f64,
    /// Fraction of the total hashrate.
    pub hashrate_share: f64,
    pub mined: u64,
    pub credited: u64,
    /// Fraction of the agreed chain mined by this miner.
    pub revenue: Option<f64>,
    /// Fraction of this miner's blocks which were not credited.
    pub stale_rate: Option<f64>,
}

#[inline]
fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

impl Summary {
    pub fn new(output: &SimulationOutput) -> Self {
        let mined = output.miners.iter().map(|m| m.mined).sum();
        let confirmed_height = output.confirmed_height;

        let miners = output
            .miners
            .iter()
            .map(|m| MinerSummary {
                name: m.name.clone(),
                hashrate: m.hashrate,
                hashrate_share: m.hashrate / output.total_hashrate,
                mined: m.mined,
                credited: m.credited,
                revenue: ratio(m.credited, confirmed_height),
                stale_rate: ratio(m.mined - m.credited, m.mined),
            })
            .collect();

        Summary {
            seed: output.seed,
            block_interval: output.block_interval,
            steps: output.steps,
            mined,
            confirmed_height,
            confirmed_fraction: ratio(confirmed_height, mined),
            clock: output.clock,
            average_block_time: (confirmed_height > 0)
                .then(|| output.clock / confirmed_height as f64),
            total_hashrate: output.total_hashrate,
            stale: mined - confirmed_height,
            max_reorg_depth: output.max_reorg_depth,
            base_id: output.base_id,
            miners,
        }
    }
}

impl From<&SimulationOutput> for Summary {
    fn from(output: &SimulationOutput) -> Self {
        Self::new(output)
    }
}

/// Formats an optional ratio as a percentage.
struct Percent(Option<f64>);

impl Display for Percent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(ratio) => write!(f, "{:.2}%", ratio * 100.0),
            None => write!(f, "n/a"),
        }
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "seed-arg {}", self.seed)?;
        writeln!(f, "block-interval-arg {:.2}", self.block_interval)?;
        writeln!(f, "mined-blocks {}", self.mined)?;
        writeln!(
            f,
            "height {} {}",
            self.confirmed_height,
            Percent(self.confirmed_fraction)
        )?;
        writeln!(f, "total-simtime {:.2}", self.clock)?;
        match self.average_block_time {
            Some(time) => writeln!(f, "ave-block-time {:.2}", time)?,
            None => writeln!(f, "ave-block-time n/a")?,
        }
        writeln!(f, "total-hashrate-arg {:.2}", self.total_hashrate)?;
        writeln!(f, "total-stale {}", self.stale)?;
        writeln!(f, "max-reorg-depth {}", self.max_reorg_depth)?;
        writeln!(f, "baseblockid {}", self.base_id)?;
        write!(f, "repetitions-arg {}", self.steps)?;

        for miner in self.miners.iter() {
            writeln!(f)?;
            write!(
                f,
                "miner {} hashrate-arg {:.2} {} blocks {} stale {}",
                miner.name,
                miner.hashrate,
                Percent(Some(miner.hashrate_share)),
                Percent(miner.revenue),
                Percent(miner.stale_rate),
            )?;
        }

        Ok(())
    }
}
