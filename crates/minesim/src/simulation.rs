/*!
Building and running simulations

A [`Simulation`] owns all mutable state of a single run: the block arena, the
miners, the event queue, the clock and the random stream. It is driven one
event at a time by [`Simulation::step`], or to completion by
[`Simulation::run`]. Nothing is shared between simulations, so any number of
them can run side by side, which is what [`SimulationGroup`] does for
repeated runs.

# Example

```
use minesim::prelude::*;

let topology: Topology = "
    a 1 b 0.5 c 0.5
    b 1 a 0.5 c 0.5
    c 2 a 0.5 b 0.5
"
.parse()
.unwrap();

let output = SimulationBuilder::new()
    .topology(topology)
    .block_interval(10.0)
    .height(200)
    .seed(42)
    .build_simulation()
    .unwrap()
    .run()
    .unwrap();

let credited: u64 = output.miners.iter().map(|m| m.credited).sum();
assert_eq!(credited, output.confirmed_height);
```
*/

use std::{
    collections::{hash_map::Entry, HashMap},
    num::NonZeroUsize,
    time::{SystemTime, UNIX_EPOCH},
};

#[cfg(feature = "rayon")]
use rayon::prelude::*;
use tracing::{debug, info, trace};

use crate::{
    arena::{ArenaError, BlockArena},
    block::BlockId,
    event::{Event, EventQueue},
    miner::{Miner, MinerId},
    results::ResultsBuilder,
    solve_time::SolveTime,
    trace::{TraceEvent, Tracer},
};

pub mod builder;

pub use builder::{SimulationBuildError, SimulationBuilder};

/// When a simulation run ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    /// Stop after this many events have been processed, stale ones
    /// included.
    Steps(u64),
    /// Stop as soon as a block of this height has been mined.
    Height(u64),
}

/// When the simulation prunes its block arena.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PruneTrigger {
    /// Prune whenever every miner is mining on the same block.
    #[default]
    SingleTip,
    /// Prune whenever the maximum block height has grown by the given amount
    /// since the last pruning pass.
    HeightBatch(u64),
}

/// Seed of a simulation's random stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seed {
    Fixed(u64),
    /// Derive the seed from the wall clock.
    Entropy,
}

impl Seed {
    /// Returns the seed value, reading the wall clock for [`Seed::Entropy`].
    pub fn resolve(self) -> u64 {
        match self {
            Seed::Fixed(seed) => seed,
            Seed::Entropy => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_nanos() as u64)
                .unwrap_or_default(),
        }
    }
}

impl Default for Seed {
    fn default() -> Self {
        Seed::Fixed(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("block arena is inconsistent")]
    Arena(#[from] ArenaError),
}

/// A single run of the mining network.
#[derive(Clone)]
pub struct Simulation {
    arena: BlockArena,
    miners: Vec<Miner>,
    queue: EventQueue,
    /// Current simulated time. Only advanced by popping events.
    clock: f64,
    /// Number of events popped so far.
    steps: u64,
    total_hashrate: f64,
    max_reorg_depth: u64,
    /// Number of miners mining on each live tip.
    tips: HashMap<BlockId, usize>,
    solve_times: Box<dyn SolveTime>,
    tracer: Option<Box<dyn Tracer>>,
    stop: StopCondition,
    prune: PruneTrigger,
    next_prune_height: u64,
    seed: u64,
    block_interval: f64,
    started: bool,
}

/// Counters of a single miner at the end of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct MinerOutput {
    pub name: String,
    pub hashrate: f64,
    pub mined: u64,
    pub credited: u64,
}

/// Contains the output data from a simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutput {
    pub seed: u64,
    pub block_interval: f64,
    /// Number of events processed.
    pub steps: u64,
    /// Simulated time at which the run ended.
    pub clock: f64,
    /// Height of the final base block, equal to the total number of
    /// credited blocks.
    pub confirmed_height: u64,
    pub max_reorg_depth: u64,
    pub total_hashrate: f64,
    /// Oldest block id retained at the end of the run.
    pub base_id: BlockId,
    /// Per-miner counters, indexed by [`MinerId`].
    pub miners: Vec<MinerOutput>,
}

impl Simulation {
    /// Current simulated time.
    #[inline]
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Number of events processed so far.
    #[inline]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Deepest reorg any miner has gone through so far.
    #[inline]
    pub fn max_reorg_depth(&self) -> u64 {
        self.max_reorg_depth
    }

    #[inline]
    pub fn total_hashrate(&self) -> f64 {
        self.total_hashrate
    }

    #[inline]
    pub fn arena(&self) -> &BlockArena {
        &self.arena
    }

    #[inline]
    pub fn miners(&self) -> &[Miner] {
        &self.miners
    }

    /// Returns true once the configured [`StopCondition`] has been reached.
    pub fn is_finished(&self) -> bool {
        match self.stop {
            StopCondition::Steps(steps) => self.steps >= steps,
            StopCondition::Height(height) => self.arena.max_height() >= height,
        }
    }

    /// Processes the earliest scheduled event, pruning the arena first if
    /// the [`PruneTrigger`] calls for it. Returns false if no event was left
    /// to process.
    pub fn step(&mut self) -> Result<bool, SimulationError> {
        if !self.started {
            self.start()?;
        }
        if self.should_prune() {
            self.prune()?;
        }

        let (time, event) = match self.queue.pop_earliest() {
            Some(next) => next,
            None => return Ok(false),
        };
        self.clock = time;
        self.steps += 1;

        match event {
            Event::Mined { miner, parent } => self.on_mined(miner, parent)?,
            Event::Received { miner, block } => {
                self.on_received(miner, block)?
            }
        }

        Ok(true)
    }

    /// Runs the simulation until its [`StopCondition`] is reached.
    pub fn run(mut self) -> Result<SimulationOutput, SimulationError> {
        while !self.is_finished() {
            if !self.step()? {
                break;
            }
        }

        self.finish()
    }

    /// Ends the run, crediting any history which has become irrevocable
    /// since the last pruning pass.
    pub fn finish(mut self) -> Result<SimulationOutput, SimulationError> {
        self.prune()?;

        let confirmed_height = self.arena.block(self.arena.base())?.height;
        let miners = self
            .miners
            .into_iter()
            .map(|miner| MinerOutput {
                name: miner.name,
                hashrate: miner.hashrate,
                mined: miner.mined,
                credited: miner.credited,
            })
            .collect();

        info!(
            seed = self.seed,
            steps = self.steps,
            clock = self.clock,
            confirmed_height,
            max_reorg_depth = self.max_reorg_depth,
            "Simulation finished"
        );

        Ok(SimulationOutput {
            seed: self.seed,
            block_interval: self.block_interval,
            steps: self.steps,
            clock: self.clock,
            confirmed_height,
            max_reorg_depth: self.max_reorg_depth,
            total_hashrate: self.total_hashrate,
            base_id: self.arena.base(),
            miners,
        })
    }

    /// Credits and discards all history below the common ancestor of every
    /// miner's tip. Returns the number of blocks credited.
    ///
    /// Every block on the path from the old base (exclusive) up to the
    /// common ancestor (inclusive) is part of the chain for good, so its
    /// miner is credited exactly once here. Running this twice without an
    /// intervening event credits nothing the second time.
    pub fn prune(&mut self) -> Result<u64, SimulationError> {
        if let PruneTrigger::HeightBatch(batch) = self.prune {
            self.next_prune_height = self.arena.max_height() + batch;
        }

        let base = self.arena.base();
        let ancestor =
            self.arena.common_ancestor(self.miners.iter().map(|m| m.tip))?;
        if ancestor == base {
            return Ok(0);
        }

        let mut credited = 0;
        for block in self.arena.branch(ancestor, base)? {
            if let Some(miner) = block.miner {
                self.miners[miner.0].credited += 1;
                credited += 1;
            }
        }
        let discarded = self.arena.prune_to(ancestor)?;

        debug!(
            time = self.clock,
            base = %ancestor,
            credited,
            discarded,
            retained = self.arena.len(),
            "Pruned block arena"
        );

        Ok(credited)
    }

    /// Restarts the random stream from `seed`. Only meaningful before the
    /// first step.
    pub(crate) fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.solve_times.reseed(seed);
    }

    fn start(&mut self) -> Result<(), SimulationError> {
        self.started = true;

        info!(
            seed = self.seed,
            miners = self.miners.len(),
            total_hashrate = self.total_hashrate,
            "Starting simulation"
        );

        let genesis = self.arena.base();
        for i in 0..self.miners.len() {
            self.start_mining(MinerId(i), genesis)?;
        }

        Ok(())
    }

    fn should_prune(&self) -> bool {
        match self.prune {
            PruneTrigger::SingleTip => {
                self.tips.len() == 1
                    && !self.tips.contains_key(&self.arena.base())
            }
            PruneTrigger::HeightBatch(_) => {
                self.arena.max_height() >= self.next_prune_height
            }
        }
    }

    /// Points the miner at `tip` and schedules its next mining success.
    fn start_mining(
        &mut self,
        id: MinerId,
        tip: BlockId,
    ) -> Result<(), SimulationError> {
        let miner = &mut self.miners[id.0];
        miner.tip = tip;
        *self.tips.entry(tip).or_default() += 1;

        let solve_time =
            self.solve_times.solve_time(miner.hashrate, self.total_hashrate);
        self.queue.schedule(
            self.clock + solve_time,
            Event::Mined { miner: id, parent: tip },
        );

        if let Some(tracer) = self.tracer.as_mut() {
            tracer.record(&TraceEvent::StartOn {
                time: self.clock,
                miner: &miner.name,
                tip,
                height: self.arena.block(tip)?.height,
                mined: miner.mined,
                credited: miner.credited,
                solve_time,
            });
        }

        Ok(())
    }

    fn stop_mining(&mut self, id: MinerId) {
        let tip = self.miners[id.0].tip;

        if let Entry::Occupied(mut entry) = self.tips.entry(tip) {
            *entry.get_mut() -= 1;
            if *entry.get() == 0 {
                entry.remove();
            }
        }
    }

    fn on_mined(
        &mut self,
        id: MinerId,
        parent: BlockId,
    ) -> Result<(), SimulationError> {
        if self.miners[id.0].tip != parent {
            // Stale: the miner switched tips after this attempt was
            // scheduled, and a newer attempt is still outstanding.
            return Ok(());
        }

        self.miners[id.0].mined += 1;
        self.stop_mining(id);
        let block = self.arena.append(parent, id, self.clock)?;

        if let Some(tracer) = self.tracer.as_mut() {
            tracer.record(&TraceEvent::Mined {
                time: self.clock,
                miner: &self.miners[id.0].name,
                id: block,
                parent,
                height: self.arena.block(block)?.height,
            });
        }

        self.relay(id, block)?;
        self.start_mining(id, block)
    }

    fn on_received(
        &mut self,
        id: MinerId,
        block: BlockId,
    ) -> Result<(), SimulationError> {
        let height = match self.arena.height_of(block) {
            Some(height) => height,
            // Pruned while in flight.
            None => return Ok(()),
        };

        let tip = self.miners[id.0].tip;
        if height <= self.arena.block(tip)?.height {
            // Already mining on something at least as good, which has been
            // relayed before.
            return Ok(());
        }

        let depth = self.arena.reorg_depth(tip, block)?;

        if let Some(tracer) = self.tracer.as_mut() {
            let name = &self.miners[id.0].name;
            tracer.record(&TraceEvent::Switched {
                time: self.clock,
                miner: name,
                block,
            });
            if depth > 0 {
                tracer.record(&TraceEvent::Reorg {
                    time: self.clock,
                    miner: name,
                    depth,
                    max_depth: self.max_reorg_depth,
                });
            }
        }
        if depth > 0 {
            trace!(time = self.clock, miner = %id, depth, "Reorg");
        }
        self.max_reorg_depth = self.max_reorg_depth.max(depth);

        self.stop_mining(id);
        self.relay(id, block)?;
        self.start_mining(id, block)
    }

    /// Sends `block` to each of the miner's peers, skipping peers already
    /// mining on a block at least as tall.
    fn relay(
        &mut self,
        id: MinerId,
        block: BlockId,
    ) -> Result<(), SimulationError> {
        let height = self.arena.block(block)?.height;

        for peer in self.miners[id.0].peers.iter() {
            let target_tip = self.miners[peer.target.0].tip;
            if matches!(self.arena.height_of(target_tip), Some(h) if h >= height)
            {
                continue;
            }

            self.queue.schedule(
                self.clock + peer.delay,
                Event::Received { miner: peer.target, block },
            );
        }

        Ok(())
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("clock", &self.clock)
            .field("steps", &self.steps)
            .field("seed", &self.seed)
            .field("base", &self.arena.base())
            .field("miners", &self.miners)
            .field("queued", &self.queue.len())
            .field("solve_times", &self.solve_times)
            .finish_non_exhaustive()
    }
}

/// Container for a group of simulation runs which share one configuration.
/// Runs differ only in their seed: the `i`-th run uses the configured seed
/// plus `i`. Should be run using this struct's `run_all` method.
#[derive(Debug, Clone)]
pub struct SimulationGroup {
    template: Simulation,
    repeat_all: NonZeroUsize,
}

impl SimulationGroup {
    pub fn builder() -> SimulationBuilder {
        SimulationBuilder::new()
    }

    /// Number of runs in this group.
    pub fn len(&self) -> usize {
        self.repeat_all.get()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Executes every run of the group, in parallel when the `rayon`
    /// feature is enabled.
    pub fn run_all(self) -> Result<ResultsBuilder, SimulationError> {
        let SimulationGroup { template, repeat_all } = self;

        let sims: Vec<_> = (0..repeat_all.get() as u64)
            .map(|i| {
                let mut sim = template.clone();
                sim.reseed(template.seed.wrapping_add(i));
                sim
            })
            .collect();

        #[cfg(feature = "rayon")]
        let outputs: Result<Vec<_>, _> =
            sims.into_par_iter().map(Simulation::run).collect();
        #[cfg(not(feature = "rayon"))]
        let outputs: Result<Vec<_>, _> =
            sims.into_iter().map(Simulation::run).collect();

        Ok(ResultsBuilder::new(outputs?, repeat_all))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{solve_time::Scripted, topology::Topology};

    fn pair(delay: f64) -> Topology {
        let mut topology = Topology::new();
        let a = topology.add_miner("a", 1.0).unwrap();
        let b = topology.add_miner("b", 1.0).unwrap();
        topology.connect(a, b, delay).unwrap();
        topology
    }

    #[test]
    fn stale_mining_events_are_discarded() {
        // a: 5.0, b: 7.0, then a's next attempt after block 1001 takes 100.
        let mut sim = SimulationBuilder::new()
            .topology(pair(1.0))
            .solve_times(Scripted::new([5.0, 7.0, 100.0]))
            .build_simulation()
            .unwrap();

        // a mines at 5.0, b receives it at 6.0 and switches.
        sim.step().unwrap();
        sim.step().unwrap();
        assert_eq!(sim.clock(), 6.0);
        assert_eq!(sim.miners()[1].tip, BlockId(1001));

        // b's original attempt at 7.0 is stale.
        sim.step().unwrap();
        assert_eq!(sim.clock(), 7.0);
        assert_eq!(sim.miners()[1].mined, 0);
        assert_eq!(sim.arena().next_id(), BlockId(1002));
    }

    #[test]
    fn single_tip_trigger_prunes_before_next_event() {
        let mut sim = SimulationBuilder::new()
            .topology(pair(0.0))
            .solve_times(Scripted::new([1.0, 50.0, 10.0, 10.0]))
            .build_simulation()
            .unwrap();

        sim.step().unwrap(); // a mines 1001
        sim.step().unwrap(); // b switches to 1001
        assert_eq!(sim.arena().base(), BlockId(1000));

        sim.step().unwrap();
        assert_eq!(sim.arena().base(), BlockId(1001));
        assert_eq!(sim.miners()[0].credited, 1);
    }

    #[test]
    fn height_batch_trigger_waits_for_threshold() {
        let mut solo = Topology::new();
        solo.add_miner("solo", 1.0).unwrap();

        let mut sim = SimulationBuilder::new()
            .topology(solo)
            .prune_trigger(PruneTrigger::HeightBatch(3))
            .solve_times(Scripted::new([1.0; 16]))
            .build_simulation()
            .unwrap();

        while sim.arena().max_height() < 3 {
            sim.step().unwrap();
            assert_eq!(sim.arena().base(), BlockId(1000));
        }

        sim.step().unwrap();
        let base = sim.arena().base();
        assert_eq!(sim.arena().height_of(base), Some(3));
        assert_eq!(sim.miners()[0].credited, 3);
    }

    #[test]
    fn seed_resolution() {
        assert_eq!(Seed::Fixed(17).resolve(), 17);
        assert_eq!(Seed::default(), Seed::Fixed(0));
    }
}
