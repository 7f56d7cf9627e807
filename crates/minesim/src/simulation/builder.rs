use std::{collections::HashMap, num::NonZeroUsize};

use crate::{
    arena::BlockArena,
    event::EventQueue,
    miner::{Miner, MinerId},
    solve_time::{Exponential, SolveTime},
    topology::Topology,
    trace::{TraceEvent, Tracer},
};

use super::{PruneTrigger, Seed, Simulation, SimulationGroup, StopCondition};

/// Builds a [`Simulation`] or a [`SimulationGroup`].
#[derive(Default)]
pub struct SimulationBuilder {
    pub block_interval: Option<f64>,
    pub stop: Option<StopCondition>,
    pub seed: Option<Seed>,
    pub prune: Option<PruneTrigger>,
    pub repeat_all: Option<usize>,
    topology: Option<Topology>,
    solve_times: Option<Box<dyn SolveTime>>,
    tracer: Option<Box<dyn Tracer>>,
}

#[derive(Debug, thiserror::Error)]
pub enum SimulationBuildError {
    #[error("no topology was given")]
    NoTopology,
    #[error("topology contains no miners")]
    NoMiners,
    #[error("block interval must be a positive number, got {0}")]
    BadBlockInterval(f64),
    #[error("number of simulation steps must be greater than 0")]
    ZeroSteps,
    #[error("target chain height must be greater than 0")]
    ZeroHeight,
    #[error("number of repeated runs must be greater than 0")]
    ZeroRepeats,
    #[error("prune batch size must be greater than 0")]
    ZeroPruneBatch,
}

impl SimulationBuilder {
    /// Network-wide mean block interval used when none is given.
    pub const DEFAULT_BLOCK_INTERVAL: f64 = 300.0;
    /// Number of steps run when no [`StopCondition`] is given.
    pub const DEFAULT_STEPS: u64 = 1_000_000;

    /// Creates a new [`SimulationBuilder`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the network the simulation runs on.
    pub fn topology(mut self, topology: Topology) -> Self {
        self.topology = Some(topology);

        self
    }

    /// Sets the mean time between blocks across the whole network
    /// (default 300).
    pub fn block_interval(mut self, interval: f64) -> Self {
        self.block_interval = Some(interval);

        self
    }

    /// The simulation will stop after processing `steps` events
    /// (default 1,000,000).
    pub fn steps(mut self, steps: u64) -> Self {
        self.stop = Some(StopCondition::Steps(steps));

        self
    }

    /// The simulation will stop once a block of the given height is mined.
    pub fn height(mut self, height: u64) -> Self {
        self.stop = Some(StopCondition::Height(height));

        self
    }

    /// Sets the seed of the random stream (default 0).
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(Seed::Fixed(seed));

        self
    }

    /// Derive the seed of the random stream from the wall clock.
    pub fn entropy_seed(mut self) -> Self {
        self.seed = Some(Seed::Entropy);

        self
    }

    /// Sets when the block arena gets pruned (default
    /// [`PruneTrigger::SingleTip`]).
    pub fn prune_trigger(mut self, trigger: PruneTrigger) -> Self {
        self.prune = Some(trigger);

        self
    }

    /// Each run of the built [`SimulationGroup`] is repeated `num` times
    /// with consecutive seeds (default 1).
    pub fn repeat_all(mut self, num: usize) -> Self {
        self.repeat_all = Some(num);

        self
    }

    /// Replaces the default exponential solve times with `source`. The
    /// block interval is then only used for reporting.
    pub fn solve_times<S: SolveTime + 'static>(mut self, source: S) -> Self {
        self.solve_times = Some(Box::new(source));

        self
    }

    /// Reports every step of the simulation to `tracer`.
    pub fn tracer<F>(mut self, tracer: F) -> Self
    where
        F: FnMut(&TraceEvent<'_>) + Clone + Send + 'static,
    {
        self.tracer = Some(Box::new(tracer));

        self
    }

    /// Creates a [`SimulationGroup`] from the specified parameters.
    pub fn build(self) -> Result<SimulationGroup, SimulationBuildError> {
        let repeat_all = match self.repeat_all {
            None => NonZeroUsize::MIN,
            Some(num) => NonZeroUsize::new(num)
                .ok_or(SimulationBuildError::ZeroRepeats)?,
        };

        Ok(SimulationGroup {
            template: self.build_simulation()?,
            repeat_all,
        })
    }

    /// Creates a single [`Simulation`] from the specified parameters.
    pub fn build_simulation(self) -> Result<Simulation, SimulationBuildError> {
        use SimulationBuildError::*;

        let SimulationBuilder {
            block_interval,
            stop,
            seed,
            prune,
            topology,
            solve_times,
            tracer,
            ..
        } = self;

        let topology = topology.ok_or(NoTopology)?;
        if topology.is_empty() {
            return Err(NoMiners);
        }

        let block_interval = block_interval.unwrap_or(Self::DEFAULT_BLOCK_INTERVAL);
        if !(block_interval > 0.0 && block_interval.is_finite()) {
            return Err(BadBlockInterval(block_interval));
        }

        let stop = stop.unwrap_or(StopCondition::Steps(Self::DEFAULT_STEPS));
        match stop {
            StopCondition::Steps(0) => return Err(ZeroSteps),
            StopCondition::Height(0) => return Err(ZeroHeight),
            _ => (),
        }

        let prune = prune.unwrap_or_default();
        let next_prune_height = match prune {
            PruneTrigger::HeightBatch(0) => return Err(ZeroPruneBatch),
            PruneTrigger::HeightBatch(batch) => batch,
            PruneTrigger::SingleTip => 0,
        };

        let seed = seed.unwrap_or_default().resolve();
        let solve_times = solve_times.unwrap_or_else(|| {
            Box::new(Exponential::new(block_interval, seed))
        });

        let arena = BlockArena::new();
        let miners = topology
            .miners()
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                Miner::new(
                    MinerId(i),
                    spec.name.clone(),
                    spec.hashrate,
                    spec.peers.clone(),
                )
            })
            .collect();

        Ok(Simulation {
            arena,
            miners,
            queue: EventQueue::new(),
            clock: 0.0,
            steps: 0,
            total_hashrate: topology.total_hashrate(),
            max_reorg_depth: 0,
            tips: HashMap::new(),
            solve_times,
            tracer,
            stop,
            prune,
            next_prune_height,
            seed,
            block_interval,
            started: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solo() -> Topology {
        let mut topology = Topology::new();
        topology.add_miner("solo", 1.0).unwrap();
        topology
    }

    #[test]
    fn example_build() {
        let sim = SimulationBuilder::new()
            .topology(solo())
            .build_simulation()
            .expect("valid simulation build");

        assert_eq!(sim.seed(), 0);
        assert_eq!(sim.total_hashrate(), 1.0);
        assert_eq!(sim.miners().len(), 1);
    }

    #[test]
    fn rejects_invalid_parameters() {
        use SimulationBuildError::*;

        let err = SimulationBuilder::new().build().unwrap_err();
        assert!(matches!(err, NoTopology));

        let err = SimulationBuilder::new()
            .topology(Topology::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, NoMiners));

        for interval in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = SimulationBuilder::new()
                .topology(solo())
                .block_interval(interval)
                .build()
                .unwrap_err();
            assert!(matches!(err, BadBlockInterval(_)));
        }

        let err =
            SimulationBuilder::new().topology(solo()).steps(0).build().unwrap_err();
        assert!(matches!(err, ZeroSteps));

        let err =
            SimulationBuilder::new().topology(solo()).height(0).build().unwrap_err();
        assert!(matches!(err, ZeroHeight));

        let err = SimulationBuilder::new()
            .topology(solo())
            .repeat_all(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ZeroRepeats));

        let err = SimulationBuilder::new()
            .topology(solo())
            .prune_trigger(PruneTrigger::HeightBatch(0))
            .build()
            .unwrap_err();
        assert!(matches!(err, ZeroPruneBatch));
    }

    #[test]
    fn group_size() {
        let group = SimulationBuilder::new()
            .topology(solo())
            .repeat_all(4)
            .build()
            .unwrap();

        assert_eq!(group.len(), 4);
    }
}
