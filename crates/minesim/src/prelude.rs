/*!
Re-export of common values and datatypes

Must be imported manually.

```
use minesim::prelude::*;
```
*/

use crate::{
    arena, block, miner, results, simulation, solve_time, stats, topology,
    trace,
};

pub use arena::{ArenaError, BlockArena};

pub use block::{Block, BlockId};

pub use miner::{Miner, MinerId, Peer};

pub use results::{Average, Format, ResultsBuilder, ResultsTable};

pub use simulation::{
    MinerOutput, PruneTrigger, Seed, Simulation, SimulationBuildError,
    SimulationBuilder, SimulationError, SimulationGroup, SimulationOutput,
    StopCondition,
};

pub use solve_time::{Exponential, Scripted, SolveTime};

pub use stats::{MinerSummary, Summary};

pub use topology::{MinerSpec, Topology, TopologyError};

pub use trace::{TraceEvent, Tracer};
