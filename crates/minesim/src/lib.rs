/*!
Discrete-event simulator of a proof-of-work mining network.

Miners with fixed hash power are connected by directed relay links with fixed
delays. Each miner works on the tallest block it knows of, publishes what it
finds to its peers, and switches to any strictly taller block it receives.
The simulation measures how much of the agreed chain each miner ends up
owning, how many blocks go stale and how deep reorganizations get.

See [`simulation`] for a complete example.
*/

pub mod arena;
pub mod block;
pub mod event;
pub mod miner;
pub mod prelude;
pub mod results;
pub mod simulation;
pub mod solve_time;
pub mod stats;
pub mod topology;
pub mod trace;

pub(crate) mod utils;
