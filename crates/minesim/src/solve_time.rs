/*!
Randomized block discovery timing

A [`SolveTime`] source decides how long a miner's current attempt will take.
The default source, [`Exponential`], models block discovery as a memoryless
(Poisson) process: for a miner with hashrate `h` in a network with total
hashrate `H` and target block interval `I`,

```text
solve_time = -ln(1 - u) * I * H / h,    u ~ Uniform[0, 1)
```

so the network as a whole finds a block every `I` time units on average, and
each miner finds a share `h / H` of them. Scaling every hashrate by the same
constant leaves the process unchanged.
*/

use std::{collections::VecDeque, fmt::Debug};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Source of solve times, drawn once each time a miner starts mining on a
/// new tip.
pub trait SolveTime: Debug + dyn_clone::DynClone + Send {
    /// Returns the time until a miner with the given hashrate finds its next
    /// block.
    fn solve_time(&mut self, hashrate: f64, total_hashrate: f64) -> f64;

    /// Restarts the underlying random stream from `seed`. Sources which
    /// don't draw random values ignore this.
    fn reseed(&mut self, _seed: u64) {}
}

dyn_clone::clone_trait_object!(SolveTime);

/// Exponentially distributed solve times drawn from a seeded
/// [`ChaCha8Rng`].
#[derive(Debug, Clone)]
pub struct Exponential {
    block_interval: f64,
    rng: ChaCha8Rng,
}

impl Exponential {
    /// Creates a source whose network-wide mean block interval is
    /// `block_interval`.
    pub fn new(block_interval: f64, seed: u64) -> Self {
        Exponential {
            block_interval,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn block_interval(&self) -> f64 {
        self.block_interval
    }
}

impl SolveTime for Exponential {
    fn solve_time(&mut self, hashrate: f64, total_hashrate: f64) -> f64 {
        let u: f64 = self.rng.gen();

        -(1.0 - u).ln() * self.block_interval * total_hashrate / hashrate
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }
}

/// Predetermined solve times, returned in order regardless of hashrate.
/// Once exhausted, every draw returns the fallback value.
///
/// ```
/// use minesim::solve_time::{Scripted, SolveTime};
///
/// let mut times = Scripted::new([50.0, 0.5]).then(1e6);
///
/// assert_eq!(times.solve_time(1.0, 2.0), 50.0);
/// assert_eq!(times.solve_time(1.0, 2.0), 0.5);
/// assert_eq!(times.solve_time(1.0, 2.0), 1e6);
/// ```
#[derive(Debug, Clone)]
pub struct Scripted {
    times: VecDeque<f64>,
    fallback: f64,
}

impl Scripted {
    /// Default solve time once the script runs out: long enough that it
    /// never fires in a scripted scenario.
    pub const DEFAULT_FALLBACK: f64 = 1e9;

    pub fn new<I>(times: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        Scripted {
            times: times.into_iter().collect(),
            fallback: Self::DEFAULT_FALLBACK,
        }
    }

    /// Sets the solve time returned once the script runs out.
    pub fn then(mut self, fallback: f64) -> Self {
        self.fallback = fallback;

        self
    }

    /// Number of scripted times not yet drawn.
    pub fn remaining(&self) -> usize {
        self.times.len()
    }
}

impl SolveTime for Scripted {
    fn solve_time(&mut self, _hashrate: f64, _total_hashrate: f64) -> f64 {
        self.times.pop_front().unwrap_or(self.fallback)
    }
}
