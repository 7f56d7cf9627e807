/*!
Mining participants

A [`Miner`] is the mutable record the simulation keeps for every participant
in the network: its hash power, its outbound relay links, the block it is
currently mining on, and its block counters.
*/

use std::fmt::Display;

use crate::block::{Block, BlockId};

/// Unique identifier of a [`Miner`]. Corresponds to the miner's position in
/// the topology, starting at 0.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MinerId(pub(crate) usize);

impl MinerId {
    /// Returns the [`usize`] corresponding to this [`MinerId`].
    pub fn get(&self) -> usize {
        self.0
    }
}

impl From<usize> for MinerId {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl Display for MinerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// A directed relay link: blocks accepted by the owning miner reach `target`
/// after `delay` units of simulated time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peer {
    pub target: MinerId,
    pub delay: f64,
}

/// State of a single mining participant.
///
/// # Invariants
///
/// `credited <= mined` at all times, and `credited` never decreases.
#[derive(Debug, Clone, PartialEq)]
pub struct Miner {
    pub id: MinerId,
    pub name: String,
    pub hashrate: f64,
    /// Outbound links, in declaration order.
    pub peers: Vec<Peer>,
    /// The block this miner is trying to extend.
    pub tip: BlockId,
    /// Total blocks found, including ones later orphaned.
    pub mined: u64,
    /// Blocks found which are irrevocably part of the agreed chain.
    pub credited: u64,
}

impl Miner {
    /// Creates a miner mining on the genesis block.
    pub fn new<N: Into<String>>(
        id: MinerId,
        name: N,
        hashrate: f64,
        peers: Vec<Peer>,
    ) -> Self {
        Miner {
            id,
            name: name.into(),
            hashrate,
            peers,
            tip: Block::GENESIS_ID,
            mined: 0,
            credited: 0,
        }
    }

    /// Number of this miner's blocks which are not (yet) credited.
    #[inline]
    pub fn stale(&self) -> u64 {
        self.mined - self.credited
    }
}
