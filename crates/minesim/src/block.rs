//! Blocks as stored in the [`BlockArena`](crate::arena::BlockArena)

use std::fmt::Display;

use crate::miner::MinerId;

/// Unique identifier of a [`Block`]. Identifiers are handed out in creation
/// order and are never reused, so a smaller id always means an older block.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub(crate) u64);

impl BlockId {
    /// Returns the [`u64`] corresponding to this [`BlockId`].
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for BlockId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Representation of a mined block. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    /// `None` only for the genesis block.
    pub parent: Option<BlockId>,
    /// Length of the path from this block to the genesis block.
    pub height: u64,
    /// The miner which found this block, `None` for the genesis block.
    pub miner: Option<MinerId>,
    /// Simulation clock value at the moment the block was found.
    pub discovered_at: f64,
}

impl Block {
    /// Id of the genesis block. Arbitrary, but keeps block ids visibly
    /// distinct from heights in trace output.
    pub const GENESIS_ID: BlockId = BlockId(1000);

    /// Creates the genesis block, which has height 0 and no parent or miner.
    pub fn genesis() -> Self {
        Block {
            id: Self::GENESIS_ID,
            parent: None,
            height: 0,
            miner: None,
            discovered_at: 0.0,
        }
    }

    #[inline]
    pub fn is_genesis(&self) -> bool {
        self.parent.is_none()
    }
}
