//! Append-only, index-addressed block storage with prefix pruning

use std::collections::VecDeque;

use thiserror::Error;

use crate::{
    block::{Block, BlockId},
    miner::MinerId,
};

/// Storage for every block which might still matter to the simulation.
///
/// Blocks are held contiguously in creation order and addressed by
/// `id - base`. Pruning moves `base` forward, dropping the oldest prefix of
/// the arena. Slots past `base` may also be emptied by pruning when the block
/// they hold no longer descends from the base (see [`BlockArena::prune_to`]).
/// Resolving a dropped id is a checked failure, never a dangling reference.
#[derive(Debug, Clone)]
pub struct BlockArena {
    /// Id of the oldest retained block, which always occupies `slots[0]`.
    base: BlockId,
    slots: VecDeque<Option<Block>>,
    /// Maximum height of any block ever appended.
    max_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    #[error("block {0} has been pruned")]
    Pruned(BlockId),
    #[error("block {0} has not been created")]
    Unknown(BlockId),
    #[error("genesis block {0} has no parent")]
    NoParent(BlockId),
    #[error("block {ancestor} is not an ancestor of block {descendant}")]
    NotAncestor {
        ancestor: BlockId,
        descendant: BlockId,
    },
}

impl BlockArena {
    /// Creates an arena holding only the genesis block.
    pub fn new() -> Self {
        let genesis = Block::genesis();

        BlockArena {
            base: genesis.id,
            slots: VecDeque::from([Some(genesis)]),
            max_height: 0,
        }
    }

    /// Id of the oldest retained block.
    #[inline]
    pub fn base(&self) -> BlockId {
        self.base
    }

    /// Id which will be assigned to the next appended block.
    #[inline]
    pub fn next_id(&self) -> BlockId {
        BlockId(self.base.0 + self.slots.len() as u64)
    }

    /// Maximum height of any block ever appended, including pruned ones.
    #[inline]
    pub fn max_height(&self) -> u64 {
        self.max_height
    }

    /// Number of blocks currently retained.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Always false, since the base block is never dropped.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns the block with the given id, if it is still retained.
    #[inline]
    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.block(id).ok()
    }

    /// Returns the block with the given id, or the reason it can't be
    /// resolved.
    pub fn block(&self, id: BlockId) -> Result<&Block, ArenaError> {
        if id < self.base {
            return Err(ArenaError::Pruned(id));
        }

        match self.slots.get((id.0 - self.base.0) as usize) {
            None => Err(ArenaError::Unknown(id)),
            Some(None) => Err(ArenaError::Pruned(id)),
            Some(Some(block)) => Ok(block),
        }
    }

    #[inline]
    pub fn is_retained(&self, id: BlockId) -> bool {
        self.get(id).is_some()
    }

    #[inline]
    pub fn height_of(&self, id: BlockId) -> Option<u64> {
        self.get(id).map(|block| block.height)
    }

    /// Returns the parent of the block with the given id.
    pub fn parent_of(&self, id: BlockId) -> Result<BlockId, ArenaError> {
        self.block(id)?.parent.ok_or(ArenaError::NoParent(id))
    }

    /// Appends a new block mined by `miner` on top of `parent`, returning
    /// the new block's id.
    pub fn append(
        &mut self,
        parent: BlockId,
        miner: MinerId,
        discovered_at: f64,
    ) -> Result<BlockId, ArenaError> {
        let height = self.block(parent)?.height + 1;
        let id = self.next_id();

        self.slots.push_back(Some(Block {
            id,
            parent: Some(parent),
            height,
            miner: Some(miner),
            discovered_at,
        }));
        self.max_height = self.max_height.max(height);

        Ok(id)
    }

    /// Returns the ancestor of `id` at the given height, or `id` itself if it
    /// is not above that height.
    pub fn ancestor_at(
        &self,
        id: BlockId,
        height: u64,
    ) -> Result<BlockId, ArenaError> {
        let mut block = self.block(id)?;
        while block.height > height {
            block = self.block(self.parent_of(block.id)?)?;
        }

        Ok(block.id)
    }

    /// Returns the most recent block which every block in `ids` descends
    /// from (a block descends from itself). Returns the base block when `ids`
    /// is empty.
    ///
    /// All ids are first walked down to the lowest height among them, then
    /// walked down together until they coincide.
    pub fn common_ancestor<I>(&self, ids: I) -> Result<BlockId, ArenaError>
    where
        I: IntoIterator<Item = BlockId>,
    {
        let mut cursors: Vec<BlockId> = ids.into_iter().collect();
        cursors.sort_unstable();
        cursors.dedup();

        let mut min_height = u64::MAX;
        for &id in cursors.iter() {
            min_height = min_height.min(self.block(id)?.height);
        }

        for cursor in cursors.iter_mut() {
            *cursor = self.ancestor_at(*cursor, min_height)?;
        }
        cursors.sort_unstable();
        cursors.dedup();

        while cursors.len() > 1 {
            for cursor in cursors.iter_mut() {
                *cursor = self.parent_of(*cursor)?;
            }
            cursors.sort_unstable();
            cursors.dedup();
        }

        Ok(cursors.first().copied().unwrap_or(self.base))
    }

    /// Number of blocks abandoned when switching from `old_tip` to
    /// `new_tip`, i.e. the distance from `old_tip` down to the common
    /// ancestor of both.
    pub fn reorg_depth(
        &self,
        old_tip: BlockId,
        new_tip: BlockId,
    ) -> Result<u64, ArenaError> {
        let fork = self.common_ancestor([old_tip, new_tip])?;

        Ok(self.block(old_tip)?.height - self.block(fork)?.height)
    }

    /// Returns the blocks on the path from `descendant` down to `ancestor`,
    /// newest first, including `descendant` and excluding `ancestor`.
    pub fn branch(
        &self,
        descendant: BlockId,
        ancestor: BlockId,
    ) -> Result<Vec<&Block>, ArenaError> {
        let floor = self.block(ancestor)?.height;

        let mut branch = vec![];
        let mut block = self.block(descendant)?;
        while block.height > floor {
            branch.push(block);
            block = self.block(self.parent_of(block.id)?)?;
        }

        if block.id != ancestor {
            return Err(ArenaError::NotAncestor { ancestor, descendant });
        }

        Ok(branch)
    }

    /// Makes `new_base` the oldest retained block, returning how many blocks
    /// were discarded.
    ///
    /// Every block created before `new_base` is dropped. Retained blocks
    /// which do not descend from `new_base` are dropped too: once the base
    /// has moved past their fork point they can never be reached again.
    pub fn prune_to(&mut self, new_base: BlockId) -> Result<usize, ArenaError> {
        self.block(new_base)?;
        if new_base == self.base {
            return Ok(0);
        }

        let prefix = (new_base.0 - self.base.0) as usize;
        let mut discarded =
            self.slots.drain(..prefix).filter(Option::is_some).count();
        self.base = new_base;

        // Parents always precede their children, so one pass suffices.
        for i in 1..self.slots.len() {
            let parent = match &self.slots[i] {
                Some(block) => block.parent,
                None => continue,
            };

            let attached = match parent {
                Some(parent) if parent >= self.base => self.slots
                    [(parent.0 - self.base.0) as usize]
                    .is_some(),
                _ => false,
            };

            if !attached {
                self.slots[i] = None;
                discarded += 1;
            }
        }

        Ok(discarded)
    }

    /// Iterates over all retained blocks in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.slots.iter().flatten()
    }
}

impl Default for BlockArena {
    fn default() -> Self {
        Self::new()
    }
}
