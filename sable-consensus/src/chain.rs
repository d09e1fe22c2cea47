//! In-memory block index.
//!
//! The chain manager owns a [`BlockTree`] arena; consensus code holds plain
//! [`BlockId`] handles into it and never owning references. The `prev`
//! pointer forms a DAG with a unique predecessor, so all walks here are
//! simple iterative loops.

use std::collections::HashMap;

use primitive_types::U256;

use sable_core::arith::compact_to_target;
use sable_core::block::{BlockHeader, BLOCK_FLAG_PROOF_OF_STAKE};
use sable_core::hashes::Hash256;

/// Handle into the block index arena.
pub type BlockId = u32;

/// One node of the block DAG.
#[derive(Debug, Clone)]
pub struct BlockIndex {
    pub hash: Hash256,
    pub prev: Option<BlockId>,
    pub height: i32,
    pub version: i32,
    pub time: u32,
    pub bits: u32,
    pub flags: u32,
    /// Cumulative work up to and including this block.
    pub chain_work: U256,
    /// Modifier mixed into kernel hashes of blocks building on this one.
    pub stake_modifier: Hash256,
}

impl BlockIndex {
    pub fn is_proof_of_stake(&self) -> bool {
        self.flags & BLOCK_FLAG_PROOF_OF_STAKE != 0
    }

    pub fn block_time(&self) -> i64 {
        self.time as i64
    }
}

/// Work contributed by a block with the given compact target.
pub fn block_proof(bits: u32) -> U256 {
    let (target, negative, overflow) = compact_to_target(bits);
    if negative || overflow || target.is_zero() {
        return U256::zero();
    }
    // ~target / (target + 1) + 1, the usual expected-hash-count estimate
    (!target / (target + U256::one())) + U256::one()
}

/// Arena of block indices with hash lookup and an owner-maintained tip.
#[derive(Debug, Default)]
pub struct BlockTree {
    nodes: Vec<BlockIndex>,
    by_hash: HashMap<Hash256, BlockId>,
    tip: Option<BlockId>,
}

impl BlockTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert a connected header. Height and cumulative work are derived
    /// from the predecessor; the stake modifier is supplied by the caller
    /// (it depends on the kernel for PoS blocks).
    pub fn insert(
        &mut self,
        header: &BlockHeader,
        prev: Option<BlockId>,
        flags: u32,
        stake_modifier: Hash256,
    ) -> BlockId {
        let hash = header.hash();
        if let Some(&existing) = self.by_hash.get(&hash) {
            return existing;
        }
        let (height, parent_work) = match prev {
            Some(p) => {
                let parent = &self.nodes[p as usize];
                (parent.height + 1, parent.chain_work)
            }
            None => (0, U256::zero()),
        };
        let id = self.nodes.len() as BlockId;
        self.nodes.push(BlockIndex {
            hash,
            prev,
            height,
            version: header.version,
            time: header.time,
            bits: header.bits,
            flags,
            chain_work: parent_work + block_proof(header.bits),
            stake_modifier,
        });
        self.by_hash.insert(hash, id);
        id
    }

    pub fn get(&self, id: BlockId) -> &BlockIndex {
        &self.nodes[id as usize]
    }

    pub fn lookup(&self, hash: &Hash256) -> Option<BlockId> {
        self.by_hash.get(hash).copied()
    }

    pub fn prev(&self, id: BlockId) -> Option<BlockId> {
        self.nodes[id as usize].prev
    }

    /// The owner's notion of the active tip: the valid chain with the most
    /// cumulative work.
    pub fn tip(&self) -> Option<BlockId> {
        self.tip
    }

    pub fn set_tip(&mut self, id: BlockId) {
        self.tip = Some(id);
    }

    /// Median of the previous 11 block times; 0 for the genesis predecessor.
    pub fn median_time_past(&self, id: BlockId) -> i64 {
        let mut times = Vec::with_capacity(11);
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if times.len() == 11 {
                break;
            }
            let node = self.get(current);
            times.push(node.block_time());
            cursor = node.prev;
        }
        times.sort_unstable();
        times[times.len() / 2]
    }

    /// Walk back to the most recent block of the requested kind, including
    /// `from` itself.
    pub fn last_block_of_kind(&self, from: BlockId, proof_of_stake: bool) -> Option<BlockId> {
        let mut cursor = Some(from);
        while let Some(current) = cursor {
            if self.get(current).is_proof_of_stake() == proof_of_stake {
                return Some(current);
            }
            cursor = self.get(current).prev;
        }
        None
    }

    /// Ancestor of `from` at the given height.
    pub fn ancestor_at_height(&self, from: BlockId, height: i32) -> Option<BlockId> {
        let mut cursor = Some(from);
        while let Some(current) = cursor {
            let node = self.get(current);
            if node.height == height {
                return Some(current);
            }
            if node.height < height {
                return None;
            }
            cursor = node.prev;
        }
        None
    }
}
