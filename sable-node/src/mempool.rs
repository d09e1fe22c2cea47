//! Transaction memory pool with ancestor-fee indexing.
//!
//! The assembler needs three things from the pool: primary lookup,
//! iteration ordered by ancestor fee score, and knowledge of in-pool
//! ancestors and descendants. A `BTreeSet` of score keys stands in for
//! the multi-index container of the original design; "modify in place"
//! becomes remove-key, update, insert-key.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::{debug, warn};

use sable_core::amount::Amount;
use sable_core::hashes::Hash256;
use sable_core::transaction::Transaction;

/// Pool-local entry handle, also the deterministic tie-breaker in the
/// score order.
pub type EntryId = u64;

/// A pending transaction with its cached ancestor aggregates.
#[derive(Debug, Clone)]
pub struct MemPoolEntry {
    pub id: EntryId,
    pub tx: Transaction,
    pub txid: Hash256,
    pub fee: Amount,
    /// Virtual size (weight / 4, rounded up).
    pub size: usize,
    pub sigop_cost: i64,
    /// Direct in-pool parents and children.
    pub parents: HashSet<EntryId>,
    pub children: HashSet<EntryId>,
    /// Aggregates over the entry and all its in-pool ancestors.
    pub count_with_ancestors: usize,
    pub size_with_ancestors: usize,
    pub fees_with_ancestors: Amount,
    pub sigops_with_ancestors: i64,
}

impl MemPoolEntry {
    fn score_key(&self) -> ScoreKey {
        ScoreKey {
            fees: self.fees_with_ancestors,
            size: self.size_with_ancestors as u64,
            id: self.id,
        }
    }
}

/// Ordering key: ancestor fee rate descending, entry id ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreKey {
    pub fees: Amount,
    pub size: u64,
    pub id: EntryId,
}

impl Ord for ScoreKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // a/b vs c/d compared as a*d vs c*b, higher rate first
        let left = self.fees as i128 * other.size as i128;
        let right = other.fees as i128 * self.size as i128;
        right.cmp(&left).then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for ScoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Read-only surface the block assembler consumes. The caller holds
/// whatever locks keep the snapshot stable for the duration of one
/// assembly.
pub trait MempoolView {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry ids in ancestor-score order (best first).
    fn ids_by_ancestor_score(&self) -> Vec<EntryId>;

    fn entry(&self, id: EntryId) -> Option<&MemPoolEntry>;

    /// Transitive in-pool ancestors, excluding the entry itself.
    fn ancestors_of(&self, id: EntryId) -> HashSet<EntryId>;

    /// Transitive in-pool descendants, excluding the entry itself.
    fn descendants_of(&self, id: EntryId) -> HashSet<EntryId>;
}

/// The pool itself.
#[derive(Debug, Default)]
pub struct TxMemPool {
    entries: HashMap<EntryId, MemPoolEntry>,
    by_txid: HashMap<Hash256, EntryId>,
    by_score: BTreeSet<ScoreKey>,
    next_id: EntryId,
}

impl TxMemPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transaction with its fee and sigop cost. Parents are inferred
    /// from inputs spending other pool members.
    pub fn add(&mut self, tx: Transaction, fee: Amount, sigop_cost: i64) -> Option<EntryId> {
        let txid = tx.txid();
        if self.by_txid.contains_key(&txid) {
            warn!("transaction {txid} already in mempool");
            return None;
        }

        let parents: HashSet<EntryId> = tx
            .vin
            .iter()
            .filter_map(|input| self.by_txid.get(&input.prevout.txid).copied())
            .collect();

        let id = self.next_id;
        self.next_id += 1;

        let size = tx.weight().div_ceil(4);
        let mut entry = MemPoolEntry {
            id,
            txid,
            fee,
            size,
            sigop_cost,
            parents: parents.clone(),
            children: HashSet::new(),
            count_with_ancestors: 1,
            size_with_ancestors: size,
            fees_with_ancestors: fee,
            sigops_with_ancestors: sigop_cost,
            tx,
        };

        // aggregate over the full ancestor closure
        let ancestors = self.closure(&parents, |e| &e.parents);
        for ancestor_id in &ancestors {
            let ancestor = &self.entries[ancestor_id];
            entry.count_with_ancestors += 1;
            entry.size_with_ancestors += ancestor.size;
            entry.fees_with_ancestors += ancestor.fee;
            entry.sigops_with_ancestors += ancestor.sigop_cost;
        }

        for parent_id in &parents {
            if let Some(parent) = self.entries.get_mut(parent_id) {
                parent.children.insert(id);
            }
        }

        self.by_score.insert(entry.score_key());
        self.by_txid.insert(txid, id);
        self.entries.insert(id, entry);
        debug!("mempool accepted {txid} as entry {id}");
        Some(id)
    }

    /// Remove transactions confirmed by a block, fixing the ancestor
    /// aggregates of what stays behind.
    pub fn remove_for_block(&mut self, txids: &[Hash256]) {
        for txid in txids {
            let Some(id) = self.by_txid.remove(txid) else { continue };
            let Some(entry) = self.entries.remove(&id) else { continue };
            self.by_score.remove(&entry.score_key());

            for parent_id in &entry.parents {
                if let Some(parent) = self.entries.get_mut(parent_id) {
                    parent.children.remove(&id);
                }
            }
            // descendants lose this ancestor's contribution
            let descendants = self.closure(&entry.children, |e| &e.children);
            for descendant_id in descendants {
                if let Some(descendant) = self.entries.get_mut(&descendant_id) {
                    let old_key = descendant.score_key();
                    descendant.count_with_ancestors -= 1;
                    descendant.size_with_ancestors -= entry.size;
                    descendant.fees_with_ancestors -= entry.fee;
                    descendant.sigops_with_ancestors -= entry.sigop_cost;
                    descendant.parents.remove(&id);
                    let new_key = descendant.score_key();
                    self.by_score.remove(&old_key);
                    self.by_score.insert(new_key);
                }
            }
        }
    }

    pub fn get_by_txid(&self, txid: &Hash256) -> Option<&MemPoolEntry> {
        self.by_txid.get(txid).and_then(|id| self.entries.get(id))
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.by_txid.contains_key(txid)
    }

    fn closure(
        &self,
        seeds: &HashSet<EntryId>,
        step: impl Fn(&MemPoolEntry) -> &HashSet<EntryId>,
    ) -> HashSet<EntryId> {
        let mut seen: HashSet<EntryId> = HashSet::new();
        let mut stack: Vec<EntryId> = seeds.iter().copied().collect();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(entry) = self.entries.get(&id) {
                for next in step(entry) {
                    if !seen.contains(next) {
                        stack.push(*next);
                    }
                }
            }
        }
        seen
    }
}

impl MempoolView for TxMemPool {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn ids_by_ancestor_score(&self) -> Vec<EntryId> {
        self.by_score.iter().map(|key| key.id).collect()
    }

    fn entry(&self, id: EntryId) -> Option<&MemPoolEntry> {
        self.entries.get(&id)
    }

    fn ancestors_of(&self, id: EntryId) -> HashSet<EntryId> {
        match self.entries.get(&id) {
            Some(entry) => self.closure(&entry.parents, |e| &e.parents),
            None => HashSet::new(),
        }
    }

    fn descendants_of(&self, id: EntryId) -> HashSet<EntryId> {
        match self.entries.get(&id) {
            Some(entry) => self.closure(&entry.children, |e| &e.children),
            None => HashSet::new(),
        }
    }
}
