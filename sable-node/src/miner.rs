//! Block template assembly.
//!
//! Transactions are picked by the fee rate of their package (the entry and
//! all unconfirmed ancestors). Entries whose ancestors were already placed
//! in the block move to a modified set with recomputed scores; entries
//! proven not to fit land in a failed set so stale cached values are never
//! re-evaluated.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::{debug, info, warn};

use sable_consensus::chain::{BlockId, BlockTree};
use sable_consensus::deployments::{compute_block_version, deployment_active_after};
use sable_consensus::kernel::CoinView;
use sable_consensus::params::{ChainParams, DEPLOYMENT_SEGWIT};
use sable_consensus::pow::next_target;
use sable_consensus::subsidy::pow_subsidy;
use sable_consensus::validation::{check_block, witness_commitment, CheckOptions, ValidationContext};
use sable_core::amount::Amount;
use sable_core::block::{Block, BlockHeader, BLOCK_FLAG_PROOF_OF_STAKE};
use sable_core::script::{Script, OP_RETURN};
use sable_core::transaction::{OutPoint, Transaction, TxInput, TxOutput, WITNESS_SCALE_FACTOR};
use sable_wallet::{KeyId, StakingWallet};

use crate::error::AssemblyError;
use crate::mempool::{EntryId, MemPoolEntry, MempoolView, ScoreKey};

/// Ceiling of `-blockmaxweight`.
pub const DEFAULT_BLOCK_MAX_WEIGHT: usize = 3_996_000;
/// Sigop budget for a whole block.
pub const MAX_BLOCK_SIGOPS_COST: i64 = 80_000;
/// Default `-blockmintxfee` in satoshis per 1000 virtual bytes.
pub const DEFAULT_BLOCK_MIN_TX_FEE: Amount = 1_000;

const MAX_CONSECUTIVE_FAILURES: usize = 1_000;

/// Assembler knobs, command-line configurable in the embedding node.
#[derive(Debug, Clone)]
pub struct AssemblerOptions {
    pub block_max_weight: usize,
    /// Satoshis per 1000 virtual bytes below which packages are not mined.
    pub block_min_fee_rate: Amount,
    /// Probe finished PoW templates with the validator.
    pub test_block_validity: bool,
    /// Log the fee rate of every selected transaction.
    pub print_priority: bool,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        AssemblerOptions {
            block_max_weight: DEFAULT_BLOCK_MAX_WEIGHT,
            block_min_fee_rate: DEFAULT_BLOCK_MIN_TX_FEE,
            test_block_validity: true,
            print_priority: false,
        }
    }
}

impl AssemblerOptions {
    /// Keep the weight limit inside sane bounds.
    fn clamped(mut self) -> Self {
        self.block_max_weight = self.block_max_weight.clamp(4_000, DEFAULT_BLOCK_MAX_WEIGHT);
        self
    }

    fn min_fee_for(&self, size: usize) -> Amount {
        self.block_min_fee_rate * size as Amount / 1_000
    }
}

/// A finished template, fee and sigop cost per transaction alongside.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub block: Block,
    pub tx_fees: Vec<Amount>,
    pub tx_sigops: Vec<i64>,
}

/// Modified-set entry: package totals recomputed as if the ancestors
/// already in the block were free.
#[derive(Debug, Clone, Copy)]
struct ModifiedEntry {
    size: usize,
    fees: Amount,
    sigops: i64,
}

impl ModifiedEntry {
    fn key(&self, id: EntryId) -> ScoreKey {
        ScoreKey { fees: self.fees, size: self.size as u64, id }
    }
}

/// Builds one block template per call.
pub struct BlockAssembler<'a> {
    params: &'a ChainParams,
    tree: &'a BlockTree,
    coins: &'a dyn CoinView,
    options: AssemblerOptions,

    in_block: HashSet<EntryId>,
    block_weight: usize,
    block_sigops: i64,
    block_tx_count: usize,
    fees: Amount,
    include_witness: bool,
    height: i32,
    lock_time_cutoff: i64,
}

impl<'a> BlockAssembler<'a> {
    pub fn new(
        params: &'a ChainParams,
        tree: &'a BlockTree,
        coins: &'a dyn CoinView,
        options: AssemblerOptions,
    ) -> Self {
        BlockAssembler {
            params,
            tree,
            coins,
            options: options.clamped(),
            in_block: HashSet::new(),
            block_weight: 0,
            block_sigops: 0,
            block_tx_count: 0,
            fees: 0,
            include_witness: false,
            height: 0,
            lock_time_cutoff: 0,
        }
    }

    fn reset(&mut self) {
        self.in_block.clear();
        // reserved room for the coinbase
        self.block_weight = 4_000;
        self.block_sigops = 400;
        self.block_tx_count = 0;
        self.fees = 0;
        self.include_witness = false;
    }

    /// Create a new block template on top of `prev`.
    ///
    /// With a wallet this builds a proof-of-stake template; `Ok(None)`
    /// means no kernel was found this round and the staker should sleep.
    /// Without a wallet the template is proof-of-work paying
    /// `script_pubkey`.
    pub fn create_new_block(
        &mut self,
        mempool: &dyn MempoolView,
        prev: BlockId,
        script_pubkey: &Script,
        mut wallet: Option<&mut StakingWallet>,
        destination: Option<KeyId>,
        now: i64,
    ) -> Result<Option<(BlockTemplate, Amount)>, AssemblyError> {
        self.reset();

        let mut block = Block::new(BlockHeader::null());
        let mut tx_fees: Vec<Amount> = vec![-1]; // coinbase slot, fixed up below
        let mut tx_sigops: Vec<i64> = vec![-1];

        self.height = self.tree.get(prev).height + 1;
        block.header.version = compute_block_version(self.tree, Some(prev), self.params);
        block.header.prev_hash = self.tree.get(prev).hash;
        block.header.time = now as u32;
        self.lock_time_cutoff = self.tree.median_time_past(prev);
        self.include_witness =
            deployment_active_after(self.tree, Some(prev), self.params, DEPLOYMENT_SEGWIT);

        // placeholder for the coinbase
        block.txs.push(Transaction::new());
        self.add_package_txs(mempool, &mut block, &mut tx_fees, &mut tx_sigops, now);

        // Create coinbase transaction.
        let mut coinbase = Transaction::new();
        coinbase.time = block.header.time;
        coinbase.vin.push(TxInput::new(OutPoint::null()));
        coinbase.vout.push(TxOutput::empty());

        if let Some(wallet) = wallet.as_deref_mut() {
            // attempt to find a coinstake
            block.header.bits = next_target(self.tree, Some(prev), self.params, true);
            let search_time = now & !(self.params.stake_timestamp_mask as i64);
            let mut coinstake = None;
            if search_time > wallet.last_coinstake_search_time {
                match sable_wallet::staking::create_coinstake(
                    wallet,
                    self.tree,
                    self.coins,
                    self.params,
                    prev,
                    block.header.bits,
                    1,
                    destination,
                    self.fees,
                    now,
                ) {
                    Ok(found) => {
                        coinstake = found.filter(|tx| {
                            tx.time as i64 >= self.tree.median_time_past(prev) + 1
                        });
                    }
                    Err(e) => warn!("coinstake search failed: {e}"),
                }
                wallet.last_coinstake_search_interval =
                    search_time - wallet.last_coinstake_search_time;
                wallet.last_coinstake_search_time = search_time;
            }
            let Some(coinstake) = coinstake else {
                return Ok(None); // no point continuing without a coinstake
            };
            block.header.time = coinstake.time;
            block.header.flags = BLOCK_FLAG_PROOF_OF_STAKE;
            coinbase.time = coinstake.time;
            tx_fees.insert(1, 0);
            tx_sigops.insert(
                1,
                coinstake
                    .vout
                    .iter()
                    .map(|out| out.script_pubkey.count_sigops() as i64)
                    .sum::<i64>()
                    * WITNESS_SCALE_FACTOR as i64,
            );
            block.txs.insert(1, coinstake);
        } else {
            block.header.bits = next_target(self.tree, Some(prev), self.params, false);
            coinbase.vout[0] =
                TxOutput::new(self.fees + pow_subsidy(self.height, self.params), script_pubkey.clone());
        }

        // Height first in the coinbase script.
        let mut script_sig = Script::new();
        script_sig.push_int(self.height as i64).push_opcode(sable_core::script::OP_0);
        coinbase.vin[0].script_sig = script_sig;
        block.txs[0] = coinbase;

        if self.include_witness {
            inject_witness_commitment(&mut block);
        }

        tx_fees[0] = -self.fees;
        tx_sigops[0] = (block.txs[0].vin[0].script_sig.count_sigops()
            + block.txs[0]
                .vout
                .iter()
                .map(|out| out.script_pubkey.count_sigops())
                .sum::<usize>()) as i64
            * WITNESS_SCALE_FACTOR as i64;

        // Fill in header
        block.header.time = std::cmp::max(
            self.tree.median_time_past(prev) + 1,
            max_transaction_time(&block),
        ) as u32;
        if !block.is_proof_of_stake() {
            update_time(&mut block, self.params, self.tree, prev, now);
        }
        block.header.merkle_root = block.merkle_root();

        info!(
            "create_new_block: weight {} txs {} fees {} sigops {}",
            self.block_weight, self.block_tx_count, self.fees, self.block_sigops
        );

        if !block.is_proof_of_stake() && self.options.test_block_validity {
            let ctx = ValidationContext {
                params: self.params,
                tree: self.tree,
                coins: self.coins,
                now,
            };
            check_block(
                &block,
                Some(prev),
                &ctx,
                CheckOptions { check_pow: false, check_merkle: false },
            )
            .map_err(|e| AssemblyError::ValidityProbeFailed(e.to_string()))?;
        }

        let fees = self.fees;
        Ok(Some((BlockTemplate { block, tx_fees, tx_sigops }, fees)))
    }

    /// Whether a package still fits. An exact landing on either budget is
    /// accepted; only genuine overflow is rejected.
    fn test_package(&self, package_size: usize, package_sigops: i64) -> bool {
        if self.block_weight + WITNESS_SCALE_FACTOR * package_size
            > self.options.block_max_weight
        {
            return false;
        }
        self.block_sigops + package_sigops <= MAX_BLOCK_SIGOPS_COST
    }

    /// Transaction-level checks: finality, premature witness, and the
    /// timestamp rule that nothing in a block postdates it.
    fn test_package_transactions(
        &self,
        mempool: &dyn MempoolView,
        package: &[EntryId],
        block_time: i64,
        now: i64,
    ) -> bool {
        package.iter().all(|id| {
            let Some(entry) = mempool.entry(*id) else { return false };
            if !entry.tx.is_final(self.height, self.lock_time_cutoff) {
                return false;
            }
            if !self.include_witness && entry.tx.has_witness() {
                return false;
            }
            let tx_time = entry.tx.time as i64;
            tx_time <= now && (block_time == 0 || tx_time <= block_time)
        })
    }

    fn add_to_block(
        &mut self,
        entry: &MemPoolEntry,
        block: &mut Block,
        tx_fees: &mut Vec<Amount>,
        tx_sigops: &mut Vec<i64>,
    ) {
        block.txs.push(entry.tx.clone());
        tx_fees.push(entry.fee);
        tx_sigops.push(entry.sigop_cost);
        self.block_weight += entry.tx.weight();
        self.block_sigops += entry.sigop_cost;
        self.block_tx_count += 1;
        self.fees += entry.fee;
        self.in_block.insert(entry.id);

        if self.options.print_priority {
            info!(
                "fee rate {} sat/kvB txid {}",
                entry.fee * 1_000 / entry.size.max(1) as Amount,
                entry.txid
            );
        }
    }

    fn add_package_txs(
        &mut self,
        mempool: &dyn MempoolView,
        block: &mut Block,
        tx_fees: &mut Vec<Amount>,
        tx_sigops: &mut Vec<i64>,
        now: i64,
    ) {
        let order = mempool.ids_by_ancestor_score();
        let mut cursor = 0usize;

        let mut modified: HashMap<EntryId, ModifiedEntry> = HashMap::new();
        let mut modified_index: BTreeSet<ScoreKey> = BTreeSet::new();
        let mut failed: HashSet<EntryId> = HashSet::new();
        let mut consecutive_failed = 0usize;
        let block_time = block.header.time as i64;

        while cursor < order.len() || !modified.is_empty() {
            // Skip primary entries that are stale: already placed, already
            // re-scored in the modified set, or known not to fit.
            if cursor < order.len() {
                let id = order[cursor];
                if self.in_block.contains(&id)
                    || modified.contains_key(&id)
                    || failed.contains(&id)
                {
                    cursor += 1;
                    continue;
                }
            }

            // Pick the better of the next primary entry and the best
            // modified entry.
            let best_modified = modified_index.iter().next().copied();
            let (id, using_modified) = if cursor >= order.len() {
                match best_modified {
                    Some(key) => (key.id, true),
                    None => break,
                }
            } else {
                let primary_id = order[cursor];
                let primary_entry = match mempool.entry(primary_id) {
                    Some(entry) => entry,
                    None => {
                        cursor += 1;
                        continue;
                    }
                };
                let primary_key = ScoreKey {
                    fees: primary_entry.fees_with_ancestors,
                    size: primary_entry.size_with_ancestors as u64,
                    id: primary_id,
                };
                match best_modified {
                    Some(key) if key < primary_key => (key.id, true),
                    _ => {
                        cursor += 1;
                        (primary_id, false)
                    }
                }
            };

            debug_assert!(!self.in_block.contains(&id));
            let Some(entry) = mempool.entry(id) else { continue };

            let (package_size, package_fees, package_sigops) = if using_modified {
                let m = modified[&id];
                (m.size, m.fees, m.sigops)
            } else {
                (
                    entry.size_with_ancestors,
                    entry.fees_with_ancestors,
                    entry.sigops_with_ancestors,
                )
            };

            if package_fees < self.options.min_fee_for(package_size) {
                // everything else in the index scores lower
                return;
            }

            if !self.test_package(package_size, package_sigops) {
                if using_modified {
                    // evict so the next-best modified entry can be tried
                    if let Some(m) = modified.remove(&id) {
                        modified_index.remove(&m.key(id));
                    }
                    failed.insert(id);
                }
                consecutive_failed += 1;
                if consecutive_failed > MAX_CONSECUTIVE_FAILURES
                    && self.block_weight > self.options.block_max_weight - 4_000
                {
                    // close to full and nothing fits
                    break;
                }
                continue;
            }

            // Unconfirmed ancestors not yet in the block, plus the entry.
            let mut package: Vec<EntryId> = mempool
                .ancestors_of(id)
                .into_iter()
                .filter(|ancestor| !self.in_block.contains(ancestor))
                .collect();
            package.push(id);

            if !self.test_package_transactions(mempool, &package, block_time, now) {
                if using_modified {
                    if let Some(m) = modified.remove(&id) {
                        modified_index.remove(&m.key(id));
                    }
                    failed.insert(id);
                }
                continue;
            }

            // This package is going in; reset the failure streak.
            consecutive_failed = 0;

            // Parents before children: ancestor count gives a valid order.
            package.sort_by_key(|pkg_id| {
                mempool
                    .entry(*pkg_id)
                    .map(|e| (e.count_with_ancestors, e.id))
                    .unwrap_or((usize::MAX, *pkg_id))
            });
            for pkg_id in &package {
                if let Some(pkg_entry) = mempool.entry(*pkg_id) {
                    self.add_to_block(pkg_entry, block, tx_fees, tx_sigops);
                }
                if let Some(m) = modified.remove(pkg_id) {
                    modified_index.remove(&m.key(*pkg_id));
                }
            }

            // Re-score descendants of everything just added as if those
            // ancestors were free.
            for added in &package {
                for descendant in mempool.descendants_of(*added) {
                    if self.in_block.contains(&descendant) {
                        continue;
                    }
                    let Some(desc_entry) = mempool.entry(descendant) else { continue };
                    let Some(added_entry) = mempool.entry(*added) else { continue };
                    let m = modified.entry(descendant).or_insert_with(|| {
                        ModifiedEntry {
                            size: desc_entry.size_with_ancestors,
                            fees: desc_entry.fees_with_ancestors,
                            sigops: desc_entry.sigops_with_ancestors,
                        }
                    });
                    modified_index.remove(&m.key(descendant));
                    m.size -= added_entry.size;
                    m.fees -= added_entry.fee;
                    m.sigops -= added_entry.sigop_cost;
                    modified_index.insert(m.key(descendant));
                }
            }
        }
    }
}

/// Largest transaction timestamp in the block.
pub fn max_transaction_time(block: &Block) -> i64 {
    block.txs.iter().map(|tx| tx.time as i64).max().unwrap_or(0)
}

/// Advance a PoW template's time toward now; min-difficulty chains re-derive
/// the target since the change can move it.
pub fn update_time(
    block: &mut Block,
    params: &ChainParams,
    tree: &BlockTree,
    prev: BlockId,
    now: i64,
) -> i64 {
    let old_time = block.header.time as i64;
    let new_time = std::cmp::max(tree.median_time_past(prev) + 1, now);
    if old_time < new_time {
        block.header.time = new_time as u32;
    }
    if params.pow_allow_min_difficulty_blocks {
        block.header.bits =
            next_target(tree, Some(prev), params, block.is_proof_of_stake());
    }
    new_time - old_time
}

/// Bump the extra nonce in the coinbase script and refresh the merkle root.
pub fn increment_extra_nonce(block: &mut Block, prev_height: i32, extra_nonce: &mut u32) {
    *extra_nonce += 1;
    let mut script_sig = Script::new();
    script_sig
        .push_int((prev_height + 1) as i64)
        .push_int(*extra_nonce as i64);
    block.txs[0].vin[0].script_sig = script_sig;
    block.header.merkle_root = block.merkle_root();
}

/// Append the witness commitment output to the coinbase and set its nonce.
fn inject_witness_commitment(block: &mut Block) {
    let nonce = vec![0u8; 32];
    block.txs[0].vin[0].witness = vec![nonce.clone()];
    let commitment = witness_commitment(&block.witness_merkle_root(), &nonce);

    let mut script = Script::new();
    script.push_opcode(OP_RETURN);
    let mut payload = vec![0xaa, 0x21, 0xa9, 0xed];
    payload.extend_from_slice(commitment.as_bytes());
    script.push_data(&payload);
    block.txs[0].vout.push(TxOutput::new(0, script));

    debug!("witness commitment {commitment}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mempool::TxMemPool;
    use sable_consensus::kernel::Coin;
    use sable_consensus::params::ChainParams;
    use sable_core::hashes::Hash256;
    use std::collections::HashMap as StdHashMap;

    struct MapCoins(StdHashMap<OutPoint, Coin>);

    impl CoinView for MapCoins {
        fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin> {
            self.0.get(outpoint).cloned()
        }
    }

    fn regtest() -> ChainParams {
        ChainParams::for_network("regtest").unwrap()
    }

    /// A short regtest chain; returns the coin view funding `n` spendable
    /// outputs of one million satoshis each.
    fn fixture(n: usize) -> (ChainParams, BlockTree, BlockId, MapCoins, Vec<OutPoint>) {
        let params = regtest();
        let mut tree = BlockTree::new();
        let mut prev = None;
        let mut id = 0;
        for i in 0..12u32 {
            let mut header = BlockHeader::null();
            header.version = 1;
            header.time = 1_720_000_000 + i * 64;
            header.bits = 0x207fffff;
            header.nonce = i;
            if let Some(p) = prev {
                header.prev_hash = tree.get(p).hash;
            }
            id = tree.insert(&header, prev, 0, Hash256::from_bytes([1; 32]));
            prev = Some(id);
        }
        let mut coins = StdHashMap::new();
        let mut outpoints = Vec::new();
        for i in 0..n {
            let outpoint = OutPoint::new(Hash256::from_bytes([0x40 + i as u8; 32]), 0);
            coins.insert(
                outpoint,
                Coin {
                    value: 1_000_000,
                    script_pubkey: Script::new_p2pkh(&[i as u8; 20]),
                    height: 1,
                    is_coinbase: false,
                    is_coinstake: false,
                },
            );
            outpoints.push(outpoint);
        }
        (params, tree, id, MapCoins(coins), outpoints)
    }

    fn spending_tx(prevouts: &[OutPoint], value_out: Amount, tag: u8) -> Transaction {
        let mut tx = Transaction::new();
        tx.time = 1_720_000_000;
        for prevout in prevouts {
            tx.vin.push(TxInput::new(*prevout));
        }
        tx.vout.push(TxOutput::new(value_out, Script::new_p2pkh(&[tag; 20])));
        tx
    }

    fn assemble(
        params: &ChainParams,
        tree: &BlockTree,
        coins: &MapCoins,
        tip: BlockId,
        pool: &TxMemPool,
        options: AssemblerOptions,
    ) -> (BlockTemplate, Amount) {
        let mut assembler = BlockAssembler::new(params, tree, coins, options);
        let script = Script::new_p2pkh(&[0xee; 20]);
        assembler
            .create_new_block(pool, tip, &script, None, None, 1_725_000_000)
            .unwrap()
            .expect("PoW templates always build")
    }

    #[test]
    fn empty_mempool_yields_coinbase_only_block() {
        let (params, tree, tip, coins, _) = fixture(0);
        let pool = TxMemPool::new();
        let (template, fees) =
            assemble(&params, &tree, &coins, tip, &pool, AssemblerOptions::default());
        assert_eq!(fees, 0);
        assert_eq!(template.block.txs.len(), 1);
        assert!(template.block.txs[0].is_coinbase());
        assert_eq!(template.tx_fees[0], 0);
        // coinbase pays the PoW subsidy
        assert_eq!(
            template.block.txs[0].value_out(),
            pow_subsidy(tree.get(tip).height + 1, &params)
        );
        assert_eq!(template.block.header.merkle_root, template.block.merkle_root());
    }

    #[test]
    fn selects_by_fee_rate_and_collects_fees() {
        let (params, tree, tip, coins, outpoints) = fixture(3);
        let mut pool = TxMemPool::new();
        pool.add(spending_tx(&outpoints[0..1], 900_000, 1), 100_000, 4);
        pool.add(spending_tx(&outpoints[1..2], 995_000, 2), 5_000, 4);
        pool.add(spending_tx(&outpoints[2..3], 950_000, 3), 50_000, 4);

        let (template, fees) =
            assemble(&params, &tree, &coins, tip, &pool, AssemblerOptions::default());
        assert_eq!(fees, 155_000);
        assert_eq!(template.block.txs.len(), 4);
        // best fee rate right after the coinbase
        assert_eq!(template.block.txs[1].vout[0].value, 900_000);
        assert_eq!(template.tx_fees[0], -155_000);
    }

    #[test]
    fn ancestors_enter_before_descendants() {
        let (params, tree, tip, coins, outpoints) = fixture(1);
        let mut pool = TxMemPool::new();
        let parent = spending_tx(&outpoints[0..1], 999_000, 1);
        let parent_txid = parent.txid();
        pool.add(parent, 1_000, 4);
        // high-fee child drags its low-fee parent in
        let child = spending_tx(&[OutPoint::new(parent_txid, 0)], 899_000, 2);
        pool.add(child, 100_000, 4);

        let (template, fees) =
            assemble(&params, &tree, &coins, tip, &pool, AssemblerOptions::default());
        assert_eq!(fees, 101_000);
        assert_eq!(template.block.txs.len(), 3);
        assert_eq!(template.block.txs[1].txid(), parent_txid);
    }

    #[test]
    fn min_fee_rate_cuts_off_cheap_packages() {
        let (params, tree, tip, coins, outpoints) = fixture(2);
        let mut pool = TxMemPool::new();
        pool.add(spending_tx(&outpoints[0..1], 999_999, 1), 1, 4); // ~0 sat/vB
        pool.add(spending_tx(&outpoints[1..2], 900_000, 2), 100_000, 4);

        let (template, fees) =
            assemble(&params, &tree, &coins, tip, &pool, AssemblerOptions::default());
        assert_eq!(fees, 100_000);
        assert_eq!(template.block.txs.len(), 2);
    }

    #[test]
    fn weight_limit_is_respected() {
        let (params, tree, tip, coins, outpoints) = fixture(2);
        let mut pool = TxMemPool::new();
        pool.add(spending_tx(&outpoints[0..1], 900_000, 1), 100_000, 4);
        pool.add(spending_tx(&outpoints[1..2], 900_000, 2), 100_000, 4);

        // minimum weight leaves room for the coinbase only
        let options = AssemblerOptions { block_max_weight: 0, ..Default::default() };
        let (template, fees) = assemble(&params, &tree, &coins, tip, &pool, options);
        assert_eq!(template.block.txs.len(), 1);
        assert_eq!(fees, 0);
    }

    #[test]
    fn sigop_budget_is_respected() {
        let (params, tree, tip, coins, outpoints) = fixture(2);
        let mut pool = TxMemPool::new();
        pool.add(spending_tx(&outpoints[0..1], 900_000, 1), 100_000, MAX_BLOCK_SIGOPS_COST);
        pool.add(spending_tx(&outpoints[1..2], 900_000, 2), 100_000, 4);

        let (template, fees) =
            assemble(&params, &tree, &coins, tip, &pool, AssemblerOptions::default());
        // the sigop-heavy package is skipped, the other fits
        assert_eq!(template.block.txs.len(), 2);
        assert_eq!(fees, 100_000);
    }

    #[test]
    fn late_timestamps_are_left_out() {
        let (params, tree, tip, coins, outpoints) = fixture(1);
        let mut pool = TxMemPool::new();
        let mut tx = spending_tx(&outpoints[0..1], 900_000, 1);
        tx.time = 1_999_999_999; // far past "now"
        pool.add(tx, 100_000, 4);

        let (template, fees) =
            assemble(&params, &tree, &coins, tip, &pool, AssemblerOptions::default());
        assert_eq!(template.block.txs.len(), 1);
        assert_eq!(fees, 0);
    }

    #[test]
    fn witness_commitment_present_when_segwit_active() {
        // regtest buries segwit at height 1
        let (params, tree, tip, coins, _) = fixture(0);
        let pool = TxMemPool::new();
        let (template, _) =
            assemble(&params, &tree, &coins, tip, &pool, AssemblerOptions::default());
        let commitment =
            sable_consensus::validation::find_witness_commitment(&template.block.txs[0]);
        assert!(commitment.is_some());
    }

    #[test]
    fn template_time_clears_median_time_past() {
        let (params, tree, tip, coins, _) = fixture(0);
        let pool = TxMemPool::new();
        let (template, _) =
            assemble(&params, &tree, &coins, tip, &pool, AssemblerOptions::default());
        assert!(
            (template.block.header.time as i64) > tree.median_time_past(tip)
        );
    }

    #[test]
    fn extra_nonce_rewrites_coinbase_and_merkle() {
        let (params, tree, tip, coins, _) = fixture(0);
        let pool = TxMemPool::new();
        let (mut template, _) =
            assemble(&params, &tree, &coins, tip, &pool, AssemblerOptions::default());
        let before = template.block.header.merkle_root;
        let mut extra_nonce = 0;
        increment_extra_nonce(&mut template.block, tree.get(tip).height, &mut extra_nonce);
        assert_eq!(extra_nonce, 1);
        assert_ne!(template.block.header.merkle_root, before);
        assert_eq!(template.block.header.merkle_root, template.block.merkle_root());
    }
}
