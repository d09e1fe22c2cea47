//! Header and block validation.
//!
//! Contextual checks run against the predecessor's index entry; the UTXO
//! view supplies spent outputs for fee and kernel checks. Any failure
//! aborts validation immediately and is reported upward with the offending
//! hash by the caller.

use log::debug;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1};

use sable_core::amount::{money_range, Amount};
use sable_core::arith::compact_to_target;
use sable_core::block::{Block, BlockHeader};
use sable_core::hashes::Hash256;
use sable_core::script::TxoutType;
use sable_core::transaction::{OutPoint, Transaction};

use crate::chain::{BlockId, BlockTree};
use crate::deployments::deployment_active_after;
use crate::error::{ConsensusError, Result};
use crate::kernel::{self, CoinView};
use crate::params::{ChainParams, DEPLOYMENT_SEGWIT};
use crate::policy::future_drift;
use crate::pow::check_proof_of_work;
use crate::subsidy::{pos_subsidy, pow_subsidy};

/// Everything a validation pass needs besides the block itself.
pub struct ValidationContext<'a> {
    pub params: &'a ChainParams,
    pub tree: &'a BlockTree,
    pub coins: &'a dyn CoinView,
    /// Adjusted current time; injected so tests can drive the clock.
    pub now: i64,
}

/// Knobs for the assembler's self-consistency probe.
#[derive(Debug, Clone, Copy)]
pub struct CheckOptions {
    pub check_pow: bool,
    pub check_merkle: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        CheckOptions { check_pow: true, check_merkle: true }
    }
}

/// Magic prefix of the coinbase witness commitment output.
const WITNESS_COMMITMENT_HEADER: [u8; 6] = [0x6a, 0x24, 0xaa, 0x21, 0xa9, 0xed];

/// Structural and contextual header checks.
pub fn check_block_header(
    header: &BlockHeader,
    prev: Option<BlockId>,
    ctx: &ValidationContext<'_>,
) -> Result<()> {
    check_header_with_kind(header, prev, header.is_pos_flag(), true, ctx)
}

fn check_header_with_kind(
    header: &BlockHeader,
    prev: Option<BlockId>,
    proof_of_stake: bool,
    check_pow: bool,
    ctx: &ValidationContext<'_>,
) -> Result<()> {
    if prev.is_none() && header.hash() == ctx.params.genesis_hash {
        return Ok(());
    }

    // 1. Compact target well-formed and at most the kind's active limit.
    let (target, negative, overflow) = compact_to_target(header.bits);
    if negative || overflow || target.is_zero() {
        return Err(ConsensusError::BadHeader(format!("bits {:#010x} malformed", header.bits)));
    }
    let gate_time = prev
        .map(|p| ctx.tree.get(p).block_time())
        .unwrap_or(header.time as i64);
    let limit = if proof_of_stake {
        if ctx.params.is_protocol_v2(gate_time) {
            ctx.params.pos_limit_v2
        } else {
            ctx.params.pos_limit
        }
    } else {
        ctx.params.pow_limit
    };
    if target > limit {
        return Err(ConsensusError::BadHeader(format!(
            "bits {:#010x} above the target limit",
            header.bits
        )));
    }

    // 2. Timestamp window.
    if let Some(p) = prev {
        let median = ctx.tree.median_time_past(p);
        if header.time as i64 <= median {
            return Err(ConsensusError::StaleTime { time: header.time, median });
        }
    }
    if header.time as i64 > future_drift(ctx.now) {
        return Err(ConsensusError::FutureTime { time: header.time });
    }

    // 3. PoS timestamps are quantized by the mask.
    if proof_of_stake && !kernel::check_stake_block_timestamp(ctx.params, header.time as i64) {
        return Err(ConsensusError::BadHeader(format!(
            "PoS block time {:#x} violates the timestamp mask",
            header.time
        )));
    }

    // 4. Only PoW headers prove work.
    if !proof_of_stake && check_pow && !check_proof_of_work(&header.pow_hash(), header.bits, ctx.params) {
        return Err(ConsensusError::BadPoW);
    }

    Ok(())
}

/// Full block validation against its predecessor.
pub fn check_block(
    block: &Block,
    prev: Option<BlockId>,
    ctx: &ValidationContext<'_>,
    options: CheckOptions,
) -> Result<()> {
    let proof_of_stake = block.is_proof_of_stake();
    let height = prev.map(|p| ctx.tree.get(p).height + 1).unwrap_or(0);

    // 1. Header.
    check_header_with_kind(&block.header, prev, proof_of_stake, options.check_pow, ctx)?;

    // 2. Merkle root commits to the transaction list.
    if options.check_merkle && block.merkle_root() != block.header.merkle_root {
        return Err(ConsensusError::BadMerkle);
    }

    // 3. Exactly one coinbase, at index 0.
    if block.txs.is_empty() || !block.txs[0].is_coinbase() {
        return Err(ConsensusError::BadCoinbase("first transaction is not the coinbase".into()));
    }
    for tx in &block.txs[1..] {
        if tx.vin.iter().any(|input| input.prevout.is_null()) {
            return Err(ConsensusError::BadCoinbase("duplicate coinbase".into()));
        }
    }

    if proof_of_stake {
        check_proof_of_stake_block(block, prev, height, ctx)?;
    } else {
        check_proof_of_work_block(block, height, ctx)?;
    }

    // 6. No coinstake outside slot 1.
    for (i, tx) in block.txs.iter().enumerate() {
        if tx.is_coinstake() && i != 1 {
            return Err(ConsensusError::BadCoinstake(format!("coinstake at index {i}")));
        }
    }

    // 7. Witness commitment.
    check_witness_commitment(block, prev, ctx)?;

    // Checkpoint gate.
    if let Some(expected) = ctx.params.checkpoints.get(&height) {
        if block.hash() != *expected {
            return Err(ConsensusError::CheckpointMismatch { height });
        }
    }

    debug!("block {} at height {height} passed validation", block.hash());
    Ok(())
}

fn check_proof_of_stake_block(
    block: &Block,
    prev: Option<BlockId>,
    height: i32,
    ctx: &ValidationContext<'_>,
) -> Result<()> {
    let coinstake = &block.txs[1];

    // The coinbase of a PoS block pays nothing.
    if block.txs[0].vout.iter().any(|out| out.value != 0) {
        return Err(ConsensusError::BadCoinbase("coinbase pays value in a PoS block".into()));
    }

    if !kernel::check_coinstake_timestamp(
        ctx.params,
        block.header.time as i64,
        coinstake.time as i64,
    ) {
        return Err(ConsensusError::BadCoinstake(format!(
            "coinstake time {} does not match block time {}",
            coinstake.time, block.header.time
        )));
    }

    let Some(prev) = prev else {
        return Err(ConsensusError::BadCoinstake("PoS genesis".into()));
    };
    kernel::check_proof_of_stake(
        ctx.tree,
        ctx.coins,
        ctx.params,
        prev,
        coinstake,
        block.header.bits,
        coinstake.time,
    )?;

    verify_block_signature(block)?;

    // Reward bound: outputs minus staked inputs stay within subsidy + fees.
    let fees = block_fees(block, ctx)?;
    let staked: Amount = input_value(coinstake, block, ctx)
        .map_err(|outpoint| ConsensusError::BadCoinstake(format!("input {outpoint} not found")))?;
    let reward = coinstake.value_out() - staked;
    let max_reward = pos_subsidy() + fees;
    if reward < 0 || reward > max_reward {
        return Err(ConsensusError::BadCoinstake(format!(
            "coinstake pays {reward}, at most {max_reward} allowed at height {height}"
        )));
    }
    Ok(())
}

fn check_proof_of_work_block(
    block: &Block,
    height: i32,
    ctx: &ValidationContext<'_>,
) -> Result<()> {
    // 5. The PoW era ends at the cutoff height.
    if height > ctx.params.last_pow_block {
        return Err(ConsensusError::VersionGated(format!(
            "proof-of-work block at height {height}, cutoff {}",
            ctx.params.last_pow_block
        )));
    }
    if !block.block_sig.is_empty() {
        return Err(ConsensusError::BadHeader("signature on a PoW block".into()));
    }

    let fees = block_fees(block, ctx)?;
    let max_out = pow_subsidy(height, ctx.params) + fees;
    let paid = block.txs[0].value_out();
    if !money_range(paid) || paid > max_out {
        return Err(ConsensusError::BadCoinbase(format!(
            "coinbase pays {paid}, at most {max_out} allowed at height {height}"
        )));
    }
    Ok(())
}

/// Sum of fees of the plain transactions (neither coinbase nor coinstake).
fn block_fees(block: &Block, ctx: &ValidationContext<'_>) -> Result<Amount> {
    let mut fees: Amount = 0;
    for (i, tx) in block.txs.iter().enumerate() {
        if tx.is_coinbase() || (i == 1 && tx.is_coinstake()) {
            continue;
        }
        let in_value = input_value(tx, block, ctx).map_err(|outpoint| {
            ConsensusError::BadCoinbase(format!("input {outpoint} not found"))
        })?;
        let fee = in_value - tx.value_out();
        if fee < 0 {
            return Err(ConsensusError::BadCoinbase(format!(
                "transaction {} pays out more than it spends",
                tx.txid()
            )));
        }
        fees += fee;
    }
    Ok(fees)
}

/// Resolve a transaction's input value from earlier in-block outputs or the
/// UTXO view.
fn input_value(
    tx: &Transaction,
    block: &Block,
    ctx: &ValidationContext<'_>,
) -> std::result::Result<Amount, OutPoint> {
    let mut total = 0;
    for input in &tx.vin {
        let from_block = block
            .txs
            .iter()
            .find(|candidate| candidate.txid() == input.prevout.txid)
            .and_then(|candidate| candidate.vout.get(input.prevout.vout as usize))
            .map(|out| out.value);
        let value = match from_block {
            Some(value) => value,
            None => {
                ctx.coins.get_coin(&input.prevout).ok_or(input.prevout)?.value
            }
        };
        total += value;
    }
    Ok(total)
}

/// Check the staker's signature over the block hash with the key of the
/// kernel payout output (`vout[1]` of the coinstake, always pay-to-pubkey).
pub fn verify_block_signature(block: &Block) -> Result<()> {
    let payout = block.txs[1]
        .vout
        .get(1)
        .ok_or_else(|| ConsensusError::BadCoinstake("missing kernel payout output".into()))?;
    let TxoutType::Pubkey(pubkey_bytes) = payout.script_pubkey.solve() else {
        return Err(ConsensusError::BadCoinstake(
            "kernel payout is not pay-to-pubkey".into(),
        ));
    };

    let pubkey = PublicKey::from_slice(&pubkey_bytes)
        .map_err(|e| ConsensusError::BadCoinstake(format!("bad staker pubkey: {e}")))?;
    let signature = Signature::from_der(&block.block_sig)
        .map_err(|e| ConsensusError::BadCoinstake(format!("bad block signature: {e}")))?;
    let message = Message::from_digest_slice(block.hash().as_bytes())
        .expect("block hashes are 32 bytes");

    Secp256k1::verification_only()
        .verify_ecdsa(&message, &signature, &pubkey)
        .map_err(|e| ConsensusError::BadCoinstake(format!("block signature invalid: {e}")))
}

fn check_witness_commitment(
    block: &Block,
    prev: Option<BlockId>,
    ctx: &ValidationContext<'_>,
) -> Result<()> {
    let segwit_active = deployment_active_after(ctx.tree, prev, ctx.params, DEPLOYMENT_SEGWIT);
    let commitment = find_witness_commitment(&block.txs[0]);

    if let (true, Some(commitment)) = (segwit_active, commitment) {
        let nonce = block.txs[0]
            .vin
            .first()
            .and_then(|input| input.witness.first())
            .ok_or_else(|| ConsensusError::BadWitness("missing commitment nonce".into()))?;
        if nonce.len() != 32 {
            return Err(ConsensusError::BadWitness("commitment nonce is not 32 bytes".into()));
        }
        let expected = witness_commitment(&block.witness_merkle_root(), nonce);
        if commitment != *expected.as_bytes() {
            return Err(ConsensusError::BadWitness("commitment mismatch".into()));
        }
        return Ok(());
    }

    // Without a commitment no transaction may carry witness data.
    if block.txs.iter().any(Transaction::has_witness) {
        return Err(ConsensusError::BadWitness("unexpected witness data".into()));
    }
    Ok(())
}

/// Locate the last commitment output in the coinbase.
pub fn find_witness_commitment(coinbase: &Transaction) -> Option<[u8; 32]> {
    coinbase.vout.iter().rev().find_map(|out| {
        let bytes = out.script_pubkey.as_bytes();
        if bytes.len() >= 38 && bytes[0..6] == WITNESS_COMMITMENT_HEADER {
            let mut commitment = [0u8; 32];
            commitment.copy_from_slice(&bytes[6..38]);
            Some(commitment)
        } else {
            None
        }
    })
}

/// SHA256d over the witness merkle root and the coinbase witness nonce.
pub fn witness_commitment(witness_root: &Hash256, nonce: &[u8]) -> Hash256 {
    let mut data = Vec::with_capacity(64);
    data.extend_from_slice(witness_root.as_bytes());
    data.extend_from_slice(nonce);
    sable_core::hashes::sha256d(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_core::script::Script;
    use sable_core::transaction::{TxInput, TxOutput};
    use std::collections::HashMap;

    struct MapCoins(HashMap<OutPoint, kernel::Coin>);

    impl CoinView for MapCoins {
        fn get_coin(&self, outpoint: &OutPoint) -> Option<kernel::Coin> {
            self.0.get(outpoint).cloned()
        }
    }

    fn empty_coins() -> MapCoins {
        MapCoins(HashMap::new())
    }

    fn params() -> ChainParams {
        ChainParams::for_network("main").unwrap()
    }

    fn coinbase_tx(height: i32, value: Amount) -> Transaction {
        let mut tx = Transaction::new();
        tx.time = 1_720_000_000;
        let mut input = TxInput::new(OutPoint::null());
        let mut script = Script::new();
        script.push_int(height as i64).push_opcode(sable_core::script::OP_0);
        input.script_sig = script;
        tx.vin.push(input);
        tx.vout.push(TxOutput::new(value, Script::new_p2pkh(&[1u8; 20])));
        tx
    }

    fn genesis_chain(params: &ChainParams) -> (BlockTree, BlockId) {
        let mut tree = BlockTree::new();
        let id = tree.insert(&params.genesis.header, None, 0, Hash256::ZERO);
        (tree, id)
    }

    fn pow_block(prev_hash: Hash256, height: i32, time: u32, value: Amount) -> Block {
        let mut header = BlockHeader::null();
        header.version = 1;
        header.prev_hash = prev_hash;
        header.time = time;
        header.bits = 0x1e0fffff;
        let mut block = Block::new(header);
        block.txs.push(coinbase_tx(height, value));
        block.header.merkle_root = block.merkle_root();
        block
    }

    #[test]
    fn genesis_header_is_accepted() {
        let params = params();
        let tree = BlockTree::new();
        let coins = empty_coins();
        let ctx = ValidationContext { params: &params, tree: &tree, coins: &coins, now: 1_720_000_000 };
        assert!(check_block_header(&params.genesis.header, None, &ctx).is_ok());
    }

    #[test]
    fn timestamp_window_boundaries() {
        let params = params();
        let (tree, tip) = genesis_chain(&params);
        let coins = empty_coins();
        let median = tree.median_time_past(tip);
        let now = median + 600;
        let ctx = ValidationContext { params: &params, tree: &tree, coins: &coins, now };

        let mut header = pow_block(params.genesis_hash, 1, 0, 0).header;

        // exactly the median is stale, one past it is fine
        header.time = median as u32;
        assert!(matches!(
            check_header_with_kind(&header, Some(tip), false, false, &ctx),
            Err(ConsensusError::StaleTime { .. })
        ));
        header.time = (median + 1) as u32;
        assert!(check_header_with_kind(&header, Some(tip), false, false, &ctx).is_ok());

        // the future drift cap is two hours
        header.time = (now + 2 * 60 * 60 + 1) as u32;
        assert!(matches!(
            check_header_with_kind(&header, Some(tip), false, false, &ctx),
            Err(ConsensusError::FutureTime { .. })
        ));
    }

    #[test]
    fn pos_header_requires_masked_time() {
        let params = params();
        let (tree, tip) = genesis_chain(&params);
        let coins = empty_coins();
        let ctx = ValidationContext {
            params: &params,
            tree: &tree,
            coins: &coins,
            now: 1_720_000_000,
        };
        let mut header = pow_block(params.genesis_hash, 1, 0, 0).header;
        header.bits = 0x1e0fffff;
        header.time = 1_420_000_001; // unmasked
        assert!(matches!(
            check_header_with_kind(&header, Some(tip), true, false, &ctx),
            Err(ConsensusError::BadHeader(_))
        ));
        header.time = 1_420_000_000 & !0xf;
        assert!(check_header_with_kind(&header, Some(tip), true, false, &ctx).is_ok());
    }

    #[test]
    fn pow_cutoff_height_enforced() {
        let params = params();
        let (mut tree, mut tip) = genesis_chain(&params);
        // simulate an index whose height is already past the cutoff
        for i in 0..3u32 {
            let mut header = BlockHeader::null();
            header.version = 1;
            header.time = params.genesis.header.time + 16 * (i + 1);
            header.bits = 0x1e0fffff;
            header.prev_hash = tree.get(tip).hash;
            tip = tree.insert(&header, Some(tip), 0, Hash256::ZERO);
        }
        // pretend the cutoff is tiny to exercise the gate
        let mut params = params;
        params.last_pow_block = 2;
        let coins = empty_coins();
        let now = tree.get(tip).block_time() + 600;
        let ctx = ValidationContext { params: &params, tree: &tree, coins: &coins, now };

        let block = pow_block(
            tree.get(tip).hash,
            4,
            (tree.median_time_past(tip) + 10) as u32,
            0,
        );
        let result = check_block(
            &block,
            Some(tip),
            &ctx,
            CheckOptions { check_pow: false, check_merkle: true },
        );
        assert!(matches!(result, Err(ConsensusError::VersionGated(_))));
    }

    #[test]
    fn merkle_mismatch_rejected() {
        let params = params();
        let (tree, tip) = genesis_chain(&params);
        let coins = empty_coins();
        let now = tree.get(tip).block_time() + 600;
        let ctx = ValidationContext { params: &params, tree: &tree, coins: &coins, now };
        let mut block = pow_block(
            params.genesis_hash,
            1,
            (tree.median_time_past(tip) + 10) as u32,
            0,
        );
        block.header.merkle_root = Hash256::from_bytes([0xab; 32]);
        let result = check_block(
            &block,
            Some(tip),
            &ctx,
            CheckOptions { check_pow: false, check_merkle: true },
        );
        assert!(matches!(result, Err(ConsensusError::BadMerkle)));
    }

    #[test]
    fn overpaying_coinbase_rejected() {
        let params = params();
        let (tree, tip) = genesis_chain(&params);
        let coins = empty_coins();
        let now = tree.get(tip).block_time() + 600;
        let ctx = ValidationContext { params: &params, tree: &tree, coins: &coins, now };
        let subsidy = pow_subsidy(1, &params);
        let block = pow_block(
            params.genesis_hash,
            1,
            (tree.median_time_past(tip) + 10) as u32,
            subsidy + 1,
        );
        let result = check_block(
            &block,
            Some(tip),
            &ctx,
            CheckOptions { check_pow: false, check_merkle: true },
        );
        assert!(matches!(result, Err(ConsensusError::BadCoinbase(_))));

        let exact = pow_block(
            params.genesis_hash,
            1,
            (tree.median_time_past(tip) + 10) as u32,
            subsidy,
        );
        assert!(check_block(
            &exact,
            Some(tip),
            &ctx,
            CheckOptions { check_pow: false, check_merkle: true },
        )
        .is_ok());
    }

    #[test]
    fn checkpoint_gate() {
        let mut params = params();
        let (tree, tip) = genesis_chain(&params);
        let coins = empty_coins();
        let now = tree.get(tip).block_time() + 600;
        let block = pow_block(
            params.genesis_hash,
            1,
            (tree.median_time_past(tip) + 10) as u32,
            0,
        );
        // pin height 1 to a hash this block does not have
        params.checkpoints.insert(1, Hash256::from_bytes([0xcd; 32]));
        let ctx = ValidationContext { params: &params, tree: &tree, coins: &coins, now };
        let result = check_block(
            &block,
            Some(tip),
            &ctx,
            CheckOptions { check_pow: false, check_merkle: true },
        );
        assert!(matches!(
            result,
            Err(ConsensusError::CheckpointMismatch { height: 1 })
        ));
    }

    #[test]
    fn unexpected_witness_data_rejected() {
        let params = params();
        let (tree, tip) = genesis_chain(&params);
        let coins = empty_coins();
        let now = tree.get(tip).block_time() + 600;
        let ctx = ValidationContext { params: &params, tree: &tree, coins: &coins, now };
        let mut block = pow_block(
            params.genesis_hash,
            1,
            (tree.median_time_past(tip) + 10) as u32,
            0,
        );
        block.txs[0].vin[0].witness = vec![vec![0u8; 32]];
        block.header.merkle_root = block.merkle_root();
        let result = check_block(
            &block,
            Some(tip),
            &ctx,
            CheckOptions { check_pow: false, check_merkle: true },
        );
        assert!(matches!(result, Err(ConsensusError::BadWitness(_))));
    }
}
