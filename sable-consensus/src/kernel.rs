//! Proof-of-stake kernel validation.
//!
//! A coinstake is admitted when the hash of its kernel preimage, scaled
//! down by the staked amount, falls under the block target. The preimage
//! binds the staked outpoint to chain history through the per-block stake
//! modifier, and the timestamp mask quantizes the search space to
//! 16-second slots.

use std::collections::HashMap;

use log::{debug, trace};
use primitive_types::U256;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1};

use sable_core::amount::Amount;
use sable_core::arith::{compact_to_target, u256_from_hash};
use sable_core::hashes::{sha256d, Hash256};
use sable_core::script::{Script, TxoutType};
use sable_core::serialize::Encoder;
use sable_core::transaction::{OutPoint, Transaction, SIGHASH_ALL};

use crate::chain::{BlockId, BlockTree};
use crate::error::{ConsensusError, KernelError};
use crate::params::ChainParams;

/// A spendable output as seen by the kernel checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    pub value: Amount,
    pub script_pubkey: Script,
    /// Height of the block that created the output.
    pub height: i32,
    pub is_coinbase: bool,
    pub is_coinstake: bool,
}

/// Read-only UTXO access supplied by the chain manager.
pub trait CoinView {
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin>;
}

/// Per-search cache of staked-output lookups.
///
/// Process-wide in spirit but reset for each scan; keyed by outpoint so a
/// kernel probed at sixty timestamps costs one UTXO lookup.
pub type StakeCache = HashMap<OutPoint, StakeCacheEntry>;

#[derive(Debug, Clone, Copy)]
pub struct StakeCacheEntry {
    pub block_from_time: u32,
    pub amount: Amount,
}

/// Compute the stake modifier for a block on top of `prev`, seeded by the
/// block's kernel (for PoS) or its own hash (for PoW).
pub fn compute_stake_modifier(prev_modifier: &Hash256, kernel: &Hash256) -> Hash256 {
    let mut enc = Encoder::with_capacity(64);
    enc.put_bytes(kernel.as_bytes());
    enc.put_bytes(prev_modifier.as_bytes());
    sha256d(&enc.into_bytes())
}

/// Coinstake transaction timestamp rule: the block and transaction must
/// agree, and from V2 on the transaction time must clear the mask.
pub fn check_coinstake_timestamp(params: &ChainParams, block_time: i64, tx_time: i64) -> bool {
    if params.is_protocol_v2(block_time) {
        block_time == tx_time && (tx_time & params.stake_timestamp_mask as i64) == 0
    } else {
        block_time == tx_time
    }
}

/// PoS block header timestamp rule.
pub fn check_stake_block_timestamp(params: &ChainParams, block_time: i64) -> bool {
    (block_time & params.stake_timestamp_mask as i64) == 0
}

/// The V3 kernel preimage.
///
/// The `prev_tx_time` slot is kept for layout compatibility; the coins view
/// does not retain transaction times, so both the staker and the validator
/// fill it with zero through this one helper.
fn kernel_hash(
    stake_modifier: &Hash256,
    block_from_time: u32,
    prev_tx_time: u32,
    prevout: &OutPoint,
    try_time: u32,
) -> Hash256 {
    let mut enc = Encoder::with_capacity(32 + 4 + 4 + 32 + 4 + 4);
    enc.put_bytes(stake_modifier.as_bytes());
    enc.put_u32(block_from_time);
    enc.put_u32(prev_tx_time);
    enc.put_bytes(prevout.txid.as_bytes());
    enc.put_u32(prevout.vout);
    enc.put_u32(try_time);
    sha256d(&enc.into_bytes())
}

/// The weighted target comparison at the heart of proof-of-stake.
pub fn check_stake_kernel_hash(
    tree: &BlockTree,
    prev: BlockId,
    bits: u32,
    block_from_time: u32,
    prevout_value: Amount,
    prevout: &OutPoint,
    try_time: u32,
) -> Result<Hash256, KernelError> {
    let prev_index = tree.get(prev);
    if prev_index.stake_modifier.is_zero() && prev_index.height > 0 {
        return Err(KernelError::ModifierUnavailable(prev_index.hash));
    }

    let (target, negative, overflow) = compact_to_target(bits);
    if negative || overflow || target.is_zero() {
        return Err(KernelError::HashMiss { outpoint: prevout.to_string(), time: try_time });
    }

    let hash =
        kernel_hash(&prev_index.stake_modifier, block_from_time, 0, prevout, try_time);
    let weight = U256::from(prevout_value.max(1) as u64);

    if u256_from_hash(&hash) / weight <= target {
        trace!(
            "kernel hit for {prevout} at time {try_time} (modifier {})",
            prev_index.stake_modifier
        );
        Ok(hash)
    } else {
        Err(KernelError::HashMiss { outpoint: prevout.to_string(), time: try_time })
    }
}

fn confirmations(prev_height: i32, coin_height: i32) -> i32 {
    prev_height - coin_height + 1
}

fn locate_stake(
    tree: &BlockTree,
    coins: &dyn CoinView,
    params: &ChainParams,
    prev: BlockId,
    prevout: &OutPoint,
) -> Result<(u32, Amount), KernelError> {
    let coin = coins
        .get_coin(prevout)
        .ok_or_else(|| KernelError::UtxoMissing(prevout.to_string()))?;

    let depth = confirmations(tree.get(prev).height, coin.height);
    if depth < params.coinbase_maturity {
        return Err(KernelError::Immature { depth, required: params.coinbase_maturity });
    }

    let origin = tree
        .ancestor_at_height(prev, coin.height)
        .ok_or_else(|| KernelError::UtxoMissing(prevout.to_string()))?;
    Ok((tree.get(origin).time, coin.value))
}

/// Prime the stake cache for an outpoint so repeated probes skip the view.
pub fn cache_kernel(
    cache: &mut StakeCache,
    tree: &BlockTree,
    coins: &dyn CoinView,
    params: &ChainParams,
    prev: BlockId,
    prevout: &OutPoint,
) {
    if cache.contains_key(prevout) {
        return;
    }
    if let Ok((block_from_time, amount)) = locate_stake(tree, coins, params, prev, prevout) {
        cache.insert(*prevout, StakeCacheEntry { block_from_time, amount });
    }
}

/// Probe one kernel at one timestamp. The wrapper used by the staker and
/// the `checkkernel` RPC.
pub fn check_kernel(
    tree: &BlockTree,
    coins: &dyn CoinView,
    params: &ChainParams,
    prev: BlockId,
    bits: u32,
    try_time: u32,
    prevout: &OutPoint,
    cache: Option<&StakeCache>,
) -> Result<(), KernelError> {
    let (block_from_time, amount) = match cache.and_then(|c| c.get(prevout)) {
        Some(entry) => (entry.block_from_time, entry.amount),
        None => locate_stake(tree, coins, params, prev, prevout)?,
    };
    check_stake_kernel_hash(tree, prev, bits, block_from_time, amount, prevout, try_time)
        .map(|_| ())
}

/// Full coinstake validation: shape, kernel signature, maturity, mask and
/// the kernel hash itself.
pub fn check_proof_of_stake(
    tree: &BlockTree,
    coins: &dyn CoinView,
    params: &ChainParams,
    prev: BlockId,
    tx: &Transaction,
    bits: u32,
    tx_time: u32,
) -> Result<(), ConsensusError> {
    if !tx.is_coinstake() {
        return Err(ConsensusError::BadCoinstake(format!(
            "{} is not a coinstake",
            tx.txid()
        )));
    }

    if params.is_protocol_v2(tx_time as i64)
        && (tx_time & params.stake_timestamp_mask) != 0
    {
        return Err(KernelError::MaskViolated(tx_time).into());
    }

    let kernel_in = &tx.vin[0];
    let coin = coins
        .get_coin(&kernel_in.prevout)
        .ok_or_else(|| KernelError::UtxoMissing(kernel_in.prevout.to_string()))?;

    // First verify the staker actually controls the kernel input.
    verify_input_signature(tx, 0, &coin.script_pubkey)
        .map_err(KernelError::SignatureInvalid)?;

    let (block_from_time, amount) =
        locate_stake(tree, coins, params, prev, &kernel_in.prevout)?;
    check_stake_kernel_hash(
        tree,
        prev,
        bits,
        block_from_time,
        amount,
        &kernel_in.prevout,
        tx_time,
    )?;

    debug!("coinstake {} accepted at time {tx_time}", tx.txid());
    Ok(())
}

/// Check the scriptSig of `input_index` against the spent P2PK or P2PKH
/// output. These are the only kernel types that reach validation; witness
/// kernels pay out through derived legacy outputs.
pub fn verify_input_signature(
    tx: &Transaction,
    input_index: usize,
    script_pubkey: &Script,
) -> Result<(), String> {
    let script_sig = &tx.vin[input_index].script_sig;
    let (sig_bytes, pubkey_bytes) = match script_pubkey.solve() {
        TxoutType::Pubkey(pubkey) => {
            let sig = extract_single_push(script_sig)
                .ok_or_else(|| "scriptSig is not a single signature push".to_string())?;
            (sig, pubkey)
        }
        TxoutType::PubkeyHash(key_hash) => {
            let (sig, pubkey) = extract_two_pushes(script_sig)
                .ok_or_else(|| "scriptSig is not <sig> <pubkey>".to_string())?;
            if sable_core::hashes::hash160(&pubkey) != key_hash {
                return Err("public key does not hash to the spent output".to_string());
            }
            (sig, pubkey)
        }
        other => return Err(format!("unsupported kernel script type {other:?}")),
    };

    if sig_bytes.is_empty() {
        return Err("empty signature".to_string());
    }
    let (der, hash_type) = sig_bytes.split_at(sig_bytes.len() - 1);
    if hash_type[0] as u32 != SIGHASH_ALL {
        return Err(format!("unsupported sighash type {}", hash_type[0]));
    }

    let sighash = tx
        .signature_hash(input_index, script_pubkey, SIGHASH_ALL)
        .map_err(|e| e.to_string())?;
    let message = Message::from_digest_slice(sighash.as_bytes()).map_err(|e| e.to_string())?;
    let signature = Signature::from_der(der).map_err(|e| format!("bad DER signature: {e}"))?;
    let pubkey = PublicKey::from_slice(&pubkey_bytes).map_err(|e| format!("bad pubkey: {e}"))?;

    Secp256k1::verification_only()
        .verify_ecdsa(&message, &signature, &pubkey)
        .map_err(|e| e.to_string())
}

fn extract_single_push(script: &Script) -> Option<Vec<u8>> {
    let bytes = script.as_bytes();
    let len = *bytes.first()? as usize;
    if (1..=0x4b).contains(&len) && bytes.len() == 1 + len {
        Some(bytes[1..].to_vec())
    } else {
        None
    }
}

fn extract_two_pushes(script: &Script) -> Option<(Vec<u8>, Vec<u8>)> {
    let bytes = script.as_bytes();
    let first_len = *bytes.first()? as usize;
    if !(1..=0x4b).contains(&first_len) || bytes.len() < 1 + first_len + 1 {
        return None;
    }
    let first = bytes[1..1 + first_len].to_vec();
    let rest = &bytes[1 + first_len..];
    let second_len = rest[0] as usize;
    if !(1..=0x4b).contains(&second_len) || rest.len() != 1 + second_len {
        return None;
    }
    Some((first, rest[1..].to_vec()))
}
