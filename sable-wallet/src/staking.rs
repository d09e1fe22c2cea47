//! Stakeable-coin selection and coinstake construction.

use log::{debug, trace, warn};

use sable_consensus::chain::{BlockId, BlockTree};
use sable_consensus::kernel::{cache_kernel, check_kernel, CoinView, StakeCache};
use sable_consensus::params::ChainParams;
use sable_consensus::subsidy::{dev_fund_share, pos_subsidy};
use sable_core::amount::{Amount, CENT, COIN};
use sable_core::script::{Script, TxoutType};
use sable_core::transaction::{OutPoint, Transaction, TxInput, TxOutput};

use crate::keystore::KeyId;
use crate::sign::sign_input;
use crate::wallet::{StakingWallet, WalletCoin, WalletError};

/// Above this value an input is "significant" and no longer combined.
pub fn stake_combine_threshold() -> Amount {
    500 * COIN
}

/// Above this credit the payout is split into two outputs.
pub fn stake_split_threshold() -> Amount {
    2 * stake_combine_threshold()
}

/// Hard cap on the serialized coinstake.
const MAX_COINSTAKE_SIZE: usize = 1_000_000 / 5;

/// At most this many seconds are probed per kernel candidate.
const MAX_STAKE_SEARCH_INTERVAL: i64 = 60;

/// Maximum number of inputs a coinstake may combine.
const MAX_COINSTAKE_INPUTS: usize = 10;

/// Owned outputs currently eligible to stake: mature, safe, unlocked and
/// above the configured minimum.
pub fn available_coins_for_staking<'w>(
    wallet: &'w StakingWallet,
    tree: &BlockTree,
    tip: BlockId,
    params: &ChainParams,
) -> Vec<(OutPoint, &'w WalletCoin)> {
    let tip_height = tree.get(tip).height;
    let mut coins: Vec<(OutPoint, &WalletCoin)> = wallet
        .coins()
        .filter(|(outpoint, coin)| {
            if !coin.safe || coin.height < 0 {
                return false;
            }
            let depth = tip_height - coin.height + 1;
            if depth < params.coinbase_maturity {
                return false;
            }
            if coin.value < wallet.min_staking_amount {
                return false;
            }
            !wallet.is_coin_locked(outpoint)
        })
        .map(|(outpoint, coin)| (*outpoint, coin))
        .collect();
    // deterministic scan order
    coins.sort_by_key(|(outpoint, _)| *outpoint);
    coins
}

/// Total stakeable weight, as reported by `getstakinginfo`.
pub fn get_stake_weight(
    wallet: &StakingWallet,
    tree: &BlockTree,
    tip: BlockId,
    params: &ChainParams,
) -> u64 {
    let balance = wallet.balance();
    if balance <= wallet.reserve_balance {
        return 0;
    }
    let target = balance - wallet.reserve_balance;
    let (selected, _) = select_coins_for_staking(wallet, tree, tip, params, target);
    selected.iter().map(|(_, coin)| coin.value as u64).sum()
}

/// Select coins up to the target without shuffling or subset search.
pub fn select_coins_for_staking<'w>(
    wallet: &'w StakingWallet,
    tree: &BlockTree,
    tip: BlockId,
    params: &ChainParams,
    target: Amount,
) -> (Vec<(OutPoint, &'w WalletCoin)>, Amount) {
    let mut selected = Vec::new();
    let mut value = 0;
    for (outpoint, coin) in available_coins_for_staking(wallet, tree, tip, params) {
        if value >= target {
            break;
        }
        if coin.value >= target {
            selected.push((outpoint, coin));
            value += coin.value;
            break;
        }
        if coin.value < target + CENT {
            selected.push((outpoint, coin));
            value += coin.value;
        }
    }
    (selected, value)
}

/// Pick the payout script for a found kernel. Returns the script and
/// whether an extra minter-key output precedes it.
fn kernel_payout_script(
    wallet: &mut StakingWallet,
    kernel_script: &Script,
    destination: Option<KeyId>,
) -> Option<(Script, bool)> {
    match kernel_script.solve() {
        TxoutType::Pubkey(_) => Some((kernel_script.clone(), false)),
        TxoutType::PubkeyHash(key_hash) => {
            // convert to pay-to-pubkey so the block signature key is explicit
            let (_, pubkey) = wallet.keystore.lookup(&key_hash).or_else(|| {
                debug!("create_coinstake: no key for kernel output");
                None
            })?;
            Some((Script::new_p2pk(&pubkey.serialize()), false))
        }
        TxoutType::WitnessV0KeyHash(_) => {
            // pay out through a legacy minter key so the block can be signed
            let dest = match destination.or_else(|| wallet.keystore.reserve_key()) {
                Some(dest) => dest,
                None => {
                    warn!("create_coinstake: keypool ran out, please refill first");
                    return None;
                }
            };
            let pubkey = wallet.keystore.get_pubkey(&dest)?;
            Some((Script::new_p2pk(&pubkey.serialize()), true))
        }
        other => {
            debug!("create_coinstake: no support for kernel type {other:?}");
            None
        }
    }
}

/// Search the selected coins for a kernel and assemble a signed coinstake.
///
/// `base_time` is the wallet's adjusted now; the search walks backwards
/// from it in mask-aligned steps. Returns `Ok(None)` when no kernel was
/// found in the window, which the staker treats as "sleep and retry".
#[allow(clippy::too_many_arguments)]
pub fn create_coinstake(
    wallet: &mut StakingWallet,
    tree: &BlockTree,
    coin_view: &dyn CoinView,
    params: &ChainParams,
    prev: BlockId,
    bits: u32,
    search_interval: i64,
    destination: Option<KeyId>,
    fees: Amount,
    base_time: i64,
) -> Result<Option<Transaction>, WalletError> {
    if wallet.is_locked() {
        return Err(WalletError::WalletLocked);
    }

    let mut tx = Transaction::new();
    tx.time = (base_time & !(params.stake_timestamp_mask as i64)) as u32;
    // Mark as coinstake
    tx.vout.push(TxOutput::empty());

    // Choose coins to use
    let balance = wallet.balance();
    if balance <= wallet.reserve_balance {
        return Ok(None);
    }
    let allowed = balance - wallet.reserve_balance;

    // depth is measured from the block being extended
    let set_coins: Vec<(OutPoint, WalletCoin)> = {
        let (selected, _) = select_coins_for_staking(wallet, tree, prev, params, allowed);
        selected.into_iter().map(|(outpoint, coin)| (outpoint, coin.clone())).collect()
    };
    if set_coins.is_empty() {
        return Ok(None);
    }

    let mut cache = StakeCache::new();
    let mut credit: Amount = 0;
    let mut kernel_script = Script::new();
    let mut payout_script = Script::new();
    let mut minter_key = false;
    let mut kernel_found = false;
    let mut kernel_outpoint = OutPoint::null();

    'candidates: for (outpoint, coin) in &set_coins {
        cache_kernel(&mut cache, tree, coin_view, params, prev, outpoint);
        let window = search_interval.clamp(0, MAX_STAKE_SEARCH_INTERVAL);
        for n in 0..window {
            // search backward in time from the coinstake timestamp
            let try_time = tx.time as i64 - n;
            if try_time <= 0 {
                break;
            }
            if check_kernel(
                tree,
                coin_view,
                params,
                prev,
                bits,
                try_time as u32,
                outpoint,
                Some(&cache),
            )
            .is_err()
            {
                continue;
            }

            trace!("create_coinstake: kernel found on {outpoint}");
            kernel_script = coin.script_pubkey.clone();
            let Some((script, with_minter)) =
                kernel_payout_script(wallet, &kernel_script, destination)
            else {
                continue 'candidates;
            };

            tx.time = try_time as u32;
            tx.vin.push(TxInput::new(*outpoint));
            credit += coin.value;
            kernel_outpoint = *outpoint;

            if with_minter {
                // extra zero-value output for the minter key, then the
                // payout returns to the kernel script
                tx.vout.push(TxOutput::new(0, script));
                payout_script = kernel_script.clone();
            } else {
                payout_script = script;
            }
            minter_key = with_minter;
            tx.vout.push(TxOutput::new(0, payout_script.clone()));
            kernel_found = true;
            break 'candidates;
        }
    }

    if !kernel_found {
        return Ok(None);
    }
    if credit == 0 || credit > allowed {
        return Ok(None);
    }

    // Attempt to add more inputs of the same key as the kernel.
    for (outpoint, coin) in &set_coins {
        if tx.vout.len() != 2 {
            break;
        }
        if outpoint.txid == kernel_outpoint.txid {
            continue;
        }
        if coin.script_pubkey != kernel_script && coin.script_pubkey != payout_script {
            continue;
        }
        if tx.vin.len() >= MAX_COINSTAKE_INPUTS {
            break;
        }
        if credit >= stake_combine_threshold() {
            break;
        }
        if credit + coin.value > balance - wallet.reserve_balance {
            break;
        }
        if coin.value >= stake_combine_threshold() {
            continue;
        }
        tx.vin.push(TxInput::new(*outpoint));
        credit += coin.value;
    }

    // Calculate reward
    let reward = fees + pos_subsidy();
    if reward < 0 {
        return Ok(None);
    }

    let dev_enabled = wallet.donation_percentage > 0 && params.dev_fund_address.is_some();
    let mut dev_credit = 0;
    if dev_enabled {
        dev_credit = dev_fund_share(pos_subsidy(), wallet.donation_percentage);
        credit += reward - dev_credit;
    } else {
        credit += reward;
    }

    // Split stake
    if credit >= stake_split_threshold() {
        tx.vout.push(TxOutput::new(0, payout_script.clone()));
    }
    if dev_enabled {
        tx.vout.push(TxOutput::new(0, params.dev_reward_script()));
    }

    // Set output amounts
    let base = 1 + minter_key as usize;
    let split_len = if dev_enabled { 4 } else { 3 } + minter_key as usize;
    if tx.vout.len() == split_len {
        tx.vout[base].value = credit / 2 / CENT * CENT;
        tx.vout[base + 1].value = credit - tx.vout[base].value;
        if dev_enabled {
            tx.vout[base + 2].value = dev_credit;
        }
    } else {
        tx.vout[base].value = credit;
        if dev_enabled {
            tx.vout[base + 1].value = dev_credit;
        }
    }

    // Sign every input against the wallet's record of the spent output.
    let time = tx.time;
    for index in 0..tx.vin.len() {
        let prevout = tx.vin[index].prevout;
        let spent = set_coins
            .iter()
            .find(|(outpoint, _)| *outpoint == prevout)
            .map(|(_, coin)| coin.clone())
            .ok_or_else(|| WalletError::SignatureFailed(format!("{prevout} not selected")))?;
        sign_input(&wallet.keystore, &mut tx, index, &spent.script_pubkey, spent.value)
            .map_err(WalletError::SignatureFailed)?;
    }
    tx.time = time;

    // Limit size
    let size = tx.total_size();
    if size >= MAX_COINSTAKE_SIZE {
        return Err(WalletError::SizeLimitExceeded(size));
    }

    debug!(
        "create_coinstake: {} inputs, {} outputs, credit {credit}",
        tx.vin.len(),
        tx.vout.len()
    );
    Ok(Some(tx))
}
