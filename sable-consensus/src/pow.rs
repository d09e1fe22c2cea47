//! Difficulty retargeting and the proof-of-work check.
//!
//! Targets move by an exponential average toward the protocol spacing,
//! retargeting every block against the previous two blocks of the same
//! kind. PoW and PoS difficulties are tracked independently.

use primitive_types::U256;

use sable_core::arith::{compact_to_target, target_to_compact, u256_from_hash};
use sable_core::hashes::Hash256;

use crate::chain::{BlockId, BlockTree};
use crate::params::ChainParams;

fn target_limit(params: &ChainParams, time: i64, proof_of_stake: bool) -> U256 {
    if proof_of_stake {
        if params.is_protocol_v2(time) {
            params.pos_limit_v2
        } else {
            params.pos_limit
        }
    } else {
        params.pow_limit
    }
}

/// Compact target the next block of the given kind must satisfy.
pub fn next_target(
    tree: &BlockTree,
    prev: Option<BlockId>,
    params: &ChainParams,
    proof_of_stake: bool,
) -> u32 {
    // Genesis block
    let Some(prev) = prev else {
        return target_to_compact(params.pow_limit);
    };

    let limit =
        target_to_compact(target_limit(params, tree.get(prev).block_time(), proof_of_stake));

    let Some(last) = tree.last_block_of_kind(prev, proof_of_stake) else {
        return limit; // first block of this kind
    };
    let Some(last_prev) = tree.prev(last) else {
        return limit;
    };
    let Some(prev_last) = tree.last_block_of_kind(last_prev, proof_of_stake) else {
        return limit;
    };
    if tree.prev(prev_last).is_none() {
        return limit; // second block of this kind
    }

    if params.mine_blocks_on_demand {
        // regtest keeps a fixed easy target
        return 0x207fffff;
    }

    calculate_next_target(tree, last, tree.get(prev_last).block_time(), params, proof_of_stake)
}

/// Pure retarget step from the last block of a kind and the block time of
/// the one before it.
pub fn calculate_next_target(
    tree: &BlockTree,
    last: BlockId,
    first_block_time: i64,
    params: &ChainParams,
    proof_of_stake: bool,
) -> u32 {
    let last_index = tree.get(last);
    if proof_of_stake {
        if params.pos_no_retargeting {
            return last_index.bits;
        }
    } else if params.pow_no_retargeting {
        return last_index.bits;
    }

    let last_time = last_index.block_time();
    let spacing = params.target_spacing_at(last_time);
    let mut actual_spacing = last_time - first_block_time;

    // Limit adjustment step
    if params.is_protocol_v1_retarget_fixed(last_time) && actual_spacing < 0 {
        actual_spacing = spacing;
    }
    if params.is_protocol_v3(last_time) && actual_spacing > spacing * 10 {
        actual_spacing = spacing * 10;
    }

    // On testnet4, keep the real difficulty across the min-difficulty
    // exception by retargeting from the first block of the current window.
    let base_bits = if params.enforce_bip94 && !proof_of_stake {
        let interval = params.difficulty_adjustment_interval() as i32;
        let window_start = last_index.height - last_index.height % interval.max(1);
        tree.ancestor_at_height(last, window_start)
            .map(|id| tree.get(id).bits)
            .unwrap_or(last_index.bits)
    } else {
        last_index.bits
    };

    // Retarget with exponential moving toward the target spacing.
    let limit = target_limit(params, last_time, proof_of_stake);
    let (mut new_target, negative, overflow) = compact_to_target(base_bits);
    if negative || overflow || new_target.is_zero() {
        return target_to_compact(limit);
    }
    let interval = params.target_timespan / spacing;
    // actual_spacing can still be negative before the V1 fix; the numerator
    // floors at one so the multiply stays in unsigned range
    let numerator = ((interval - 1) * spacing + actual_spacing + actual_spacing).max(1);
    let denominator = (interval + 1) * spacing;
    new_target = match new_target.checked_mul(U256::from(numerator as u64)) {
        Some(scaled) => scaled / U256::from(denominator as u64),
        None => limit,
    };

    if new_target.is_zero() || new_target > limit {
        new_target = limit;
    }

    target_to_compact(new_target)
}

/// Proof-of-work validity of a header hash against its claimed bits.
pub fn check_proof_of_work(hash: &Hash256, bits: u32, params: &ChainParams) -> bool {
    let (target, negative, overflow) = compact_to_target(bits);

    // Check range
    if negative || target.is_zero() || overflow || target > params.pow_limit {
        return false;
    }

    u256_from_hash(hash) <= target
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_core::block::{BlockHeader, BLOCK_FLAG_PROOF_OF_STAKE};

    // timestamps safely after every protocol gate
    const T0: i64 = 1_720_000_000;

    fn params() -> ChainParams {
        ChainParams::for_network("main").unwrap()
    }

    fn chain_of(times: &[i64], pos: bool) -> (BlockTree, BlockId) {
        let mut tree = BlockTree::new();
        let mut prev = None;
        let mut id = 0;
        for (i, &time) in times.iter().enumerate() {
            let mut header = BlockHeader::null();
            header.version = 1;
            header.time = time as u32;
            header.bits = 0x1e0fffff;
            header.nonce = i as u32;
            if let Some(p) = prev {
                header.prev_hash = tree.get(p).hash;
            }
            let flags = if pos && i > 0 { BLOCK_FLAG_PROOF_OF_STAKE } else { 0 };
            id = tree.insert(&header, prev, flags, Hash256::ZERO);
            prev = Some(id);
        }
        (tree, id)
    }

    #[test]
    fn genesis_gets_the_pow_limit() {
        let params = params();
        assert_eq!(
            next_target(&BlockTree::new(), None, &params, false),
            target_to_compact(params.pow_limit)
        );
    }

    #[test]
    fn first_and_second_block_of_kind_get_the_limit() {
        let params = params();
        let (tree, tip) = chain_of(&[T0, T0 + 64], false);
        assert_eq!(
            next_target(&tree, Some(tip), &params, false),
            target_to_compact(params.pow_limit)
        );
        // no PoS block exists at all
        assert_eq!(
            next_target(&tree, Some(tip), &params, true),
            target_to_compact(params.pos_limit_v2)
        );
    }

    #[test]
    fn on_pace_spacing_eases_target_toward_equilibrium() {
        let params = params();
        let (tree, tip) =
            chain_of(&[T0, T0 + 64, T0 + 128, T0 + 192], false);
        let bits = next_target(&tree, Some(tip), &params, false);
        let (target, _, _) = compact_to_target(bits);
        let (old, _, _) = compact_to_target(0x1e0fffff);
        // exact spacing leaves the target in place up to compact rounding
        let ratio_up = target.checked_mul(U256::from(100u64)).unwrap() / old;
        assert!(ratio_up >= U256::from(99u64) && ratio_up <= U256::from(101u64));
    }

    #[test]
    fn fast_blocks_tighten_slow_blocks_loosen() {
        let params = params();
        let (fast_tree, fast_tip) =
            chain_of(&[T0, T0 + 64, T0 + 80, T0 + 96], false);
        let (slow_tree, slow_tip) =
            chain_of(&[T0, T0 + 64, T0 + 364, T0 + 664], false);
        let (fast, _, _) =
            compact_to_target(next_target(&fast_tree, Some(fast_tip), &params, false));
        let (slow, _, _) =
            compact_to_target(next_target(&slow_tree, Some(slow_tip), &params, false));
        assert!(fast < slow);
    }

    #[test]
    fn negative_spacing_clamped_after_v1_fix() {
        let params = params();
        // last block earlier than the one before it
        let (tree, tip) = chain_of(&[T0, T0 + 64, T0 + 600, T0 + 500], false);
        let bits = next_target(&tree, Some(tip), &params, false);
        let (target, _, _) = compact_to_target(bits);
        assert!(!target.is_zero());
        assert!(target <= params.pow_limit);
    }

    #[test]
    fn overlong_spacing_clamped_at_ten_intervals_after_v3() {
        let params = params();
        let (tree_clamped, tip_clamped) =
            chain_of(&[T0, T0 + 64, T0 + 128, T0 + 128 + 64 * 10], false);
        let (tree_huge, tip_huge) =
            chain_of(&[T0, T0 + 64, T0 + 128, T0 + 128 + 64 * 500], false);
        assert_eq!(
            next_target(&tree_clamped, Some(tip_clamped), &params, false),
            next_target(&tree_huge, Some(tip_huge), &params, false)
        );
    }

    #[test]
    fn result_never_exceeds_the_kind_limit() {
        let params = params();
        // absurdly slow blocks push toward the cap
        let (tree, tip) =
            chain_of(&[T0, T0 + 64, T0 + 20_000, T0 + 40_000], false);
        let bits = next_target(&tree, Some(tip), &params, false);
        let (target, _, _) = compact_to_target(bits);
        assert!(target <= params.pow_limit);
        assert!(!target.is_zero());
    }

    #[test]
    fn regtest_uses_fixed_easy_target() {
        let params = ChainParams::for_network("regtest").unwrap();
        let (tree, tip) =
            chain_of(&[T0, T0 + 64, T0 + 128, T0 + 192], false);
        assert_eq!(next_target(&tree, Some(tip), &params, false), 0x207fffff);
    }

    #[test]
    fn check_pow_range_and_comparison() {
        let params = params();
        let easy_hash = Hash256::from_bytes([0u8; 32]);
        assert!(check_proof_of_work(&easy_hash, 0x1e0fffff, &params));
        // zero target, negative and oversized targets are rejected outright
        assert!(!check_proof_of_work(&easy_hash, 0, &params));
        assert!(!check_proof_of_work(&easy_hash, 0x1e800001, &params));
        assert!(!check_proof_of_work(&easy_hash, 0x2100ffff, &params));
        // a hash above the decoded target fails
        let hard_hash = Hash256::from_bytes([0xff; 32]);
        assert!(!check_proof_of_work(&hard_hash, 0x1e0fffff, &params));
    }
}
