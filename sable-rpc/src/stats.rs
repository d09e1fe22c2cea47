//! Chain statistics backing `getstakinginfo`.

use sable_consensus::chain::{BlockId, BlockTree};
use sable_consensus::params::ChainParams;

/// Blocks sampled for the network stake estimate.
const POS_INTERVAL: usize = 72;

/// Difficulty of a compact target relative to the classic 0x1d00ffff unit.
pub fn difficulty(bits: u32) -> f64 {
    let mut shift = (bits >> 24) & 0xff;
    let mantissa = (bits & 0x00ff_ffff).max(1);
    let mut diff = 65535.0 / mantissa as f64;
    while shift < 29 {
        diff *= 256.0;
        shift += 1;
    }
    while shift > 29 {
        diff /= 256.0;
        shift -= 1;
    }
    diff
}

/// Difficulty of the most recent block of the requested kind.
pub fn last_difficulty(tree: &BlockTree, tip: Option<BlockId>, proof_of_stake: bool) -> f64 {
    tip.and_then(|t| tree.last_block_of_kind(t, proof_of_stake))
        .map(|id| difficulty(tree.get(id).bits))
        .unwrap_or(0.0)
}

/// Estimated kernels tried per second across the network, derived from the
/// difficulty and pace of recent proof-of-stake blocks.
pub fn pos_kernel_ps(tree: &BlockTree, tip: Option<BlockId>, params: &ChainParams) -> f64 {
    let Some(tip) = tip else { return 0.0 };

    let mut difficulty_sum = 0.0;
    let mut samples = 0usize;
    let mut newest_time: Option<i64> = None;
    let mut oldest_time = 0i64;

    let mut cursor = tree.last_block_of_kind(tip, true);
    while let Some(id) = cursor {
        if samples == POS_INTERVAL {
            break;
        }
        let index = tree.get(id);
        difficulty_sum += difficulty(index.bits);
        samples += 1;
        if newest_time.is_none() {
            newest_time = Some(index.block_time());
        }
        oldest_time = index.block_time();
        cursor = index.prev.and_then(|p| tree.last_block_of_kind(p, true));
    }

    let Some(newest_time) = newest_time else { return 0.0 };
    let stakes_time = newest_time - oldest_time;
    if samples < 2 || stakes_time <= 0 {
        return 0.0;
    }

    let avg_difficulty = difficulty_sum / samples as f64;
    let kernels_tried = avg_difficulty * 4_294_967_296.0;
    kernels_tried / stakes_time as f64 * (params.stake_timestamp_mask + 1) as f64
}
