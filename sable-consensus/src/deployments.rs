//! Version-bits deployment state.
//!
//! State is derived from median time past against each deployment's
//! start/timeout window; buried deployments activate by height. Signalling
//! tallies belong to fork choice, which lives outside this crate, so a
//! started deployment is considered locked in after one full confirmation
//! window of elapsed median time.

use crate::chain::{BlockId, BlockTree};
use crate::params::{
    ChainParams, ALWAYS_ACTIVE, DEPLOYMENT_SEGWIT, MAX_DEPLOYMENTS, NEVER_ACTIVE,
};

/// Lifecycle of one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdState {
    Defined,
    Started,
    Active,
    Failed,
}

/// State of a deployment for a block building on `prev`.
pub fn deployment_state(
    tree: &BlockTree,
    prev: Option<BlockId>,
    params: &ChainParams,
    deployment: usize,
) -> ThresholdState {
    let dep = &params.deployments[deployment];
    match dep.start_time {
        ALWAYS_ACTIVE => ThresholdState::Active,
        NEVER_ACTIVE => ThresholdState::Defined,
        start => {
            let median = match prev {
                Some(p) => tree.median_time_past(p),
                None => 0,
            };
            let window_seconds =
                params.miner_confirmation_window as i64 * params.target_spacing;
            if median < start {
                ThresholdState::Defined
            } else if median >= dep.timeout {
                ThresholdState::Failed
            } else if median >= start + window_seconds {
                ThresholdState::Active
            } else {
                ThresholdState::Started
            }
        }
    }
}

/// Whether a deployment applies to the block after `prev`.
pub fn deployment_active_after(
    tree: &BlockTree,
    prev: Option<BlockId>,
    params: &ChainParams,
    deployment: usize,
) -> bool {
    // Buried activation wins where a height is configured.
    if deployment == DEPLOYMENT_SEGWIT && params.segwit_height != i32::MAX {
        let next_height = prev.map(|p| tree.get(p).height + 1).unwrap_or(0);
        return next_height >= params.segwit_height;
    }
    deployment_state(tree, prev, params, deployment) == ThresholdState::Active
}

const VERSIONBITS_TOP_BITS: i32 = 0x2000_0000;

/// Block version for a template on `prev`: the version-bits prefix plus a
/// signal bit for every deployment currently in its signalling window.
pub fn compute_block_version(
    tree: &BlockTree,
    prev: Option<BlockId>,
    params: &ChainParams,
) -> i32 {
    let mut version = VERSIONBITS_TOP_BITS;
    for deployment in 0..MAX_DEPLOYMENTS {
        if deployment_state(tree, prev, params, deployment) == ThresholdState::Started {
            version |= 1 << params.deployments[deployment].bit;
        }
    }
    version
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::DEPLOYMENT_TESTDUMMY;
    use sable_core::block::BlockHeader;
    use sable_core::hashes::Hash256;

    fn chain_at(time: u32) -> (BlockTree, BlockId) {
        let mut tree = BlockTree::new();
        let mut prev = None;
        let mut id = 0;
        for i in 0..12u32 {
            let mut header = BlockHeader::null();
            header.version = 1;
            header.time = time + i;
            header.bits = 0x1f00ffff;
            header.nonce = i;
            if let Some(p) = prev {
                header.prev_hash = tree.get(p).hash;
            }
            id = tree.insert(&header, prev, 0, Hash256::ZERO);
            prev = Some(id);
        }
        (tree, id)
    }

    #[test]
    fn never_active_stays_defined() {
        let params = ChainParams::for_network("main").unwrap();
        let (tree, tip) = chain_at(1_720_000_000);
        assert_eq!(
            deployment_state(&tree, Some(tip), &params, DEPLOYMENT_SEGWIT),
            ThresholdState::Defined
        );
        assert!(!deployment_active_after(&tree, Some(tip), &params, DEPLOYMENT_SEGWIT));
    }

    #[test]
    fn regtest_segwit_always_active_by_burial() {
        let params = ChainParams::for_network("regtest").unwrap();
        let (tree, tip) = chain_at(1_720_000_000);
        assert!(deployment_active_after(&tree, Some(tip), &params, DEPLOYMENT_SEGWIT));
    }

    #[test]
    fn testdummy_on_regtest_progresses_with_time() {
        // regtest's dummy deployment starts at 0, window 150 * 64 seconds
        let params = ChainParams::for_network("regtest").unwrap();
        let (tree, tip) = chain_at(1_720_000_000);
        assert_eq!(
            deployment_state(&tree, Some(tip), &params, DEPLOYMENT_TESTDUMMY),
            ThresholdState::Active
        );
    }

    #[test]
    fn version_signals_started_deployments() {
        // testnet's segwit deployment signals from its 2024 start time
        let params = ChainParams::for_network("testnet").unwrap();
        let (tree, tip) = chain_at(1_727_100_100);
        let version = compute_block_version(&tree, Some(tip), &params);
        assert_eq!(version & VERSIONBITS_TOP_BITS, VERSIONBITS_TOP_BITS);
        assert_ne!(version & (1 << 1), 0);

        // long before the start time nothing signals
        let (old_tree, old_tip) = chain_at(1_500_000_000);
        assert_eq!(
            compute_block_version(&old_tree, Some(old_tip), &params),
            VERSIONBITS_TOP_BITS
        );
    }
}
