//! The staking miner thread.
//!
//! One dedicated worker per wallet runs search rounds: wait until the node
//! is ready, build a template, sign the proof-of-stake block, submit it,
//! rest, repeat. Cancellation is cooperative; every sleep checks the stop
//! flag once a second.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use log::{info, warn};
use rand::Rng;

use sable_consensus::chain::{BlockId, BlockTree};
use sable_consensus::kernel::CoinView;
use sable_consensus::params::ChainParams;
use sable_core::block::Block;
use sable_core::script::Script;
use sable_wallet::keystore::KeyId;
use sable_wallet::sign::sign_block;
use sable_wallet::staking::available_coins_for_staking;
use sable_wallet::StakingWallet;

use crate::mempool::TxMemPool;
use crate::miner::{AssemblerOptions, BlockAssembler};

/// Default base for the adaptive search pacing, in milliseconds.
pub const DEFAULT_STAKE_TIMEOUT_MS: u64 = 500;

/// Minimum sync progress before staking starts.
const MIN_SYNC_PROGRESS: f64 = 0.996;

/// Chain state shared between the staker and the rest of the node,
/// guarded by one lock. The wallet has its own lock; when both are held
/// the wallet lock comes first.
pub struct NodeState<C: CoinView> {
    pub tree: BlockTree,
    pub mempool: TxMemPool,
    pub coins: C,
}

impl<C: CoinView> NodeState<C> {
    pub fn tip(&self) -> Option<BlockId> {
        self.tree.tip()
    }
}

/// The chain-manager collaborator the staker hands finished blocks to.
pub trait BlockSink {
    /// Accept a freshly staked block as if it came from the network.
    fn process_new_block(&self, block: Block) -> bool;
    fn node_count(&self) -> usize;
    fn is_initial_block_download(&self) -> bool;
    fn is_importing_or_reindexing(&self) -> bool;
    fn verification_progress(&self) -> f64;
    /// Adjusted network time.
    fn adjusted_now(&self) -> i64;
}

/// Staker tuning.
#[derive(Debug, Clone)]
pub struct StakerConfig {
    pub base_timeout_ms: u64,
    /// The minter-key destination for witness kernels.
    pub destination: Option<KeyId>,
}

impl Default for StakerConfig {
    fn default() -> Self {
        StakerConfig { base_timeout_ms: DEFAULT_STAKE_TIMEOUT_MS, destination: None }
    }
}

/// Running staker thread.
pub struct StakerHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl StakerHandle {
    /// Request termination and join the worker.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }
}

/// Sleep in one-second slices, honoring the stop flag. Returns false when
/// stop was requested.
pub fn sleep_staker(stop: &AtomicBool, milliseconds: u64) -> bool {
    let mut remaining = milliseconds;
    while remaining > 0 {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let slice = remaining.min(1_000);
        std::thread::sleep(std::time::Duration::from_millis(slice));
        remaining -= slice;
    }
    !stop.load(Ordering::Relaxed)
}

/// Whether this node can stake at all.
pub fn can_stake(params: &ChainParams, staking_arg: bool) -> bool {
    // signet blocks come from an authorized signer, not from stakers
    staking_arg && !params.signet_blocks
}

/// The staker itself.
pub struct Staker<C, N>
where
    C: CoinView + Send + 'static,
    N: BlockSink + Send + Sync + 'static,
{
    pub params: Arc<ChainParams>,
    pub state: Arc<Mutex<NodeState<C>>>,
    pub wallet: Arc<Mutex<StakingWallet>>,
    pub sink: Arc<N>,
    pub config: StakerConfig,
}

impl<C, N> Staker<C, N>
where
    C: CoinView + Send + 'static,
    N: BlockSink + Send + Sync + 'static,
{
    /// Spawn the worker thread.
    pub fn spawn(self) -> StakerHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_inner = stop.clone();
        let thread = std::thread::Builder::new()
            .name("sable-stake-miner".to_string())
            .spawn(move || {
                info!("stake miner started");
                self.run(&stop_inner);
                info!("stake miner stopped");
            })
            .expect("spawning the staker thread");
        StakerHandle { stop, thread: Some(thread) }
    }

    fn run(&self, stop: &AtomicBool) {
        // Search pacing grows with the number of stakeable outputs.
        let pos_timeout = {
            let wallet = self.wallet.lock().expect("wallet lock");
            let state = self.state.lock().expect("chain lock");
            let utxo_count = match state.tip() {
                Some(tip) => {
                    available_coins_for_staking(&wallet, &state.tree, tip, &self.params).len()
                }
                None => 0,
            };
            let timeout =
                self.config.base_timeout_ms + 30 * (utxo_count as f64).sqrt() as u64;
            info!("stake miner timeout {timeout}ms for {utxo_count} stakeable outputs");
            timeout
        };

        loop {
            // Hold off while the wallet or the node is not ready.
            loop {
                let ready = {
                    let mut wallet = self.wallet.lock().expect("wallet lock");
                    if wallet.is_locked() || !wallet.enabled_staking {
                        wallet.last_coinstake_search_interval = 0;
                        false
                    } else {
                        true
                    }
                };
                if !ready {
                    if !sleep_staker(stop, 5_000) {
                        return;
                    }
                    continue;
                }
                if self.sink.is_importing_or_reindexing()
                    || (!self.params.mine_blocks_on_demand
                        && (self.sink.node_count() == 0
                            || self.sink.is_initial_block_download()))
                {
                    if !sleep_staker(stop, 10_000) {
                        return;
                    }
                    continue;
                }
                if self.sink.verification_progress() < MIN_SYNC_PROGRESS {
                    if !sleep_staker(stop, 10_000) {
                        return;
                    }
                    continue;
                }
                break;
            }

            // Build a template; a cancelled search just means "no kernel
            // right now".
            let template = {
                let mut wallet = self.wallet.lock().expect("wallet lock");
                let state = self.state.lock().expect("chain lock");
                let Some(tip) = state.tip() else {
                    drop(state);
                    drop(wallet);
                    if !sleep_staker(stop, pos_timeout) {
                        return;
                    }
                    continue;
                };
                let mut assembler = BlockAssembler::new(
                    &self.params,
                    &state.tree,
                    &state.coins,
                    AssemblerOptions::default(),
                );
                assembler.create_new_block(
                    &state.mempool,
                    tip,
                    &Script::new(),
                    Some(&mut wallet),
                    self.config.destination,
                    self.sink.adjusted_now(),
                )
            };

            let (template, _fees) = match template {
                Ok(Some(built)) => built,
                Ok(None) => {
                    // no coinstake found this round
                    if !sleep_staker(stop, pos_timeout) {
                        return;
                    }
                    continue;
                }
                Err(e) => {
                    warn!("stake miner template error: {e}");
                    if !sleep_staker(stop, pos_timeout) {
                        return;
                    }
                    continue;
                }
            };

            let mut block = template.block;
            if block.is_proof_of_stake() {
                {
                    let wallet = self.wallet.lock().expect("wallet lock");
                    if let Err(e) = sign_block(&wallet.keystore, &mut block) {
                        warn!("failed to sign proof-of-stake block: {e}");
                        if !sleep_staker(stop, pos_timeout) {
                            return;
                        }
                        continue;
                    }
                }
                info!("proof-of-stake block found {}", block.hash());
                if self.sink.process_new_block(block) {
                    // rest after a success to avoid competing with ourselves
                    let rest = (16 + rand::thread_rng().gen_range(0..4)) * 1_000;
                    if !sleep_staker(stop, rest) {
                        return;
                    }
                }
            }

            if !sleep_staker(stop, pos_timeout) {
                return;
            }
        }
    }
}
