//! The staking RPC implementation and server plumbing.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use log::info;
use serde_json::{json, Value};

use sable_consensus::kernel::{check_kernel, CoinView};
use sable_consensus::params::ChainParams;
use sable_consensus::pow::next_target;
use sable_core::amount::{CENT, COIN};
use sable_core::hashes::Hash256;
use sable_core::script::Script;
use sable_core::serialize::Encoder;
use sable_core::transaction::OutPoint;
use sable_node::mempool::MempoolView;
use sable_node::miner::{AssemblerOptions, BlockAssembler};
use sable_node::staker::{can_stake, BlockSink, NodeState};
use sable_wallet::staking::get_stake_weight;
use sable_wallet::{StakingWallet, WalletError};

use crate::error::{
    rpc_error, RPC_CLIENT_IN_INITIAL_DOWNLOAD, RPC_CLIENT_NOT_CONNECTED, RPC_INTERNAL_ERROR,
    RPC_INVALID_PARAMETER, RPC_WALLET_ERROR,
};
use crate::rpc::{CheckKernelOutpoint, StakingRpcServer};
use crate::stats::{last_difficulty, pos_kernel_ps};

/// Handler state: shared handles into the node.
pub struct StakingRpcImpl<C, N>
where
    C: CoinView + Send + 'static,
    N: BlockSink + Send + Sync + 'static,
{
    pub params: Arc<ChainParams>,
    pub state: Arc<Mutex<NodeState<C>>>,
    pub wallet: Arc<Mutex<StakingWallet>>,
    pub sink: Arc<N>,
    /// `-staking` from the command line; signet forces this off.
    pub staking_arg: bool,
}

impl<C, N> StakingRpcImpl<C, N>
where
    C: CoinView + Send + 'static,
    N: BlockSink + Send + Sync + 'static,
{
    fn wallet_weight(&self) -> u64 {
        let wallet = self.wallet.lock().expect("wallet lock");
        let state = self.state.lock().expect("chain lock");
        match state.tree.tip() {
            Some(tip) => get_stake_weight(&wallet, &state.tree, tip, &self.params),
            None => 0,
        }
    }
}

#[async_trait]
impl<C, N> StakingRpcServer for StakingRpcImpl<C, N>
where
    C: CoinView + Send + 'static,
    N: BlockSink + Send + Sync + 'static,
{
    async fn get_staking_info(&self) -> RpcResult<Value> {
        let weight = self.wallet_weight();
        let (search_interval, enabled) = {
            let wallet = self.wallet.lock().expect("wallet lock");
            (wallet.last_coinstake_search_interval, wallet.enabled_staking)
        };

        let state = self.state.lock().expect("chain lock");
        let tip = state.tree.tip();
        let blocks = tip.map(|t| state.tree.get(t).height).unwrap_or(0);
        let pooled = MempoolView::len(&state.mempool);
        let net_weight = 1.1429 * pos_kernel_ps(&state.tree, tip, &self.params);
        let staking = search_interval != 0 && weight != 0;
        let expected_time = if staking && weight != 0 {
            (1.0455 * self.params.target_spacing as f64 * net_weight / weight as f64) as u64
        } else {
            0
        };
        let difficulty = last_difficulty(&state.tree, tip, true);

        Ok(json!({
            "enabled": enabled && can_stake(&self.params, self.staking_arg),
            "staking": staking,
            "blocks": blocks,
            "pooledtx": pooled,
            "difficulty": difficulty,
            "search-interval": search_interval,
            "weight": weight,
            "netstakeweight": net_weight as u64,
            "expectedtime": expected_time,
            "chain": self.params.network.name(),
            "warnings": "",
        }))
    }

    async fn staking(&self, generate: Option<bool>) -> RpcResult<Value> {
        let mut wallet = self.wallet.lock().expect("wallet lock");
        if let Some(generate) = generate {
            if generate {
                wallet.start_staking().map_err(|e| match e {
                    WalletError::SignatureFailed(reason) => rpc_error(RPC_WALLET_ERROR, reason),
                    WalletError::KeypoolEmpty => {
                        rpc_error(RPC_WALLET_ERROR, WalletError::KeypoolEmpty.to_string())
                    }
                    other => rpc_error(RPC_INTERNAL_ERROR, other.to_string()),
                })?;
            } else {
                wallet.stop_staking();
            }
        }
        Ok(json!({
            "enabled": can_stake(&self.params, self.staking_arg),
            "staking": wallet.enabled_staking,
        }))
    }

    async fn reserve_balance(
        &self,
        reserve: Option<bool>,
        amount: Option<f64>,
    ) -> RpcResult<Value> {
        let mut wallet = self.wallet.lock().expect("wallet lock");
        if let Some(reserve) = reserve {
            if reserve {
                let amount = amount.ok_or_else(|| {
                    rpc_error(RPC_INVALID_PARAMETER, "must provide amount to reserve balance")
                })?;
                if amount < 0.0 {
                    return Err(rpc_error(RPC_INVALID_PARAMETER, "amount cannot be negative"));
                }
                // round to the cent
                let satoshis = (amount * COIN as f64).round() as i64;
                wallet.reserve_balance = satoshis / CENT * CENT;
            } else {
                if amount.is_some() {
                    return Err(rpc_error(
                        RPC_INVALID_PARAMETER,
                        "cannot specify amount to turn off reserve",
                    ));
                }
                wallet.reserve_balance = 0;
            }
        }
        Ok(json!({
            "reserve": wallet.reserve_balance > 0,
            "amount": wallet.reserve_balance as f64 / COIN as f64,
        }))
    }

    async fn check_kernel(
        &self,
        outpoints: Vec<CheckKernelOutpoint>,
        create_template: Option<bool>,
    ) -> RpcResult<Value> {
        let create_template = create_template.unwrap_or(false);

        if !self.params.mine_blocks_on_demand {
            if self.sink.node_count() == 0 {
                return Err(rpc_error(
                    RPC_CLIENT_NOT_CONNECTED,
                    "peer-to-peer functionality missing or disabled",
                ));
            }
            if self.sink.is_initial_block_download() {
                return Err(rpc_error(
                    RPC_CLIENT_IN_INITIAL_DOWNLOAD,
                    "node is downloading blocks...",
                ));
            }
        }

        let now = self.sink.adjusted_now();
        let try_time = (now & !(self.params.stake_timestamp_mask as i64)) as u32;

        // wallet before chain, always
        let mut wallet = self.wallet.lock().expect("wallet lock");
        let state = self.state.lock().expect("chain lock");
        let tip = state
            .tree
            .tip()
            .ok_or_else(|| rpc_error(RPC_INTERNAL_ERROR, "chain has no tip"))?;
        let bits = next_target(&state.tree, Some(tip), &self.params, true);

        let mut kernel_found: Option<OutPoint> = None;
        for outpoint in &outpoints {
            let txid = Hash256::from_hex(&outpoint.txid)
                .map_err(|e| rpc_error(RPC_INVALID_PARAMETER, format!("bad txid: {e}")))?;
            let prevout = OutPoint::new(txid, outpoint.vout);
            if check_kernel(
                &state.tree,
                &state.coins,
                &self.params,
                tip,
                bits,
                try_time,
                &prevout,
                None,
            )
            .is_ok()
            {
                kernel_found = Some(prevout);
                break;
            }
        }

        let mut result = json!({
            "found": kernel_found.is_some(),
        });

        let Some(prevout) = kernel_found else {
            return Ok(result);
        };
        result["kernel"] = json!({
            "txid": prevout.txid.to_hex(),
            "vout": prevout.vout,
            "time": try_time,
        });

        if create_template {
            let mut assembler = BlockAssembler::new(
                &self.params,
                &state.tree,
                &state.coins,
                AssemblerOptions { test_block_validity: false, ..Default::default() },
            );
            let built = assembler
                .create_new_block(&state.mempool, tip, &Script::new(), Some(&mut wallet), None, now)
                .map_err(|e| rpc_error(RPC_INTERNAL_ERROR, e.to_string()))?;
            let Some((template, fees)) = built else {
                return Ok(result);
            };
            let mut enc = Encoder::new();
            template.block.encode_wire(&mut enc, true);
            result["blocktemplate"] = json!(hex::encode(enc.into_bytes()));
            result["blocktemplatefees"] = json!(fees);
            if let Some(payout) = template.block.txs.get(1).and_then(|tx| tx.vout.get(1)) {
                result["blocktemplatesignkey"] =
                    json!(hex::encode(payout.script_pubkey.as_bytes()));
            }
        }

        Ok(result)
    }
}

/// Start the RPC server on `addr`.
pub async fn start_server<C, N>(
    addr: SocketAddr,
    rpc: StakingRpcImpl<C, N>,
) -> Result<ServerHandle, Box<dyn std::error::Error + Send + Sync>>
where
    C: CoinView + Send + 'static,
    N: BlockSink + Send + Sync + 'static,
{
    let server = ServerBuilder::default().build(addr).await?;
    info!("staking RPC listening on {addr}");
    let handle = server.start(rpc.into_rpc())?;
    Ok(handle)
}
