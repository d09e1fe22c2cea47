//! RPC method definitions for the staking surface.

use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An outpoint argument to `checkkernel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckKernelOutpoint {
    pub txid: String,
    pub vout: u32,
}

#[rpc(server)]
pub trait StakingRpc {
    /// Staking status, weights and the expected time to a reward.
    #[method(name = "getstakinginfo")]
    async fn get_staking_info(&self) -> RpcResult<Value>;

    /// Query or switch the staking thread.
    #[method(name = "staking")]
    async fn staking(&self, generate: Option<bool>) -> RpcResult<Value>;

    /// Query or set the balance kept out of staking.
    #[method(name = "reservebalance")]
    async fn reserve_balance(
        &self,
        reserve: Option<bool>,
        amount: Option<f64>,
    ) -> RpcResult<Value>;

    /// Probe outpoints for a valid kernel at the current masked time,
    /// optionally returning a ready-to-sign block template.
    #[method(name = "checkkernel")]
    async fn check_kernel(
        &self,
        outpoints: Vec<CheckKernelOutpoint>,
        create_template: Option<bool>,
    ) -> RpcResult<Value>;
}
