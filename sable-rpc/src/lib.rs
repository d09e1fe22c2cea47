//! Sable staking RPC.
//!
//! The wallet staking surface over JSON-RPC: `getstakinginfo`, `staking`,
//! `reservebalance` and `checkkernel`. Errors carry the stable numeric
//! codes clients have always matched on.

#![forbid(unsafe_code)]

pub mod error;
pub mod rpc;
pub mod server;
pub mod stats;

pub use crate::rpc::{CheckKernelOutpoint, StakingRpcServer};
pub use crate::server::StakingRpcImpl;
