//! Stable RPC error codes and the mapping into JSON-RPC errors.

use jsonrpsee::core::Error as RpcError;
use jsonrpsee::types::error::{CallError, ErrorObject};

pub const RPC_INVALID_PARAMETER: i32 = -8;
pub const RPC_WALLET_ERROR: i32 = -4;
pub const RPC_CLIENT_NOT_CONNECTED: i32 = -9;
pub const RPC_CLIENT_IN_INITIAL_DOWNLOAD: i32 = -10;
pub const RPC_INTERNAL_ERROR: i32 = -32603;

/// Build a coded JSON-RPC error.
pub fn rpc_error(code: i32, message: impl Into<String>) -> RpcError {
    RpcError::Call(CallError::Custom(ErrorObject::owned(code, message.into(), None::<()>)))
}
