//! Relay and fee policy shared by the mempool view and the assembler.

use sable_core::amount::{Amount, MAX_MONEY};
use sable_core::transaction::Transaction;

use crate::params::ChainParams;

/// How far a block timestamp may run ahead of adjusted time.
pub const MAX_FUTURE_BLOCK_TIME: i64 = 2 * 60 * 60;

/// The maximum size for transactions we're willing to relay or mine.
pub const MAX_STANDARD_TX_SIZE: usize = 100_000;

/// Latest acceptable block time relative to `now`.
pub fn future_drift(now: i64) -> i64 {
    now + MAX_FUTURE_BLOCK_TIME
}

/// Minimum fee for a transaction of `size` bytes at `time`.
///
/// The V3.1 fork raised the per-byte rate tenfold and introduced a floor;
/// both schedules clamp at `MAX_MONEY`.
pub fn get_min_fee(params: &ChainParams, size: usize, time: i64) -> Amount {
    let fee: u128 = if params.is_protocol_v3_1(time) {
        (size as u128 * 100).max(10_000)
    } else {
        size as u128 * 10
    };
    fee.min(MAX_MONEY as u128) as Amount
}

/// Standardness of a transaction for relay and mining.
///
/// Only versions 1 and 2 are standard; the rule does not depend on the
/// transaction time on either side of the V3.1 fork.
pub fn is_standard_tx(tx: &Transaction) -> Result<(), &'static str> {
    if tx.version > 2 || tx.version < 1 {
        return Err("version");
    }
    if tx.total_size() > MAX_STANDARD_TX_SIZE {
        return Err("tx-size");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ChainParams {
        ChainParams::for_network("main").unwrap()
    }

    #[test]
    fn min_fee_before_the_fork() {
        let params = params();
        assert_eq!(get_min_fee(&params, 0, 0), 0);
        assert_eq!(get_min_fee(&params, 99, 0), 990);
        assert_eq!(get_min_fee(&params, 100, 0), 1000);
        assert_eq!(get_min_fee(&params, 101, 0), 1010);
        assert_eq!(get_min_fee(&params, 10_000, 0), 100_000);
        assert!(get_min_fee(&params, usize::MAX, 0) <= MAX_MONEY);
    }

    #[test]
    fn min_fee_after_the_fork() {
        let params = params();
        let t = params.protocol_v3_1_time + 1;
        assert_eq!(get_min_fee(&params, 0, t), 10_000);
        assert_eq!(get_min_fee(&params, 99, t), 10_000);
        assert_eq!(get_min_fee(&params, 100, t), 10_000);
        assert_eq!(get_min_fee(&params, 101, t), 10_100);
        assert_eq!(get_min_fee(&params, 10_000, t), 1_000_000);
        assert!(get_min_fee(&params, usize::MAX, t) <= MAX_MONEY);
    }

    #[test]
    fn min_fee_fork_uses_the_gate_predicate() {
        let params = params();
        // exactly at the gate the old schedule still applies
        assert_eq!(get_min_fee(&params, 100, params.protocol_v3_1_time), 1000);
        // the per-network exact skip stays on the old schedule too
        assert_eq!(get_min_fee(&params, 100, params.protocol_v3_1_skip), 1000);
    }

    #[test]
    fn standardness_versions() {
        let mut tx = Transaction::new();
        tx.version = 1;
        assert!(is_standard_tx(&tx).is_ok());
        tx.version = 2;
        assert!(is_standard_tx(&tx).is_ok());
        tx.version = 3;
        assert_eq!(is_standard_tx(&tx), Err("version"));

        // the verdict does not move with the transaction time
        let params = params();
        tx.time = (params.protocol_v3_1_time + 1) as u32;
        assert_eq!(is_standard_tx(&tx), Err("version"));
        tx.version = 1;
        assert!(is_standard_tx(&tx).is_ok());
        tx.version = 0;
        assert_eq!(is_standard_tx(&tx), Err("version"));
    }
}
