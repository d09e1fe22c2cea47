//! Monetary amounts.

/// Amount in the smallest unit (satoshi).
pub type Amount = i64;

/// One coin in satoshis.
pub const COIN: Amount = 100_000_000;

/// One cent in satoshis. Stake payouts are rounded to this granularity.
pub const CENT: Amount = 1_000_000;

/// Upper sanity bound on any amount handled by consensus.
pub const MAX_MONEY: Amount = 2_000_000_000 * COIN;

/// Range check used by transaction and block validation.
pub fn money_range(value: Amount) -> bool {
    (0..=MAX_MONEY).contains(&value)
}
