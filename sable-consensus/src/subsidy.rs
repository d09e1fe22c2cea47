//! Block reward schedule.

use sable_core::amount::{Amount, COIN};

use crate::params::ChainParams;

/// Proof-of-work era reward, constant up to the PoW cutoff height.
pub fn pow_subsidy(_height: i32, _params: &ChainParams) -> Amount {
    10_000 * COIN
}

/// Static proof-of-stake reward.
pub fn pos_subsidy() -> Amount {
    COIN + COIN / 2
}

/// Portion of a subsidy routed to the dev fund at the configured
/// percentage.
pub fn dev_fund_share(subsidy: Amount, donation_percentage: u8) -> Amount {
    subsidy * donation_percentage.min(100) as Amount / 100
}
