//! The wallet's view of its own coins and staking settings.

use std::collections::{HashMap, HashSet};

use log::info;
use thiserror::Error;

use sable_core::amount::Amount;
use sable_core::script::Script;
use sable_core::transaction::OutPoint;

use crate::keystore::KeyStore;

/// Wallet-side failures during staking operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// The wallet is encrypted and locked
    #[error("wallet is locked")]
    WalletLocked,

    /// No unused keys remain in the pool
    #[error("keypool ran out, please refill and restart staking")]
    KeypoolEmpty,

    /// No mature stakeable coins above the configured minimums
    #[error("no eligible coins for staking")]
    NoEligibleCoins,

    /// Signing an input or block failed
    #[error("signing failed: {0}")]
    SignatureFailed(String),

    /// The assembled coinstake exceeded the serialized size cap
    #[error("coinstake size {0} exceeds the limit")]
    SizeLimitExceeded(usize),
}

/// One owned unspent output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletCoin {
    pub value: Amount,
    pub script_pubkey: Script,
    /// Height of the block that confirmed the output; -1 while unconfirmed.
    pub height: i32,
    pub is_coinbase: bool,
    pub is_coinstake: bool,
    /// Trusted: confirmed or from our own unconflicted transactions.
    pub safe: bool,
}

/// Wallet state consulted by the stake searcher and the staker thread.
///
/// Guarded by its own lock by the embedding node; when both this and the
/// chain lock are held, the wallet lock is always taken first.
pub struct StakingWallet {
    pub keystore: KeyStore,
    coins: HashMap<OutPoint, WalletCoin>,
    locked_outpoints: HashSet<OutPoint>,

    /// Balance kept out of staking.
    pub reserve_balance: Amount,
    /// Outputs below this value never stake.
    pub min_staking_amount: Amount,
    /// Percentage of the stake subsidy donated to the dev fund.
    pub donation_percentage: u8,

    pub enabled_staking: bool,
    /// True while the wallet is encrypted and locked.
    locked: bool,
    /// Wallet created without private keys (watch-only).
    pub disable_private_keys: bool,
    /// Wallet created blank, with no seed at all.
    pub blank: bool,

    /// Duration of the last kernel search, exposed through RPC.
    pub last_coinstake_search_interval: i64,
    /// End of the last kernel search window.
    pub last_coinstake_search_time: i64,
}

impl StakingWallet {
    pub fn new() -> Self {
        StakingWallet {
            keystore: KeyStore::new(),
            coins: HashMap::new(),
            locked_outpoints: HashSet::new(),
            reserve_balance: 0,
            min_staking_amount: 0,
            donation_percentage: 0,
            enabled_staking: false,
            locked: false,
            disable_private_keys: false,
            blank: false,
            last_coinstake_search_interval: 0,
            last_coinstake_search_time: 0,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// Credit a newly confirmed output.
    pub fn add_coin(&mut self, outpoint: OutPoint, coin: WalletCoin) {
        self.coins.insert(outpoint, coin);
    }

    /// Drop a spent output.
    pub fn remove_coin(&mut self, outpoint: &OutPoint) -> Option<WalletCoin> {
        self.locked_outpoints.remove(outpoint);
        self.coins.remove(outpoint)
    }

    pub fn lock_coin(&mut self, outpoint: OutPoint) {
        self.locked_outpoints.insert(outpoint);
    }

    pub fn unlock_coin(&mut self, outpoint: &OutPoint) {
        self.locked_outpoints.remove(outpoint);
    }

    pub fn is_coin_locked(&self, outpoint: &OutPoint) -> bool {
        self.locked_outpoints.contains(outpoint)
    }

    pub fn coins(&self) -> impl Iterator<Item = (&OutPoint, &WalletCoin)> {
        self.coins.iter()
    }

    pub fn get_coin(&self, outpoint: &OutPoint) -> Option<&WalletCoin> {
        self.coins.get(outpoint)
    }

    /// Trusted balance.
    pub fn balance(&self) -> Amount {
        self.coins.values().filter(|coin| coin.safe).map(|coin| coin.value).sum()
    }

    /// Turn staking on, refusing configurations that can never stake.
    pub fn start_staking(&mut self) -> Result<(), WalletError> {
        if self.disable_private_keys {
            self.enabled_staking = false;
            return Err(WalletError::SignatureFailed(
                "wallet has no private keys".to_string(),
            ));
        }
        if self.blank {
            self.enabled_staking = false;
            return Err(WalletError::SignatureFailed("wallet is blank".to_string()));
        }
        if self.keystore.keypool_size() == 0 {
            self.enabled_staking = false;
            return Err(WalletError::KeypoolEmpty);
        }
        self.enabled_staking = true;
        info!("staking enabled");
        Ok(())
    }

    pub fn stop_staking(&mut self) {
        if self.enabled_staking {
            info!("staking disabled");
        }
        self.enabled_staking = false;
        self.last_coinstake_search_interval = 0;
    }
}

impl Default for StakingWallet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_core::hashes::Hash256;

    fn coin(value: Amount, safe: bool) -> WalletCoin {
        WalletCoin {
            value,
            script_pubkey: Script::new(),
            height: 10,
            is_coinbase: false,
            is_coinstake: false,
            safe,
        }
    }

    #[test]
    fn balance_counts_only_safe_coins() {
        let mut wallet = StakingWallet::new();
        wallet.add_coin(OutPoint::new(Hash256::from_bytes([1; 32]), 0), coin(100, true));
        wallet.add_coin(OutPoint::new(Hash256::from_bytes([2; 32]), 0), coin(50, false));
        assert_eq!(wallet.balance(), 100);
    }

    #[test]
    fn start_staking_refuses_hopeless_wallets() {
        let mut wallet = StakingWallet::new();
        wallet.disable_private_keys = true;
        assert!(wallet.start_staking().is_err());

        let mut wallet = StakingWallet::new();
        wallet.blank = true;
        assert!(wallet.start_staking().is_err());

        let mut wallet = StakingWallet::new();
        assert_eq!(wallet.start_staking(), Err(WalletError::KeypoolEmpty));

        wallet.keystore.generate_key();
        assert!(wallet.start_staking().is_ok());
        assert!(wallet.enabled_staking);
        wallet.stop_staking();
        assert!(!wallet.enabled_staking);
    }

    #[test]
    fn coin_locking() {
        let mut wallet = StakingWallet::new();
        let outpoint = OutPoint::new(Hash256::from_bytes([1; 32]), 0);
        wallet.add_coin(outpoint, coin(100, true));
        wallet.lock_coin(outpoint);
        assert!(wallet.is_coin_locked(&outpoint));
        wallet.unlock_coin(&outpoint);
        assert!(!wallet.is_coin_locked(&outpoint));
        wallet.lock_coin(outpoint);
        wallet.remove_coin(&outpoint);
        assert!(!wallet.is_coin_locked(&outpoint));
    }
}
