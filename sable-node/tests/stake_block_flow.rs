//! End-to-end staking flow: search a kernel, assemble a proof-of-stake
//! template, sign the block, and run it through full validation.

use std::collections::HashMap;

use secp256k1::SecretKey;
use sha2::{Digest, Sha256};

use sable_consensus::chain::{BlockId, BlockTree};
use sable_consensus::kernel::{compute_stake_modifier, Coin, CoinView};
use sable_consensus::params::ChainParams;
use sable_consensus::validation::{check_block, CheckOptions, ValidationContext};
use sable_core::amount::{Amount, COIN};
use sable_core::block::BlockHeader;
use sable_core::hashes::Hash256;
use sable_core::script::Script;
use sable_core::transaction::OutPoint;
use sable_node::mempool::TxMemPool;
use sable_node::miner::{AssemblerOptions, BlockAssembler};
use sable_wallet::sign::sign_block;
use sable_wallet::{StakingWallet, WalletCoin};

struct MapCoins(HashMap<OutPoint, Coin>);

impl CoinView for MapCoins {
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.0.get(outpoint).cloned()
    }
}

fn secret(seed: &[u8]) -> SecretKey {
    SecretKey::from_slice(&Sha256::digest(seed)).unwrap()
}

fn build_chain(len: usize) -> (BlockTree, BlockId) {
    let mut tree = BlockTree::new();
    let mut prev = None;
    let mut id = 0;
    for i in 0..len {
        let mut header = BlockHeader::null();
        header.version = 1;
        header.time = 1_720_000_000 + (i as u32) * 64;
        header.bits = 0x1f00ffff;
        header.nonce = i as u32;
        if let Some(p) = prev {
            header.prev_hash = tree.get(p).hash;
        }
        let modifier = match prev {
            Some(p) => compute_stake_modifier(&tree.get(p).stake_modifier, &header.hash()),
            None => Hash256::ZERO,
        };
        id = tree.insert(&header, prev, 0, modifier);
        prev = Some(id);
    }
    tree.set_tip(id);
    (tree, id)
}

/// Wallet holding one enormous mature stake so the kernel test passes the
/// real V2 target deterministically.
fn staking_setup(stake: Amount) -> (StakingWallet, MapCoins, OutPoint) {
    let mut wallet = StakingWallet::new();
    let id = wallet.keystore.add_key(secret(b"flow"));
    let pubkey = wallet.keystore.get_pubkey(&id).unwrap();
    let script = Script::new_p2pk(&pubkey.serialize());

    let outpoint = OutPoint::new(Hash256::from_bytes([0x11; 32]), 0);
    wallet.add_coin(
        outpoint,
        WalletCoin {
            value: stake,
            script_pubkey: script.clone(),
            height: 0,
            is_coinbase: false,
            is_coinstake: false,
            safe: true,
        },
    );
    let coins = MapCoins(HashMap::from([(
        outpoint,
        Coin {
            value: stake,
            script_pubkey: script,
            height: 0,
            is_coinbase: false,
            is_coinstake: false,
        },
    )]));
    (wallet, coins, outpoint)
}

#[test]
fn staked_block_passes_full_validation() {
    let params = ChainParams::for_network("testnet").unwrap();
    let (tree, tip) = build_chain(12);
    // one hundred million coins of stake make the kernel a certainty
    let (mut wallet, coins, outpoint) = staking_setup(100_000_000 * COIN);
    let now = 1_725_000_000i64;

    let mut assembler =
        BlockAssembler::new(&params, &tree, &coins, AssemblerOptions::default());
    let mempool = TxMemPool::new();
    let (template, fees) = assembler
        .create_new_block(&mempool, tip, &Script::new(), Some(&mut wallet), None, now)
        .unwrap()
        .expect("a kernel for an overwhelming stake");
    assert_eq!(fees, 0);

    let mut block = template.block;
    assert!(block.is_proof_of_stake());
    assert_eq!(block.header.time & params.stake_timestamp_mask, 0);
    assert_eq!(block.header.time, block.txs[1].time);
    assert_eq!(block.txs[1].vin[0].prevout, outpoint);
    // the coinbase of a PoS block is empty
    assert!(block.txs[0].vout.iter().all(|out| out.value == 0));

    sign_block(&wallet.keystore, &mut block).unwrap();
    assert!(!block.block_sig.is_empty());

    let ctx = ValidationContext { params: &params, tree: &tree, coins: &coins, now };
    check_block(&block, Some(tip), &ctx, CheckOptions::default()).unwrap();
}

#[test]
fn tampered_stake_reward_is_rejected() {
    let params = ChainParams::for_network("testnet").unwrap();
    let (tree, tip) = build_chain(12);
    let (mut wallet, coins, _) = staking_setup(100_000_000 * COIN);
    let now = 1_725_000_000i64;

    let mut assembler =
        BlockAssembler::new(&params, &tree, &coins, AssemblerOptions::default());
    let mempool = TxMemPool::new();
    let (template, _) = assembler
        .create_new_block(&mempool, tip, &Script::new(), Some(&mut wallet), None, now)
        .unwrap()
        .expect("a kernel for an overwhelming stake");

    // pay out one extra satoshi of reward, then re-sign
    let mut block = template.block;
    let last = block.txs[1].vout.len() - 1;
    block.txs[1].vout[last].value += 1;
    block.header.merkle_root = block.merkle_root();
    sign_block(&wallet.keystore, &mut block).unwrap();

    let ctx = ValidationContext { params: &params, tree: &tree, coins: &coins, now };
    let result = check_block(&block, Some(tip), &ctx, CheckOptions::default());
    assert!(result.is_err());
}

#[test]
fn unsigned_stake_block_is_rejected() {
    let params = ChainParams::for_network("testnet").unwrap();
    let (tree, tip) = build_chain(12);
    let (mut wallet, coins, _) = staking_setup(100_000_000 * COIN);
    let now = 1_725_000_000i64;

    let mut assembler =
        BlockAssembler::new(&params, &tree, &coins, AssemblerOptions::default());
    let mempool = TxMemPool::new();
    let (template, _) = assembler
        .create_new_block(&mempool, tip, &Script::new(), Some(&mut wallet), None, now)
        .unwrap()
        .expect("a kernel for an overwhelming stake");

    let block = template.block;
    let ctx = ValidationContext { params: &params, tree: &tree, coins: &coins, now };
    assert!(check_block(&block, Some(tip), &ctx, CheckOptions::default()).is_err());
}

#[test]
fn second_template_round_waits_for_a_new_time_slot() {
    let params = ChainParams::for_network("testnet").unwrap();
    let (tree, tip) = build_chain(12);
    let (mut wallet, coins, _) = staking_setup(100_000_000 * COIN);
    let now = 1_725_000_000i64;

    let mempool = TxMemPool::new();
    let mut assembler =
        BlockAssembler::new(&params, &tree, &coins, AssemblerOptions::default());
    assert!(assembler
        .create_new_block(&mempool, tip, &Script::new(), Some(&mut wallet), None, now)
        .unwrap()
        .is_some());

    // the same masked second yields nothing: the search interval is spent
    let mut assembler =
        BlockAssembler::new(&params, &tree, &coins, AssemblerOptions::default());
    assert!(assembler
        .create_new_block(&mempool, tip, &Script::new(), Some(&mut wallet), None, now)
        .unwrap()
        .is_none());

    // sixteen seconds later the next slot opens
    let mut assembler =
        BlockAssembler::new(&params, &tree, &coins, AssemblerOptions::default());
    assert!(assembler
        .create_new_block(&mempool, tip, &Script::new(), Some(&mut wallet), None, now + 16)
        .unwrap()
        .is_some());
}
