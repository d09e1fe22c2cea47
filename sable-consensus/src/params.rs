//! Per-network chain parameters.
//!
//! One read-only value object per network, produced by [`ChainParams::for_network`]
//! at startup and passed by reference into every consensus subsystem. The
//! protocol-version predicates on this type are the single source of truth
//! for every time-gated rule; branching on the raw gate constants anywhere
//! else is a bug.

use std::collections::BTreeMap;

use primitive_types::U256;
use sha2::{Digest, Sha256};

use sable_core::arith::u256_from_be_hex;
use sable_core::block::{Block, BlockHeader};
use sable_core::hashes::{sha256d, Hash256};
use sable_core::script::Script;
use sable_core::serialize::Encoder;
use sable_core::transaction::{OutPoint, Transaction, TxInput, TxOutput};

use crate::error::ParamsError;

/// Named networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Main,
    Testnet,
    Testnet4,
    Signet,
    Regtest,
}

impl Network {
    pub fn name(&self) -> &'static str {
        match self {
            Network::Main => "main",
            Network::Testnet => "testnet",
            Network::Testnet4 => "testnet4",
            Network::Signet => "signet",
            Network::Regtest => "regtest",
        }
    }

    pub fn from_name(name: &str) -> Option<Network> {
        match name {
            "main" => Some(Network::Main),
            "test" | "testnet" => Some(Network::Testnet),
            "testnet4" => Some(Network::Testnet4),
            "signet" => Some(Network::Signet),
            "regtest" => Some(Network::Regtest),
            _ => None,
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Version-bits deployment slots.
pub const DEPLOYMENT_TESTDUMMY: usize = 0;
pub const DEPLOYMENT_SEGWIT: usize = 1;
pub const DEPLOYMENT_TAPROOT: usize = 2;
pub const MAX_DEPLOYMENTS: usize = 3;

/// Start-time sentinel: never signalled.
pub const NEVER_ACTIVE: i64 = -2;
/// Start-time sentinel: active from genesis.
pub const ALWAYS_ACTIVE: i64 = -1;
/// Timeout sentinel: no expiry.
pub const NO_TIMEOUT: i64 = i64::MAX;

/// One BIP9-style rule change.
#[derive(Debug, Clone, Copy)]
pub struct Bip9Deployment {
    /// Bit position in the block version.
    pub bit: u8,
    /// Median-time start of the signalling window.
    pub start_time: i64,
    /// Median-time expiry of the attempt.
    pub timeout: i64,
}

impl Bip9Deployment {
    const fn never(bit: u8) -> Self {
        Bip9Deployment { bit, start_time: NEVER_ACTIVE, timeout: NO_TIMEOUT }
    }
}

/// Consensus and network constants for one chain.
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub network: Network,
    pub message_magic: [u8; 4],
    pub default_port: u16,

    pub pow_limit: U256,
    pub pos_limit: U256,
    pub pos_limit_v2: U256,
    pub target_timespan: i64,
    pub target_spacing_v1: i64,
    pub target_spacing: i64,
    pub pow_allow_min_difficulty_blocks: bool,
    pub enforce_bip94: bool,
    pub pow_no_retargeting: bool,
    pub pos_no_retargeting: bool,

    pub rule_change_activation_threshold: u32,
    pub miner_confirmation_window: u32,
    pub deployments: [Bip9Deployment; MAX_DEPLOYMENTS],
    /// Buried deployment heights; `i32::MAX` means not buried.
    pub csv_height: i32,
    pub segwit_height: i32,

    pub protocol_v1_retarget_time: i64,
    pub protocol_v2_time: i64,
    pub protocol_v3_time: i64,
    pub protocol_v3_1_time: i64,
    /// Historical exact-match skip for the V3.1 gate; per network.
    pub protocol_v3_1_skip: i64,

    pub last_pow_block: i32,
    pub stake_timestamp_mask: u32,
    pub coinbase_maturity: i32,
    pub minimum_chain_work: U256,
    pub max_reorganization_depth: i32,

    pub genesis: Block,
    pub genesis_hash: Hash256,
    pub checkpoints: BTreeMap<i32, Hash256>,

    pub base58_pubkey_prefix: u8,
    pub base58_script_prefix: u8,
    pub base58_secret_prefix: u8,
    pub ext_public_key_prefix: [u8; 4],
    pub ext_secret_key_prefix: [u8; 4],
    pub bech32_hrp: &'static str,
    pub dns_seeds: Vec<&'static str>,
    pub dev_fund_address: Option<&'static str>,

    /// Signet produces PoW blocks from an authorized signer; staking is off.
    pub signet_blocks: bool,
    pub signet_challenge: Vec<u8>,
    /// Regtest: blocks are mined on demand, no peers required.
    pub mine_blocks_on_demand: bool,
    pub mining_requires_peers: bool,
}

/// Options for networks that are not constructible from a bare name.
#[derive(Debug, Clone, Default)]
pub struct NetworkOptions {
    /// Testnet4's genesis is not finalized upstream; it stays opt-in.
    pub testnet4: bool,
    /// Override of the signet challenge script.
    pub signet_challenge: Option<Vec<u8>>,
}

// Historical exact-match skips in the protocol gates. These blocks carried
// times equal to the gate comparison values and must keep validating the
// same way they always have.
const V1_RETARGET_SKIP: i64 = 1395631999;
const V2_SKIP: i64 = 1407053678;
const V3_SKIP: i64 = 1444028400;

const GENESIS_TIMESTAMP: &str = "20 Feb 2014 Bitcoin ATMs come to USA";
const GENESIS_OUTPUT_KEY: &str = "04678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5f";

impl ChainParams {
    /// Parameters for a named network. `testnet4` and custom signet
    /// challenges go through [`ChainParams::for_network_with`].
    pub fn for_network(name: &str) -> Result<ChainParams, ParamsError> {
        Self::for_network_with(name, NetworkOptions::default())
    }

    pub fn for_network_with(
        name: &str,
        options: NetworkOptions,
    ) -> Result<ChainParams, ParamsError> {
        let network = Network::from_name(name)
            .ok_or_else(|| ParamsError::UnknownNetwork(name.to_string()))?;
        match network {
            Network::Main => Ok(main_params()),
            Network::Testnet => Ok(testnet_params()),
            Network::Testnet4 => {
                if options.testnet4 {
                    Ok(testnet4_params())
                } else {
                    // genesis assertions are still commented out upstream
                    Err(ParamsError::UnknownNetwork(name.to_string()))
                }
            }
            Network::Signet => Ok(signet_params(options.signet_challenge)),
            Network::Regtest => Ok(regtest_params()),
        }
    }

    /// V1 retargeting fix: negative spacing is clamped from this time on.
    pub fn is_protocol_v1_retarget_fixed(&self, time: i64) -> bool {
        time > self.protocol_v1_retarget_time && time != V1_RETARGET_SKIP
    }

    /// V2: 64-second spacing, the V2 PoS limit and the timestamp mask.
    pub fn is_protocol_v2(&self, time: i64) -> bool {
        time > self.protocol_v2_time && time != V2_SKIP
    }

    /// V3: kernel-hash format and the upper retarget clamp.
    pub fn is_protocol_v3(&self, time: i64) -> bool {
        time > self.protocol_v3_time && time != V3_SKIP
    }

    /// V3.1: fee schedule change.
    pub fn is_protocol_v3_1(&self, time: i64) -> bool {
        time > self.protocol_v3_1_time && time != self.protocol_v3_1_skip
    }

    /// Target block spacing at the given time.
    pub fn target_spacing_at(&self, time: i64) -> i64 {
        if self.is_protocol_v2(time) {
            self.target_spacing
        } else {
            self.target_spacing_v1
        }
    }

    /// Blocks per retarget interval.
    pub fn difficulty_adjustment_interval(&self) -> i64 {
        self.target_timespan / self.target_spacing
    }

    /// The dev-fund payout script, derived once from the first configured
    /// address; empty when the network has no dev fund.
    pub fn dev_reward_script(&self) -> Script {
        let Some(address) = self.dev_fund_address else {
            return Script::new();
        };
        match base58check_decode(address) {
            Some(payload) if payload.len() == 21 => {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(&payload[1..21]);
                if payload[0] == self.base58_script_prefix {
                    Script::new_p2sh(&hash)
                } else {
                    Script::new_p2pkh(&hash)
                }
            }
            _ => {
                log::warn!("dev fund address {address} did not decode; dev reward disabled");
                Script::new()
            }
        }
    }
}

/// Map a wire magic back to its network. Signet is covered for the default
/// challenge only; custom signets have caller-known magics.
pub fn network_for_magic(magic: [u8; 4]) -> Option<Network> {
    match magic {
        [0x70, 0x35, 0x22, 0x05] => Some(Network::Main),
        [0xcd, 0xf2, 0xc0, 0xef] => Some(Network::Testnet),
        [0x1c, 0x16, 0x3f, 0x28] => Some(Network::Testnet4),
        [0x70, 0x35, 0x22, 0x06] => Some(Network::Regtest),
        other => {
            if other == signet_magic(&default_signet_challenge()) {
                Some(Network::Signet)
            } else {
                None
            }
        }
    }
}

/// Build the genesis block shared by every network (modulo time/nonce/bits).
///
/// The output script is accepted for parity with the historical builder but
/// the genesis output itself stays empty: it was never spendable on any
/// chain of this family.
fn build_genesis(
    timestamp: &str,
    _output_script: Script,
    time: u32,
    nonce: u32,
    bits: u32,
    version: i32,
    reward: i64,
) -> Block {
    let mut coinbase = Transaction::new();
    coinbase.version = 1;
    coinbase.time = time;
    let mut script_sig = Script::new();
    script_sig.push_int(0).push_int(42).push_data(timestamp.as_bytes());
    let mut input = TxInput::new(OutPoint::null());
    input.script_sig = script_sig;
    coinbase.vin.push(input);
    coinbase.vout.push(TxOutput::new(reward, Script::new()));

    let mut block = Block::new(BlockHeader {
        version,
        prev_hash: Hash256::ZERO,
        merkle_root: Hash256::ZERO,
        time,
        bits,
        nonce,
        flags: 0,
    });
    block.txs.push(coinbase);
    block.header.merkle_root = block.merkle_root();
    block
}

fn sable_genesis(time: u32, nonce: u32, bits: u32, version: i32, reward: i64) -> Block {
    let key = hex::decode(GENESIS_OUTPUT_KEY).expect("valid key hex");
    build_genesis(GENESIS_TIMESTAMP, Script::new_p2pk(&key), time, nonce, bits, version, reward)
}

fn checkpoint(height: i32, hash: &str) -> (i32, Hash256) {
    (height, Hash256::from_hex(hash).expect("valid checkpoint hash"))
}

fn standard_deployments() -> [Bip9Deployment; MAX_DEPLOYMENTS] {
    [
        Bip9Deployment::never(28), // test dummy
        Bip9Deployment::never(1),  // segwit
        Bip9Deployment::never(2),  // taproot
    ]
}

fn main_params() -> ChainParams {
    let genesis = sable_genesis(1393221600, 164482, 0x1e0fffff, 1, 0);
    let genesis_hash = genesis.hash();
    ChainParams {
        network: Network::Main,
        message_magic: [0x70, 0x35, 0x22, 0x05],
        default_port: 15714,

        pow_limit: u256_from_be_hex(
            "00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        ),
        pos_limit: u256_from_be_hex(
            "00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        ),
        pos_limit_v2: u256_from_be_hex(
            "000000000000ffffffffffffffffffffffffffffffffffffffffffffffffffff",
        ),
        target_timespan: 16 * 60,
        target_spacing_v1: 60,
        target_spacing: 64,
        pow_allow_min_difficulty_blocks: false,
        enforce_bip94: false,
        pow_no_retargeting: false,
        pos_no_retargeting: false,

        rule_change_activation_threshold: 12_000, // 80% of 15000
        miner_confirmation_window: 15_000,
        deployments: standard_deployments(),
        csv_height: 4_908_715,
        segwit_height: i32::MAX,

        protocol_v1_retarget_time: 1395631999,
        protocol_v2_time: 1407053625,
        protocol_v3_time: 1444028400,
        protocol_v3_1_time: 1713938400,
        protocol_v3_1_skip: 1713938400,

        last_pow_block: 10_000,
        stake_timestamp_mask: 0xf,
        coinbase_maturity: 500,
        minimum_chain_work: u256_from_be_hex(
            "00000000000000000000000000000000000000000000043c846cfe732c8b6dbc",
        ),
        max_reorganization_depth: 500,

        genesis,
        genesis_hash,
        checkpoints: BTreeMap::from([
            checkpoint(5001, "2fac9021be0c311e7b6dc0933a72047c70f817e2eb1e01bede011193ad1b28bc"),
            checkpoint(10000, "0000000000827e4dc601f7310a91c45af8df0dfc1b6fa1dfa5b896cb00c8767c"),
            checkpoint(38425, "62bf2e9701226d2f88d9fa99d650bd81f3faf2e56f305b7d71ccd1e7aa9c3075"),
            checkpoint(254348, "9bf8d9bd757d3ef23d5906d70567e5f0da93f1e0376588c8d421a95e2421838b"),
            checkpoint(319002, "0011494d03b2cdf1ecfc8b0818f1e0ef7ee1d9e9b3d1279c10d35456bc3899ef"),
            checkpoint(872456, "e4fd321ced1de06213d2e246b150b4bfd8c4aa0989965dce88f2a58668c64860"),
            checkpoint(4232630, "ae0c2a9bd13746e2887ca57bf1046b3c787a5ed1068fd1633a3575f08ee291fc"),
            checkpoint(4908715, "6f8e37e21aa2fba3f8e2d6825cb825ca290e9367ed08b8c30943bc16efcba119"),
        ]),

        base58_pubkey_prefix: 25,
        base58_script_prefix: 85,
        base58_secret_prefix: 153,
        ext_public_key_prefix: [0x04, 0x88, 0xb2, 0x1e],
        ext_secret_key_prefix: [0x04, 0x88, 0xad, 0xe4],
        bech32_hrp: "blk",
        dns_seeds: vec![
            "dnsseed.blackcoin.nl",
            "dnsseed2.blackcoin.nl",
            "swap.blackcoin.nl",
            "dns2.blackcoin.nl",
        ],
        dev_fund_address: Some("BKDvboD1CzZ5KycP1FRSXRoi7XXhHoQhS1"),

        signet_blocks: false,
        signet_challenge: Vec::new(),
        mine_blocks_on_demand: false,
        mining_requires_peers: true,
    }
}

fn testnet_params() -> ChainParams {
    let genesis = sable_genesis(1393221600, 216178, 0x1f00ffff, 1, 0);
    let genesis_hash = genesis.hash();
    let mut deployments = standard_deployments();
    deployments[DEPLOYMENT_SEGWIT].start_time = 1727100000; // September 23, 2024
    ChainParams {
        network: Network::Testnet,
        message_magic: [0xcd, 0xf2, 0xc0, 0xef],
        default_port: 25714,

        pow_limit: u256_from_be_hex(
            "0000ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        ),
        pos_limit: u256_from_be_hex(
            "00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        ),
        pos_limit_v2: u256_from_be_hex(
            "000000000000ffffffffffffffffffffffffffffffffffffffffffffffffffff",
        ),
        target_timespan: 16 * 60,
        target_spacing_v1: 60,
        target_spacing: 64,
        pow_allow_min_difficulty_blocks: true,
        enforce_bip94: false,
        pow_no_retargeting: false,
        pos_no_retargeting: false,

        rule_change_activation_threshold: 11_250, // 75% for testchains
        miner_confirmation_window: 15_000,
        deployments,
        csv_height: 1_320_664,
        segwit_height: i32::MAX,

        protocol_v1_retarget_time: 1395631999,
        protocol_v2_time: 1407053625,
        protocol_v3_time: 1444028400,
        protocol_v3_1_time: 1667779200,
        protocol_v3_1_skip: 1667779200,

        last_pow_block: i32::MAX,
        stake_timestamp_mask: 0xf,
        coinbase_maturity: 10,
        minimum_chain_work: u256_from_be_hex(
            "00000000000000000000000000000000000000000000005bcd58fc08c1b0ec53",
        ),
        max_reorganization_depth: 500,

        genesis,
        genesis_hash,
        checkpoints: BTreeMap::from([
            checkpoint(90235, "567898e79184dc2f7dc3a661f794f28566e4b856d70180914f7371b1b3cc82d8"),
            checkpoint(1320664, "64fa6a5414c6797629d34ef150c46486a5e1d49d2bceb87d6da14a501f838afd"),
            checkpoint(1415393, "5d5c42500cc6057533e249ba9eeb9b5e998aff30468c904bc267ec9bccbc8b39"),
        ]),

        base58_pubkey_prefix: 111,
        base58_script_prefix: 196,
        base58_secret_prefix: 239,
        ext_public_key_prefix: [0x04, 0x35, 0x87, 0xcf],
        ext_secret_key_prefix: [0x04, 0x35, 0x83, 0x94],
        bech32_hrp: "tblk",
        dns_seeds: vec![
            "swap.blackcoin.nl",
            "dns2.blackcoin.nl",
            "dnsseed.blackcoin.nl",
            "dnsseed2.blackcoin.nl",
        ],
        dev_fund_address: Some("n14L5xqAs7QRzNiTLPNaPeqaF9CRoxzVnU"),

        signet_blocks: false,
        signet_challenge: Vec::new(),
        mine_blocks_on_demand: false,
        mining_requires_peers: true,
    }
}

fn testnet4_params() -> ChainParams {
    // Testnet4 is not finalized upstream: the genesis hash is still
    // unasserted and the PoS limits mirror testnet until the reset lands.
    let output_key = hex::decode(
        "000000000000000000000000000000000000000000000000000000000000000000",
    )
    .expect("valid key hex");
    let genesis = build_genesis(
        "03/May/2024 000000000000000000001ebd58c244970b3aa9d783bb001011fbe8ea8e98e00e",
        Script::new_p2pk(&output_key),
        1714777860,
        393743547,
        0x1d00ffff,
        1,
        50 * sable_core::amount::COIN,
    );
    let genesis_hash = genesis.hash();
    let mut deployments = standard_deployments();
    deployments[DEPLOYMENT_TAPROOT].start_time = ALWAYS_ACTIVE;
    ChainParams {
        network: Network::Testnet4,
        message_magic: [0x1c, 0x16, 0x3f, 0x28],
        default_port: 48333,

        pow_limit: u256_from_be_hex(
            "00000000ffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        ),
        pos_limit: u256_from_be_hex(
            "00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        ),
        pos_limit_v2: u256_from_be_hex(
            "000000000000ffffffffffffffffffffffffffffffffffffffffffffffffffff",
        ),
        target_timespan: 16 * 60,
        target_spacing_v1: 64,
        target_spacing: 64,
        pow_allow_min_difficulty_blocks: true,
        enforce_bip94: true,
        pow_no_retargeting: false,
        pos_no_retargeting: false,

        rule_change_activation_threshold: 1512,
        miner_confirmation_window: 2016,
        deployments,
        csv_height: 1,
        segwit_height: 1,

        protocol_v1_retarget_time: 1395631999,
        protocol_v2_time: 1407053625,
        protocol_v3_time: 1444028400,
        protocol_v3_1_time: 1667779200,
        protocol_v3_1_skip: 1667779200,

        last_pow_block: i32::MAX,
        stake_timestamp_mask: 0xf,
        coinbase_maturity: 10,
        minimum_chain_work: u256_from_be_hex(
            "00000000000000000000000000000000000000000000005faa15d02e6202f3ba",
        ),
        max_reorganization_depth: 500,

        genesis,
        genesis_hash,
        checkpoints: BTreeMap::new(),

        base58_pubkey_prefix: 111,
        base58_script_prefix: 196,
        base58_secret_prefix: 239,
        ext_public_key_prefix: [0x04, 0x35, 0x87, 0xcf],
        ext_secret_key_prefix: [0x04, 0x35, 0x83, 0x94],
        bech32_hrp: "tb",
        dns_seeds: vec![],
        dev_fund_address: None,

        signet_blocks: false,
        signet_challenge: Vec::new(),
        mine_blocks_on_demand: false,
        mining_requires_peers: true,
    }
}

fn default_signet_challenge() -> Vec<u8> {
    hex::decode(
        "512103ad5e0edad18cb1f0fc0d28a3d4f1f3e445640337489abb10404f2d1e086be430210359ef5021964fe22d6f8e05b2463c9540ce96883fe3b278760f048f5189f2e6c452ae",
    )
    .expect("valid challenge hex")
}

/// First four bytes of SHA256d over the serialized challenge script.
fn signet_magic(challenge: &[u8]) -> [u8; 4] {
    let mut enc = Encoder::new();
    enc.put_var_bytes(challenge);
    let hash = sha256d(&enc.into_bytes());
    let mut magic = [0u8; 4];
    magic.copy_from_slice(&hash.as_bytes()[0..4]);
    magic
}

fn signet_params(challenge: Option<Vec<u8>>) -> ChainParams {
    let challenge = challenge.unwrap_or_else(default_signet_challenge);
    if challenge != default_signet_challenge() {
        log::info!("signet with challenge {}", hex::encode(&challenge));
    }
    let genesis = sable_genesis(1393221600, 216178, 0x1f00ffff, 1, 0);
    let genesis_hash = genesis.hash();
    let message_magic = signet_magic(&challenge);
    ChainParams {
        network: Network::Signet,
        message_magic,
        default_port: 45714,

        pow_limit: u256_from_be_hex(
            "0000ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        ),
        pos_limit: u256_from_be_hex(
            "00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        ),
        pos_limit_v2: u256_from_be_hex(
            "000000000000ffffffffffffffffffffffffffffffffffffffffffffffffffff",
        ),
        target_timespan: 16 * 60,
        target_spacing_v1: 64,
        target_spacing: 64,
        pow_allow_min_difficulty_blocks: false,
        enforce_bip94: false,
        pow_no_retargeting: false,
        pos_no_retargeting: false,

        rule_change_activation_threshold: 12_000,
        miner_confirmation_window: 15_000,
        deployments: standard_deployments(),
        csv_height: 1,
        segwit_height: 1,

        protocol_v1_retarget_time: 1707168541,
        protocol_v2_time: 1707168542,
        protocol_v3_time: 1707168543,
        protocol_v3_1_time: 1707168544,
        protocol_v3_1_skip: 1707168544,

        last_pow_block: i32::MAX,
        stake_timestamp_mask: 0xf,
        coinbase_maturity: 10,
        minimum_chain_work: U256::zero(),
        max_reorganization_depth: 500,

        genesis,
        genesis_hash,
        checkpoints: BTreeMap::new(),

        base58_pubkey_prefix: 111,
        base58_script_prefix: 196,
        base58_secret_prefix: 239,
        ext_public_key_prefix: [0x04, 0x88, 0xb2, 0x1e],
        ext_secret_key_prefix: [0x04, 0x88, 0xad, 0xe4],
        bech32_hrp: "tblk",
        dns_seeds: vec![],
        dev_fund_address: None,

        signet_blocks: true,
        signet_challenge: challenge,
        mine_blocks_on_demand: false,
        mining_requires_peers: true,
    }
}

fn regtest_params() -> ChainParams {
    let genesis = sable_genesis(1393221600, 216178, 0x1f00ffff, 1, 0);
    let genesis_hash = genesis.hash();
    let mut deployments = standard_deployments();
    deployments[DEPLOYMENT_TESTDUMMY].start_time = 0;
    deployments[DEPLOYMENT_SEGWIT].start_time = ALWAYS_ACTIVE;
    ChainParams {
        network: Network::Regtest,
        message_magic: [0x70, 0x35, 0x22, 0x06],
        default_port: 35714,

        pow_limit: u256_from_be_hex(
            "7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        ),
        pos_limit: u256_from_be_hex(
            "00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        ),
        pos_limit_v2: u256_from_be_hex(
            "000000000000ffffffffffffffffffffffffffffffffffffffffffffffffffff",
        ),
        target_timespan: 16 * 60,
        target_spacing_v1: 64,
        target_spacing: 64,
        pow_allow_min_difficulty_blocks: true,
        enforce_bip94: true,
        pow_no_retargeting: true,
        pos_no_retargeting: true,

        rule_change_activation_threshold: 120, // 80% for regtest
        miner_confirmation_window: 150,
        deployments,
        csv_height: 1,
        segwit_height: 1,

        protocol_v1_retarget_time: 1395631999,
        protocol_v2_time: 1407053625,
        protocol_v3_time: 1444028400,
        protocol_v3_1_time: 1713938400,
        protocol_v3_1_skip: 1713938400,

        last_pow_block: i32::MAX,
        stake_timestamp_mask: 0xf,
        coinbase_maturity: 10,
        minimum_chain_work: U256::zero(),
        max_reorganization_depth: 50,

        genesis,
        genesis_hash,
        checkpoints: BTreeMap::from([checkpoint(
            0,
            "0000724595fb3b9609d441cbfb9577615c292abf07d996d3edabc48de843642d",
        )]),

        base58_pubkey_prefix: 111,
        base58_script_prefix: 196,
        base58_secret_prefix: 239,
        ext_public_key_prefix: [0x04, 0x88, 0xb2, 0x1e],
        ext_secret_key_prefix: [0x04, 0x88, 0xad, 0xe4],
        bech32_hrp: "blrt",
        dns_seeds: vec![],
        dev_fund_address: None,

        signet_blocks: false,
        signet_challenge: Vec::new(),
        mine_blocks_on_demand: true,
        mining_requires_peers: false,
    }
}

const BASE58_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Base58Check decode; returns the payload with its version byte.
fn base58check_decode(input: &str) -> Option<Vec<u8>> {
    let mut num: Vec<u8> = vec![0];
    for ch in input.bytes() {
        let digit = BASE58_ALPHABET.iter().position(|&c| c == ch)? as u32;
        let mut carry = digit;
        for byte in num.iter_mut().rev() {
            let value = (*byte as u32) * 58 + carry;
            *byte = (value & 0xff) as u8;
            carry = value >> 8;
        }
        while carry > 0 {
            num.insert(0, (carry & 0xff) as u8);
            carry >>= 8;
        }
    }
    let leading_ones = input.bytes().take_while(|&c| c == b'1').count();
    let first_nonzero = num.iter().position(|&b| b != 0).unwrap_or(num.len());
    let mut bytes = vec![0u8; leading_ones];
    bytes.extend_from_slice(&num[first_nonzero..]);

    if bytes.len() < 4 {
        return None;
    }
    let (payload, checksum) = bytes.split_at(bytes.len() - 4);
    let digest = Sha256::digest(Sha256::digest(payload));
    if &digest[0..4] != checksum {
        return None;
    }
    Some(payload.to_vec())
}
