//! Handler-level tests of the staking RPC surface.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sable_consensus::chain::BlockTree;
use sable_consensus::kernel::{Coin, CoinView};
use sable_consensus::params::ChainParams;
use sable_core::amount::COIN;
use sable_core::block::{Block, BlockHeader};
use sable_core::hashes::Hash256;
use sable_core::transaction::OutPoint;
use sable_node::mempool::TxMemPool;
use sable_node::staker::{BlockSink, NodeState};
use sable_rpc::rpc::CheckKernelOutpoint;
use sable_rpc::{StakingRpcImpl, StakingRpcServer};
use sable_wallet::StakingWallet;

struct MapCoins(HashMap<OutPoint, Coin>);

impl CoinView for MapCoins {
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.0.get(outpoint).cloned()
    }
}

struct MockSink {
    peers: usize,
    initial_download: bool,
}

impl BlockSink for MockSink {
    fn process_new_block(&self, _block: Block) -> bool {
        true
    }
    fn node_count(&self) -> usize {
        self.peers
    }
    fn is_initial_block_download(&self) -> bool {
        self.initial_download
    }
    fn is_importing_or_reindexing(&self) -> bool {
        false
    }
    fn verification_progress(&self) -> f64 {
        1.0
    }
    fn adjusted_now(&self) -> i64 {
        1_725_000_000
    }
}

fn rpc_fixture(
    params: ChainParams,
    sink: MockSink,
) -> StakingRpcImpl<MapCoins, MockSink> {
    let mut tree = BlockTree::new();
    let mut prev = None;
    let mut id = 0;
    for i in 0..3u32 {
        let mut header = BlockHeader::null();
        header.version = 1;
        header.time = 1_720_000_000 + i * 64;
        header.bits = 0x1f00ffff;
        header.nonce = i;
        if let Some(p) = prev {
            header.prev_hash = tree.get(p).hash;
        }
        id = tree.insert(&header, prev, 0, Hash256::ZERO);
        prev = Some(id);
    }
    tree.set_tip(id);

    StakingRpcImpl {
        params: Arc::new(params),
        state: Arc::new(Mutex::new(NodeState {
            tree,
            mempool: TxMemPool::new(),
            coins: MapCoins(HashMap::new()),
        })),
        wallet: Arc::new(Mutex::new(StakingWallet::new())),
        sink: Arc::new(sink),
        staking_arg: true,
    }
}

fn error_code(err: jsonrpsee::core::Error) -> i32 {
    match err {
        jsonrpsee::core::Error::Call(call) => {
            let obj: jsonrpsee::types::error::ErrorObjectOwned = call.into();
            obj.code()
        }
        other => panic!("unexpected error shape: {other}"),
    }
}

#[tokio::test]
async fn staking_info_reports_idle_wallet() {
    let rpc = rpc_fixture(
        ChainParams::for_network("regtest").unwrap(),
        MockSink { peers: 0, initial_download: false },
    );
    let info = rpc.get_staking_info().await.unwrap();
    assert_eq!(info["staking"], false);
    assert_eq!(info["blocks"], 2);
    assert_eq!(info["weight"], 0);
    assert_eq!(info["chain"], "regtest");
    assert_eq!(info["expectedtime"], 0);
}

#[tokio::test]
async fn staking_switch_requires_keys() {
    let rpc = rpc_fixture(
        ChainParams::for_network("regtest").unwrap(),
        MockSink { peers: 0, initial_download: false },
    );
    // empty keypool refuses to start
    let err = rpc.staking(Some(true)).await.unwrap_err();
    assert_eq!(error_code(err), -4);

    rpc.wallet.lock().unwrap().keystore.generate_key();
    let status = rpc.staking(Some(true)).await.unwrap();
    assert_eq!(status["staking"], true);

    let status = rpc.staking(Some(false)).await.unwrap();
    assert_eq!(status["staking"], false);

    // a blank wallet names its condition
    rpc.wallet.lock().unwrap().blank = true;
    let err = rpc.staking(Some(true)).await.unwrap_err();
    assert_eq!(error_code(err), -4);
}

#[tokio::test]
async fn reserve_balance_rounds_and_validates() {
    let rpc = rpc_fixture(
        ChainParams::for_network("regtest").unwrap(),
        MockSink { peers: 0, initial_download: false },
    );
    // rounds down to the cent
    let result = rpc.reserve_balance(Some(true), Some(1.2345678)).await.unwrap();
    assert_eq!(result["reserve"], true);
    assert_eq!(result["amount"], 1.23);
    {
        let wallet = rpc.wallet.lock().unwrap();
        assert_eq!(wallet.reserve_balance % 1_000_000, 0);
        assert_eq!(wallet.reserve_balance, 123 * COIN / 100);
    }

    let err = rpc.reserve_balance(Some(true), Some(-1.0)).await.unwrap_err();
    assert_eq!(error_code(err), -8);

    let err = rpc.reserve_balance(Some(true), None).await.unwrap_err();
    assert_eq!(error_code(err), -8);

    let result = rpc.reserve_balance(Some(false), None).await.unwrap();
    assert_eq!(result["reserve"], false);
    assert_eq!(result["amount"], 0.0);
}

#[tokio::test]
async fn checkkernel_gates_on_connectivity() {
    // a peerless non-regtest node is refused
    let rpc = rpc_fixture(
        ChainParams::for_network("testnet").unwrap(),
        MockSink { peers: 0, initial_download: false },
    );
    let err = rpc.check_kernel(vec![], None).await.unwrap_err();
    assert_eq!(error_code(err), -9);

    // syncing nodes are refused with their own code
    let rpc = rpc_fixture(
        ChainParams::for_network("testnet").unwrap(),
        MockSink { peers: 3, initial_download: true },
    );
    let err = rpc.check_kernel(vec![], None).await.unwrap_err();
    assert_eq!(error_code(err), -10);
}

#[tokio::test]
async fn checkkernel_probes_outpoints() {
    let rpc = rpc_fixture(
        ChainParams::for_network("regtest").unwrap(),
        MockSink { peers: 0, initial_download: false },
    );
    // unknown outpoint: no kernel
    let result = rpc
        .check_kernel(
            vec![CheckKernelOutpoint { txid: Hash256::from_bytes([9; 32]).to_hex(), vout: 0 }],
            None,
        )
        .await
        .unwrap();
    assert_eq!(result["found"], false);

    // malformed txid is an invalid parameter
    let err = rpc
        .check_kernel(vec![CheckKernelOutpoint { txid: "zz".into(), vout: 0 }], None)
        .await
        .unwrap_err();
    assert_eq!(error_code(err), -8);
}
