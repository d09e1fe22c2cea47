//! Blocks and block headers.
//!
//! The header carries a `flags` word marking proof-of-stake blocks. The
//! flags are part of the wire format only when the peer negotiated the PoS
//! marker and are never part of the header hash; both conditions live in
//! the encode/decode schema here. Blocks additionally carry a signature
//! proving the staker controls the kernel output key.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::hashes::{scrypt_hash, sha256d_pair, Hash256};
use crate::serialize::{Decoder, Encoder, WireCodec};
use crate::transaction::{Transaction, WITNESS_SCALE_FACTOR};

/// Header flag bit marking a proof-of-stake block.
pub const BLOCK_FLAG_PROOF_OF_STAKE: u32 = 1 << 0;

/// Block header. 80 bytes when hashed; the `flags` word is appended on the
/// wire when the PoS marker is negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_hash: Hash256,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
    /// Index flags copied from the block index for headers-first sync.
    pub flags: u32,
}

impl BlockHeader {
    pub fn null() -> Self {
        BlockHeader {
            version: 0,
            prev_hash: Hash256::ZERO,
            merkle_root: Hash256::ZERO,
            time: 0,
            bits: 0,
            nonce: 0,
            flags: 0,
        }
    }

    /// A header with zero bits is the null sentinel.
    pub fn is_null(&self) -> bool {
        self.bits == 0
    }

    pub fn is_pos_flag(&self) -> bool {
        self.flags & BLOCK_FLAG_PROOF_OF_STAKE != 0
    }

    /// The 80-byte hashing serialization: flags never included.
    fn encode_for_hash(&self, enc: &mut Encoder) {
        enc.put_i32(self.version);
        enc.put_bytes(self.prev_hash.as_bytes());
        enc.put_bytes(self.merkle_root.as_bytes());
        enc.put_u32(self.time);
        enc.put_u32(self.bits);
        enc.put_u32(self.nonce);
    }

    /// Block identity hash: scrypt over the 80 hashing bytes. The mined
    /// digest and the identity are one and the same in this family.
    pub fn hash(&self) -> Hash256 {
        let mut enc = Encoder::with_capacity(80);
        self.encode_for_hash(&mut enc);
        scrypt_hash(&enc.into_bytes())
    }

    /// The proof-of-work hash; identical to the identity hash.
    pub fn pow_hash(&self) -> Hash256 {
        self.hash()
    }

    /// Wire encoding; `pos_marker` appends the flags word.
    pub fn encode_wire(&self, enc: &mut Encoder, pos_marker: bool) {
        self.encode_for_hash(enc);
        if pos_marker {
            enc.put_u32(self.flags);
        }
    }

    pub fn decode_wire(dec: &mut Decoder<'_>, pos_marker: bool) -> Result<Self> {
        let version = dec.get_i32()?;
        let prev_hash = Hash256::from_bytes(dec.get_array::<32>()?);
        let merkle_root = Hash256::from_bytes(dec.get_array::<32>()?);
        let time = dec.get_u32()?;
        let bits = dec.get_u32()?;
        let nonce = dec.get_u32()?;
        let flags = if pos_marker { dec.get_u32()? } else { 0 };
        Ok(BlockHeader { version, prev_hash, merkle_root, time, bits, nonce, flags })
    }
}

/// A full block: header, transactions, and the staker's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Transaction>,
    /// Signature over the block hash by the kernel output key; empty for
    /// proof-of-work blocks.
    pub block_sig: Vec<u8>,
}

impl Block {
    pub fn new(header: BlockHeader) -> Self {
        Block { header, txs: Vec::new(), block_sig: Vec::new() }
    }

    pub fn is_proof_of_stake(&self) -> bool {
        self.txs.len() > 1 && self.txs[1].is_coinstake()
    }

    pub fn is_proof_of_work(&self) -> bool {
        !self.is_proof_of_stake()
    }

    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Merkle root over the txids.
    pub fn merkle_root(&self) -> Hash256 {
        merkle_root(self.txs.iter().map(|tx| tx.txid()))
    }

    /// Merkle root over wtxids with the coinbase slot zeroed, for the
    /// witness commitment.
    pub fn witness_merkle_root(&self) -> Hash256 {
        merkle_root(
            self.txs
                .iter()
                .enumerate()
                .map(|(i, tx)| if i == 0 { Hash256::ZERO } else { tx.wtxid() }),
        )
    }

    pub fn weight(&self) -> usize {
        self.txs.iter().map(|tx| tx.weight()).sum::<usize>()
            + header_and_sig_overhead(self) * WITNESS_SCALE_FACTOR
    }

    /// Wire encoding; `pos_marker` controls the header flags word.
    pub fn encode_wire(&self, enc: &mut Encoder, pos_marker: bool) {
        self.header.encode_wire(enc, pos_marker);
        enc.put_compact_size(self.txs.len() as u64);
        for tx in &self.txs {
            tx.encode(enc);
        }
        enc.put_var_bytes(&self.block_sig);
    }

    pub fn decode_wire(dec: &mut Decoder<'_>, pos_marker: bool) -> Result<Self> {
        let header = BlockHeader::decode_wire(dec, pos_marker)?;
        let count = dec.get_compact_size()?;
        if count == 0 {
            return Err(CoreError::Decode("block with no transactions".into()));
        }
        let mut txs = Vec::with_capacity(count.min(4096) as usize);
        for _ in 0..count {
            txs.push(Transaction::decode(dec)?);
        }
        let block_sig = dec.get_var_bytes()?;
        Ok(Block { header, txs, block_sig })
    }
}

impl WireCodec for Block {
    fn encode(&self, enc: &mut Encoder) {
        self.encode_wire(enc, true);
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        Self::decode_wire(dec, true)
    }
}

fn header_and_sig_overhead(block: &Block) -> usize {
    // header + tx count + signature length prefix and bytes
    let mut enc = Encoder::new();
    block.header.encode_wire(&mut enc, false);
    enc.put_compact_size(block.txs.len() as u64);
    enc.put_var_bytes(&block.block_sig);
    enc.len()
}

/// Standard pairwise merkle tree; an odd node is paired with itself.
pub fn merkle_root(hashes: impl Iterator<Item = Hash256>) -> Hash256 {
    let mut level: Vec<[u8; 32]> = hashes.map(|h| *h.as_bytes()).collect();
    if level.is_empty() {
        return Hash256::ZERO;
    }
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = &pair[0];
            let right = if pair.len() == 2 { &pair[1] } else { &pair[0] };
            next.push(*sha256d_pair(left, right).as_bytes());
        }
        level = next;
    }
    Hash256::from_bytes(level[0])
}
