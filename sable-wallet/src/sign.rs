//! Transaction and block signing.
//!
//! Legacy inputs sign over the classic blanked-scripts digest; v0 witness
//! key-hash inputs use the amount-committing digest with the transaction
//! timestamp serialized right after the version, as everywhere else in
//! this chain's format.

use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey, Signing};

use sable_core::amount::Amount;
use sable_core::block::Block;
use sable_core::hashes::{sha256d, Hash256};
use sable_core::script::{Script, TxoutType};
use sable_core::serialize::Encoder;
use sable_core::transaction::{Transaction, SIGHASH_ALL};

use crate::keystore::KeyStore;

/// DER signature plus the appended hash-type byte.
fn encode_signature(signature: &Signature) -> Vec<u8> {
    let mut bytes = signature.serialize_der().to_vec();
    bytes.push(SIGHASH_ALL as u8);
    bytes
}

fn sign_digest<C: Signing>(
    secp: &Secp256k1<C>,
    digest: &Hash256,
    secret: &SecretKey,
) -> Result<Signature, String> {
    let message = Message::from_digest_slice(digest.as_bytes()).map_err(|e| e.to_string())?;
    Ok(secp.sign_ecdsa(&message, secret))
}

/// Amount-committing digest for v0 witness key-hash spends.
fn witness_v0_sighash(
    tx: &Transaction,
    input_index: usize,
    key_hash: &[u8; 20],
    amount: Amount,
) -> Hash256 {
    let hash_prevouts = {
        let mut enc = Encoder::new();
        for input in &tx.vin {
            enc.put_bytes(input.prevout.txid.as_bytes());
            enc.put_u32(input.prevout.vout);
        }
        sha256d(&enc.into_bytes())
    };
    let hash_sequence = {
        let mut enc = Encoder::new();
        for input in &tx.vin {
            enc.put_u32(input.sequence);
        }
        sha256d(&enc.into_bytes())
    };
    let hash_outputs = {
        let mut enc = Encoder::new();
        for output in &tx.vout {
            enc.put_i64(output.value);
            enc.put_var_bytes(output.script_pubkey.as_bytes());
        }
        sha256d(&enc.into_bytes())
    };

    let input = &tx.vin[input_index];
    let script_code = Script::new_p2pkh(key_hash);

    let mut enc = Encoder::new();
    enc.put_i32(tx.version);
    enc.put_u32(tx.time);
    enc.put_bytes(hash_prevouts.as_bytes());
    enc.put_bytes(hash_sequence.as_bytes());
    enc.put_bytes(input.prevout.txid.as_bytes());
    enc.put_u32(input.prevout.vout);
    enc.put_var_bytes(script_code.as_bytes());
    enc.put_i64(amount);
    enc.put_u32(input.sequence);
    enc.put_bytes(hash_outputs.as_bytes());
    enc.put_u32(tx.lock_time);
    enc.put_u32(SIGHASH_ALL);
    sha256d(&enc.into_bytes())
}

/// Sign one input against the output it spends. Supports the kernel script
/// types the stake searcher emits: P2PK, P2PKH and P2WPKH.
pub fn sign_input(
    keystore: &KeyStore,
    tx: &mut Transaction,
    input_index: usize,
    spent_script: &Script,
    spent_value: Amount,
) -> Result<(), String> {
    match spent_script.solve() {
        TxoutType::Pubkey(pubkey_bytes) => {
            let pubkey =
                PublicKey::from_slice(&pubkey_bytes).map_err(|e| format!("bad pubkey: {e}"))?;
            let key_hash = sable_core::hashes::hash160(&pubkey.serialize());
            let (secret, _) = keystore
                .lookup(&key_hash)
                .ok_or_else(|| "no key for pay-to-pubkey output".to_string())?;
            let digest = tx
                .signature_hash(input_index, spent_script, SIGHASH_ALL)
                .map_err(|e| e.to_string())?;
            let signature = sign_digest(keystore.secp(), &digest, &secret)?;
            let mut script_sig = Script::new();
            script_sig.push_data(&encode_signature(&signature));
            tx.vin[input_index].script_sig = script_sig;
            Ok(())
        }
        TxoutType::PubkeyHash(key_hash) => {
            let (secret, pubkey) = keystore
                .lookup(&key_hash)
                .ok_or_else(|| "no key for pay-to-pubkey-hash output".to_string())?;
            let digest = tx
                .signature_hash(input_index, spent_script, SIGHASH_ALL)
                .map_err(|e| e.to_string())?;
            let signature = sign_digest(keystore.secp(), &digest, &secret)?;
            let mut script_sig = Script::new();
            script_sig
                .push_data(&encode_signature(&signature))
                .push_data(&pubkey.serialize());
            tx.vin[input_index].script_sig = script_sig;
            Ok(())
        }
        TxoutType::WitnessV0KeyHash(key_hash) => {
            let (secret, pubkey) = keystore
                .lookup(&key_hash)
                .ok_or_else(|| "no key for witness key-hash output".to_string())?;
            let digest = witness_v0_sighash(tx, input_index, &key_hash, spent_value);
            let signature = sign_digest(keystore.secp(), &digest, &secret)?;
            tx.vin[input_index].script_sig = Script::new();
            tx.vin[input_index].witness =
                vec![encode_signature(&signature), pubkey.serialize().to_vec()];
            Ok(())
        }
        other => Err(format!("no signing support for output type {other:?}")),
    }
}

/// Sign a proof-of-stake block with the key of the kernel payout output.
pub fn sign_block(keystore: &KeyStore, block: &mut Block) -> Result<(), String> {
    if !block.is_proof_of_stake() {
        return Err("only proof-of-stake blocks are signed".to_string());
    }
    let payout = &block.txs[1].vout[1];
    let TxoutType::Pubkey(pubkey_bytes) = payout.script_pubkey.solve() else {
        return Err("kernel payout is not pay-to-pubkey".to_string());
    };
    let pubkey = PublicKey::from_slice(&pubkey_bytes).map_err(|e| format!("bad pubkey: {e}"))?;
    let key_hash = sable_core::hashes::hash160(&pubkey.serialize());
    let (secret, _) = keystore
        .lookup(&key_hash)
        .ok_or_else(|| "no key for the kernel payout output".to_string())?;

    let signature = sign_digest(keystore.secp(), &block.hash(), &secret)?;
    block.block_sig = signature.serialize_der().to_vec();
    Ok(())
}

/// Deterministic secret for tests.
#[cfg(test)]
pub(crate) fn test_secret(seed: &[u8]) -> SecretKey {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(seed);
    SecretKey::from_slice(&digest).expect("non-zero digest")
}
