//! In-memory key storage.

use std::collections::HashMap;

use secp256k1::{PublicKey, Secp256k1, SecretKey, SignOnly};

use sable_core::hashes::hash160;

/// HASH160 of a compressed public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId(pub [u8; 20]);

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Flat keystore indexed by key id. The keypool role from the original
/// design collapses to "how many unused keys remain".
pub struct KeyStore {
    secp: Secp256k1<SignOnly>,
    keys: HashMap<[u8; 20], SecretKey>,
    unused: Vec<KeyId>,
}

impl KeyStore {
    pub fn new() -> Self {
        KeyStore { secp: Secp256k1::signing_only(), keys: HashMap::new(), unused: Vec::new() }
    }

    pub fn secp(&self) -> &Secp256k1<SignOnly> {
        &self.secp
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keypool_size(&self) -> usize {
        self.unused.len()
    }

    /// Import a secret key; returns its id.
    pub fn add_key(&mut self, secret: SecretKey) -> KeyId {
        let pubkey = PublicKey::from_secret_key(&self.secp, &secret);
        let id = KeyId(hash160(&pubkey.serialize()));
        self.keys.insert(id.0, secret);
        self.unused.push(id);
        id
    }

    /// Generate and store a fresh random key.
    pub fn generate_key(&mut self) -> KeyId {
        let secret = SecretKey::new(&mut rand::thread_rng());
        self.add_key(secret)
    }

    /// Take a key from the pool of unused ids, like reserving a destination.
    pub fn reserve_key(&mut self) -> Option<KeyId> {
        self.unused.pop()
    }

    pub fn get_secret(&self, id: &KeyId) -> Option<&SecretKey> {
        self.keys.get(&id.0)
    }

    /// Compressed public key for an id.
    pub fn get_pubkey(&self, id: &KeyId) -> Option<PublicKey> {
        self.keys.get(&id.0).map(|sk| PublicKey::from_secret_key(&self.secp, sk))
    }

    /// Resolve the key behind a HASH160, the signing-provider lookup.
    pub fn lookup(&self, key_hash: &[u8; 20]) -> Option<(SecretKey, PublicKey)> {
        self.keys
            .get(key_hash)
            .map(|sk| (*sk, PublicKey::from_secret_key(&self.secp, sk)))
    }
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}
