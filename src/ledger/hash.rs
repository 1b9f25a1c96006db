//! Network and transaction hashing.

use prost::Message;
use sha2::{Digest, Sha256};

use crate::proto::{Asset, TransactionEnvelope};

/// Identifier of a network: SHA-256 of its passphrase.
pub fn network_id(passphrase: &str) -> [u8; 32] {
    Sha256::digest(passphrase.as_bytes()).into()
}

/// Hash binding an envelope to the network it was signed for.
pub fn transaction_hash(network_id: &[u8; 32], envelope: &TransactionEnvelope) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(network_id);
    hasher.update(envelope.encode_to_vec());
    hasher.finalize().into()
}

/// Id of the contract that wraps `asset` on a network.
pub fn asset_contract_id(network_id: &[u8; 32], asset: &Asset) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(network_id);
    hasher.update(asset.canonical().as_bytes());
    hasher.finalize().into()
}
