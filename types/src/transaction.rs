//! Pending transactions: the opaque payloads a block commits.

use crate::hash::{blake2b_256_multi, TxHash};
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};

/// A transaction awaiting inclusion in a block.
///
/// The consensus core never interprets `payload`; it only orders
/// transactions by `timestamp` when assembling a candidate block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: TxHash,
    pub timestamp: Timestamp,
    pub payload: Vec<u8>,
}

impl Transaction {
    /// Build a transaction and compute its hash.
    pub fn new(timestamp: Timestamp, payload: Vec<u8>) -> Self {
        let hash = Self::compute_hash(timestamp, &payload);
        Self {
            hash,
            timestamp,
            payload,
        }
    }

    /// Blake2b-256 over `timestamp ‖ payload`.
    pub fn compute_hash(timestamp: Timestamp, payload: &[u8]) -> TxHash {
        TxHash::new(blake2b_256_multi(&[
            &timestamp.as_millis().to_be_bytes(),
            payload,
        ]))
    }

    /// Whether the stored hash matches the content.
    pub fn verify_hash(&self) -> bool {
        self.hash == Self::compute_hash(self.timestamp, &self.payload)
    }
}
