//! Block hash and the block body committed at each chain height.

use crate::hash::blake2b_256_multi;
use crate::node_id::NodeId;
use crate::time::Timestamp;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte hash identifying a candidate or committed block.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockHash([u8; 32]);

impl Default for BlockHash {
    fn default() -> Self {
        Self::ZERO
    }
}

impl BlockHash {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "\u{2026})")
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// A block: an ordered batch of transactions proposed for one chain height.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Chain position; the genesis block sits at height 0.
    pub height: i64,
    /// Hash of the block at `height - 1` (zero for genesis).
    pub previous: BlockHash,
    /// Assembly time.
    pub timestamp: Timestamp,
    /// Node that assembled the block.
    pub proposer: NodeId,
    /// Transactions, ordered by timestamp.
    pub transactions: Vec<Transaction>,
    /// Content hash over every field above.
    pub hash: BlockHash,
}

impl Block {
    /// Build a block and compute its hash.
    pub fn new(
        height: i64,
        previous: BlockHash,
        timestamp: Timestamp,
        proposer: NodeId,
        transactions: Vec<Transaction>,
    ) -> Self {
        let mut block = Self {
            height,
            previous,
            timestamp,
            proposer,
            transactions,
            hash: BlockHash::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    /// The deterministic genesis block shared by every node.
    pub fn genesis() -> Self {
        Self::new(0, BlockHash::ZERO, Timestamp::EPOCH, NodeId::NIL, Vec::new())
    }

    /// Blake2b-256 over the header fields and every transaction hash.
    pub fn compute_hash(&self) -> BlockHash {
        let height = self.height.to_be_bytes();
        let timestamp = self.timestamp.as_millis().to_be_bytes();
        let count = (self.transactions.len() as u64).to_be_bytes();
        let mut parts: Vec<&[u8]> = vec![
            &height,
            self.previous.as_bytes(),
            &timestamp,
            self.proposer.as_bytes(),
            &count,
        ];
        for tx in &self.transactions {
            parts.push(tx.hash.as_bytes());
        }
        BlockHash::new(blake2b_256_multi(&parts))
    }

    /// Whether the stored hash matches the content.
    pub fn verify_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }
}
