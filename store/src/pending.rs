//! Pending-object storage trait.

use crate::StoreError;
use cinder_types::{Block, BlockHash, Transaction, TxHash};

/// Candidate blocks and transactions that have not been committed yet.
pub trait PendingStore: Send + Sync {
    /// Whether a candidate block with this hash is held.
    fn has_block(&self, hash: &BlockHash) -> Result<bool, StoreError>;

    /// Retrieve a candidate block by hash.
    fn get_block(&self, hash: &BlockHash) -> Result<Block, StoreError>;

    /// Store a candidate block under its hash.
    fn put_block(&self, block: &Block) -> Result<(), StoreError>;

    /// Drop a candidate block (after commit or cancellation).
    fn remove_block(&self, hash: &BlockHash) -> Result<(), StoreError>;

    /// Drop every candidate block at or below `height`; returns how many went.
    fn prune_blocks(&self, height: i64) -> Result<usize, StoreError>;

    /// Queue a transaction for a future block. Re-adding a known hash is a no-op.
    fn add_transaction(&self, tx: Transaction) -> Result<(), StoreError>;

    /// Number of queued transactions.
    fn pending_transaction_count(&self) -> Result<usize, StoreError>;

    /// Remove and return up to `max_count` transactions, oldest timestamp first
    /// (ties broken by hash).
    fn drain_transactions_for_block(&self, max_count: usize) -> Result<Vec<Transaction>, StoreError>;

    /// Put drained transactions back after their proposal was cancelled.
    fn restore_transactions(&self, txs: Vec<Transaction>) -> Result<(), StoreError>;

    /// Forget transactions that were committed in a block from another node.
    fn remove_transactions(&self, hashes: &[TxHash]) -> Result<(), StoreError>;
}
