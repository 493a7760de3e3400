//! Candidate block assembly from the pending transaction pool.

use cinder_store::{PendingStore, StoreError};
use cinder_types::{Block, NodeId, Timestamp};

/// Builds the next candidate block once the pool is full enough.
#[derive(Debug, Clone, Copy)]
pub struct BlockAssembler {
    max_transactions: usize,
}

impl BlockAssembler {
    pub fn new(max_transactions: usize) -> Self {
        Self {
            max_transactions: max_transactions.max(1),
        }
    }

    pub fn max_transactions(&self) -> usize {
        self.max_transactions
    }

    /// Whether the pool holds a full block's worth of transactions.
    pub fn is_ready(&self, pending: &dyn PendingStore) -> Result<bool, StoreError> {
        Ok(pending.pending_transaction_count()? >= self.max_transactions)
    }

    /// Drain up to `max_transactions` and build the block on top of `head`.
    ///
    /// Returns `None` if the pool was empty. The drained transactions are
    /// owned by the returned block; callers must restore them if the block
    /// is abandoned.
    pub fn assemble(
        &self,
        proposer: NodeId,
        head: &Block,
        pending: &dyn PendingStore,
    ) -> Result<Option<Block>, StoreError> {
        let mut transactions = pending.drain_transactions_for_block(self.max_transactions)?;
        if transactions.is_empty() {
            return Ok(None);
        }
        transactions.sort_by_key(|tx| (tx.timestamp, tx.hash));

        // Never older than the parent, even with a skewed clock.
        let timestamp = Timestamp::now().max(Timestamp::new(head.timestamp.as_millis() + 1));
        Ok(Some(Block::new(
            head.height + 1,
            head.hash,
            timestamp,
            proposer,
            transactions,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_nullables::NullPendingStore;
    use cinder_types::Transaction;

    fn fill(store: &NullPendingStore, count: i64) {
        for i in (0..count).rev() {
            store
                .add_transaction(Transaction::new(Timestamp::new(10 + i), vec![i as u8]))
                .unwrap();
        }
    }

    #[test]
    fn ready_only_at_threshold() {
        let store = NullPendingStore::new();
        let assembler = BlockAssembler::new(3);
        fill(&store, 2);
        assert!(!assembler.is_ready(&store).unwrap());
        fill(&store, 3);
        assert!(assembler.is_ready(&store).unwrap());
    }

    #[test]
    fn assembles_oldest_first_on_top_of_head() {
        let store = NullPendingStore::new();
        fill(&store, 5);
        let head = Block::genesis();
        let block = BlockAssembler::new(3)
            .assemble(NodeId::new([4; 16]), &head, &store)
            .unwrap()
            .unwrap();

        assert_eq!(block.height, 1);
        assert_eq!(block.previous, head.hash);
        assert!(block.verify_hash());
        let stamps: Vec<i64> = block
            .transactions
            .iter()
            .map(|tx| tx.timestamp.as_millis())
            .collect();
        assert_eq!(stamps, vec![10, 11, 12]);
        assert_eq!(store.pending_transaction_count().unwrap(), 2);
    }

    #[test]
    fn empty_pool_assembles_nothing() {
        let store = NullPendingStore::new();
        let block = BlockAssembler::new(3)
            .assemble(NodeId::new([4; 16]), &Block::genesis(), &store)
            .unwrap();
        assert!(block.is_none());
    }
}
