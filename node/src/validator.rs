//! Structural block validation.

use std::collections::HashSet;
use std::sync::Arc;

use cinder_consensus::BlockValidator;
use cinder_store::ChainStore;
use cinder_types::Block;
use tracing::debug;

/// Checks that a candidate is well formed and extends the local chain head.
pub struct StructuralValidator {
    chain: Arc<dyn ChainStore>,
    max_transactions: usize,
}

impl StructuralValidator {
    pub fn new(chain: Arc<dyn ChainStore>, max_transactions: usize) -> Self {
        Self {
            chain,
            max_transactions,
        }
    }

    /// The first rule `block` breaks, if any.
    pub fn check(&self, block: &Block) -> Result<(), String> {
        if !block.verify_hash() {
            return Err("hash does not match content".to_string());
        }
        let head = self.chain.head().map_err(|e| e.to_string())?;
        if block.height != head.height + 1 {
            return Err(format!(
                "height {} does not extend head {}",
                block.height, head.height
            ));
        }
        if block.previous != head.hash {
            return Err(format!("previous {} is not the head", block.previous));
        }
        if block.transactions.is_empty() || block.transactions.len() > self.max_transactions {
            return Err(format!(
                "{} transactions (limit {})",
                block.transactions.len(),
                self.max_transactions
            ));
        }

        let mut seen = HashSet::with_capacity(block.transactions.len());
        for pair in block.transactions.windows(2) {
            if (pair[0].timestamp, pair[0].hash) > (pair[1].timestamp, pair[1].hash) {
                return Err("transactions out of order".to_string());
            }
        }
        for tx in &block.transactions {
            if !tx.verify_hash() {
                return Err(format!("transaction {} hash mismatch", tx.hash));
            }
            if !seen.insert(tx.hash) {
                return Err(format!("duplicate transaction {}", tx.hash));
            }
        }
        Ok(())
    }
}

impl BlockValidator for StructuralValidator {
    fn is_valid(&self, block: &Block) -> bool {
        match self.check(block) {
            Ok(()) => true,
            Err(reason) => {
                debug!(height = block.height, hash = %block.hash, %reason, "block failed validation");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_nullables::NullChainStore;
    use cinder_types::{BlockHash, NodeId, Timestamp, Transaction};

    fn validator(max: usize) -> StructuralValidator {
        StructuralValidator::new(Arc::new(NullChainStore::new()), max)
    }

    fn txs(stamps: &[i64]) -> Vec<Transaction> {
        stamps
            .iter()
            .map(|t| Transaction::new(Timestamp::new(*t), t.to_be_bytes().to_vec()))
            .collect()
    }

    fn block(height: i64, previous: BlockHash, transactions: Vec<Transaction>) -> Block {
        Block::new(height, previous, Timestamp::new(50), NodeId::new([2; 16]), transactions)
    }

    #[test]
    fn accepts_well_formed_child_of_head() {
        let genesis = Block::genesis();
        assert!(validator(4).is_valid(&block(1, genesis.hash, txs(&[1, 2, 3]))));
    }

    #[test]
    fn rejects_wrong_linkage() {
        let genesis = Block::genesis();
        let v = validator(4);
        assert!(v.check(&block(2, genesis.hash, txs(&[1]))).is_err());
        assert!(v.check(&block(1, BlockHash::new([9; 32]), txs(&[1]))).is_err());
    }

    #[test]
    fn rejects_bad_transaction_lists() {
        let genesis = Block::genesis();
        let v = validator(2);
        assert!(v.check(&block(1, genesis.hash, txs(&[1, 2, 3]))).is_err());
        assert!(v.check(&block(1, genesis.hash, txs(&[]))).is_err());
        assert!(v.check(&block(1, genesis.hash, txs(&[5, 1]))).is_err());

        let dup = txs(&[4]);
        let doubled = vec![dup[0].clone(), dup[0].clone()];
        assert_eq!(
            v.check(&block(1, genesis.hash, doubled)).unwrap_err(),
            format!("duplicate transaction {}", dup[0].hash)
        );
    }

    #[test]
    fn rejects_tampered_content() {
        let genesis = Block::genesis();
        let mut b = block(1, genesis.hash, txs(&[1]));
        b.transactions[0].payload.push(0xFF);
        // Block hash covers only transaction hashes, so this is caught per tx.
        assert!(b.verify_hash());
        assert!(!validator(4).is_valid(&b));
    }
}
