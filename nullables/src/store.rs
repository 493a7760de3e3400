//! Nullable stores: thread-safe in-memory pending pool and chain.

use cinder_store::{ChainStore, PendingStore, StoreError};
use cinder_types::{Block, BlockHash, Timestamp, Transaction, TxHash};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct TxPool {
    /// Ordered by (timestamp, hash) so draining is oldest first.
    ordered: BTreeMap<(Timestamp, TxHash), Transaction>,
    index: HashMap<TxHash, Timestamp>,
}

impl TxPool {
    fn insert(&mut self, tx: Transaction) {
        if self.index.contains_key(&tx.hash) {
            return;
        }
        self.index.insert(tx.hash, tx.timestamp);
        self.ordered.insert((tx.timestamp, tx.hash), tx);
    }

    fn remove(&mut self, hash: &TxHash) -> Option<Transaction> {
        let timestamp = self.index.remove(hash)?;
        self.ordered.remove(&(timestamp, *hash))
    }
}

/// An in-memory [`PendingStore`].
/// Thread-safe for use from the miner and follower threads at once.
#[derive(Default)]
pub struct NullPendingStore {
    blocks: Mutex<HashMap<BlockHash, Block>>,
    txs: Mutex<TxPool>,
    fail_writes: AtomicBool,
    fail_block_removal: AtomicBool,
}

impl NullPendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with [`StoreError::Backend`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make only [`PendingStore::remove_block`] fail.
    pub fn set_fail_block_removal(&self, fail: bool) {
        self.fail_block_removal.store(fail, Ordering::SeqCst);
    }

    pub fn block_count(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }

    pub fn contains_transaction(&self, hash: &TxHash) -> bool {
        self.txs.lock().unwrap().index.contains_key(hash)
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("writes disabled".to_string()));
        }
        Ok(())
    }
}

impl PendingStore for NullPendingStore {
    fn has_block(&self, hash: &BlockHash) -> Result<bool, StoreError> {
        Ok(self.blocks.lock().unwrap().contains_key(hash))
    }

    fn get_block(&self, hash: &BlockHash) -> Result<Block, StoreError> {
        self.blocks
            .lock()
            .unwrap()
            .get(hash)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(hash.to_string()))
    }

    fn put_block(&self, block: &Block) -> Result<(), StoreError> {
        self.check_writable()?;
        self.blocks
            .lock()
            .unwrap()
            .insert(block.hash, block.clone());
        Ok(())
    }

    fn remove_block(&self, hash: &BlockHash) -> Result<(), StoreError> {
        self.check_writable()?;
        if self.fail_block_removal.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("block removal disabled".to_string()));
        }
        self.blocks.lock().unwrap().remove(hash);
        Ok(())
    }

    fn prune_blocks(&self, height: i64) -> Result<usize, StoreError> {
        self.check_writable()?;
        let mut blocks = self.blocks.lock().unwrap();
        let before = blocks.len();
        blocks.retain(|_, block| block.height > height);
        Ok(before - blocks.len())
    }

    fn add_transaction(&self, tx: Transaction) -> Result<(), StoreError> {
        self.check_writable()?;
        self.txs.lock().unwrap().insert(tx);
        Ok(())
    }

    fn pending_transaction_count(&self) -> Result<usize, StoreError> {
        Ok(self.txs.lock().unwrap().ordered.len())
    }

    fn drain_transactions_for_block(&self, max_count: usize) -> Result<Vec<Transaction>, StoreError> {
        self.check_writable()?;
        let mut pool = self.txs.lock().unwrap();
        let keys: Vec<(Timestamp, TxHash)> = pool.ordered.keys().take(max_count).copied().collect();
        let drained = keys
            .into_iter()
            .filter_map(|(_, hash)| pool.remove(&hash))
            .collect();
        Ok(drained)
    }

    fn restore_transactions(&self, txs: Vec<Transaction>) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut pool = self.txs.lock().unwrap();
        for tx in txs {
            pool.insert(tx);
        }
        Ok(())
    }

    fn remove_transactions(&self, hashes: &[TxHash]) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut pool = self.txs.lock().unwrap();
        for hash in hashes {
            pool.remove(hash);
        }
        Ok(())
    }
}

/// An in-memory [`ChainStore`] seeded with the genesis block.
pub struct NullChainStore {
    blocks: Mutex<Vec<Block>>,
    fail_appends: AtomicBool,
}

impl NullChainStore {
    pub fn new() -> Self {
        Self {
            blocks: Mutex::new(vec![Block::genesis()]),
            fail_appends: AtomicBool::new(false),
        }
    }

    /// Make every subsequent append fail with [`StoreError::Backend`].
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Every block from genesis to head (for assertions).
    pub fn blocks(&self) -> Vec<Block> {
        self.blocks.lock().unwrap().clone()
    }

    pub fn block_at(&self, height: i64) -> Option<Block> {
        let index = usize::try_from(height).ok()?;
        self.blocks.lock().unwrap().get(index).cloned()
    }
}

impl Default for NullChainStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainStore for NullChainStore {
    fn append(&self, block: &Block) -> Result<(), StoreError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("appends disabled".to_string()));
        }
        let mut blocks = self.blocks.lock().unwrap();
        let head = blocks
            .last()
            .ok_or_else(|| StoreError::Backend("chain has no genesis".to_string()))?;
        if block.height != head.height + 1 {
            return Err(StoreError::Conflict(format!(
                "height {} does not extend head {}",
                block.height, head.height
            )));
        }
        if block.previous != head.hash {
            return Err(StoreError::Conflict(format!(
                "previous {} is not head {}",
                block.previous, head.hash
            )));
        }
        blocks.push(block.clone());
        Ok(())
    }

    fn current_height(&self) -> Result<i64, StoreError> {
        self.blocks
            .lock()
            .unwrap()
            .last()
            .map(|b| b.height)
            .ok_or_else(|| StoreError::Backend("chain has no genesis".to_string()))
    }

    fn head(&self) -> Result<Block, StoreError> {
        self.blocks
            .lock()
            .unwrap()
            .last()
            .cloned()
            .ok_or_else(|| StoreError::Backend("chain has no genesis".to_string()))
    }
}
