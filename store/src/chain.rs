//! Durable chain storage trait.

use crate::StoreError;
use cinder_types::Block;

/// The append-only chain of committed blocks.
///
/// Implementations must be safe to call from the mining thread and from
/// any follower thread at the same time.
pub trait ChainStore: Send + Sync {
    /// Append `block` as the new chain head.
    ///
    /// Fails with [`StoreError::Conflict`] unless `block.height` is exactly
    /// one above the current height and `block.previous` is the head hash.
    fn append(&self, block: &Block) -> Result<(), StoreError>;

    /// Height of the current chain head (genesis is 0).
    fn current_height(&self) -> Result<i64, StoreError>;

    /// The current chain head.
    fn head(&self) -> Result<Block, StoreError>;
}
