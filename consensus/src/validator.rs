//! Block validation and snapshot collaborators.

use cinder_types::Block;

/// Decides whether a candidate block may be committed.
///
/// Signature and structure checks live behind this trait; the consensus
/// core treats the answer as opaque.
pub trait BlockValidator: Send + Sync {
    fn is_valid(&self, block: &Block) -> bool;
}

/// Optional hook invoked after every successful append.
pub trait SnapshotScheduler: Send + Sync {
    /// Called with the height that was just committed; implementations decide
    /// whether to take a snapshot and must not block the caller.
    fn schedule_snapshot(&self, height: i64);
}
