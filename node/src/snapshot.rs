//! Periodic chain snapshots.
//!
//! After every append the proposal handler calls
//! [`SnapshotScheduler::schedule_snapshot`]. Every `interval` heights the
//! [`SnapshotJob`] writes the chain head to
//! `<data_dir>/<node id>/snapshot-<height>.bin` (bincode) on a background
//! thread, so the committing thread never waits on disk I/O.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use cinder_consensus::SnapshotScheduler;
use cinder_store::ChainStore;
use cinder_types::{Block, BlockHash, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::NodeError;

/// What a snapshot file holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub height: i64,
    pub hash: BlockHash,
    pub taken_at: Timestamp,
    pub head: Block,
}

impl ChainSnapshot {
    pub fn of(head: Block) -> Self {
        Self {
            height: head.height,
            hash: head.hash,
            taken_at: Timestamp::now(),
            head,
        }
    }

    pub fn file_name(height: i64) -> String {
        format!("snapshot-{height}.bin")
    }

    /// Write into `dir`, returning the file path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, NodeError> {
        let bytes = bincode::serialize(self).map_err(|e| NodeError::Snapshot(e.to_string()))?;
        let path = dir.join(Self::file_name(self.height));
        let tmp = path.with_extension("bin.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    pub fn read_from(path: &Path) -> Result<Self, NodeError> {
        let bytes = fs::read(path)?;
        bincode::deserialize(&bytes).map_err(|e| NodeError::Snapshot(e.to_string()))
    }
}

/// Writes a [`ChainSnapshot`] every `interval` committed heights.
pub struct SnapshotJob {
    data_dir: PathBuf,
    interval: u64,
    chain: Arc<dyn ChainStore>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SnapshotJob {
    /// Creates `data_dir` if it does not exist.
    pub fn new(
        data_dir: impl Into<PathBuf>,
        interval: u64,
        chain: Arc<dyn ChainStore>,
    ) -> Result<Self, NodeError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            interval: interval.max(1),
            chain,
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn is_due(&self, height: i64) -> bool {
        height > 0 && (height as u64) % self.interval == 0
    }

    /// Snapshot the current head synchronously.
    pub fn take_now(&self) -> Result<PathBuf, NodeError> {
        let head = self.chain.head()?;
        ChainSnapshot::of(head).write_to(&self.data_dir)
    }

    /// Join every snapshot thread still running.
    pub fn wait_idle(&self) {
        let workers: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in workers {
            if handle.join().is_err() {
                warn!("snapshot thread panicked");
            }
        }
    }
}

impl SnapshotScheduler for SnapshotJob {
    fn schedule_snapshot(&self, height: i64) {
        if !self.is_due(height) {
            return;
        }
        let head = match self.chain.head() {
            Ok(head) => head,
            Err(e) => {
                warn!(height, error = %e, "cannot read head for snapshot");
                return;
            }
        };
        let dir = self.data_dir.clone();
        let spawned = thread::Builder::new()
            .name("cinder-snapshot".to_string())
            .spawn(move || match ChainSnapshot::of(head).write_to(&dir) {
                Ok(path) => info!(height, path = %path.display(), "snapshot written"),
                Err(e) => warn!(height, error = %e, "snapshot failed"),
            });
        match spawned {
            Ok(handle) => {
                let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
                workers.retain(|w| !w.is_finished());
                workers.push(handle);
                debug!(height, "snapshot scheduled");
            }
            Err(e) => warn!(height, error = %e, "failed to spawn snapshot thread"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_nullables::NullChainStore;
    use cinder_types::{NodeId, Transaction};

    fn chain_with(heights: i64) -> Arc<NullChainStore> {
        let chain = Arc::new(NullChainStore::new());
        for _ in 0..heights {
            let head = chain.head().unwrap();
            let tx = Transaction::new(Timestamp::new(head.height + 1), vec![1]);
            let next = Block::new(
                head.height + 1,
                head.hash,
                Timestamp::new(head.height + 1),
                NodeId::new([1; 16]),
                vec![tx],
            );
            chain.append(&next).unwrap();
        }
        chain
    }

    #[test]
    fn writes_only_on_interval_heights() {
        let dir = tempfile::tempdir().unwrap();
        let chain = chain_with(3);
        let job = SnapshotJob::new(dir.path(), 3, chain.clone()).unwrap();

        job.schedule_snapshot(2);
        job.wait_idle();
        assert!(!dir.path().join(ChainSnapshot::file_name(2)).exists());

        job.schedule_snapshot(3);
        job.wait_idle();
        let path = dir.path().join(ChainSnapshot::file_name(3));
        let snapshot = ChainSnapshot::read_from(&path).unwrap();
        assert_eq!(snapshot.height, 3);
        assert_eq!(snapshot.hash, chain.head().unwrap().hash);
        assert_eq!(snapshot.head, chain.head().unwrap());
    }

    #[test]
    fn creates_missing_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let job = SnapshotJob::new(&nested, 1, chain_with(1)).unwrap();
        let path = job.take_now().unwrap();
        assert!(path.starts_with(&nested));
        assert!(!job.is_due(0));
    }
}
