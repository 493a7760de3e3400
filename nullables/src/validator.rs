//! Nullable block validator and snapshot scheduler.

use cinder_consensus::{BlockValidator, SnapshotScheduler};
use cinder_types::Block;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// A validator whose verdict is set by the test.
pub struct NullValidator {
    accept: AtomicBool,
}

impl NullValidator {
    pub fn accepting() -> Self {
        Self {
            accept: AtomicBool::new(true),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            accept: AtomicBool::new(false),
        }
    }

    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }
}

impl Default for NullValidator {
    fn default() -> Self {
        Self::accepting()
    }
}

impl BlockValidator for NullValidator {
    fn is_valid(&self, _block: &Block) -> bool {
        self.accept.load(Ordering::SeqCst)
    }
}

/// Records every height it was asked to snapshot.
#[derive(Default)]
pub struct NullSnapshots {
    heights: Mutex<Vec<i64>>,
}

impl NullSnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled(&self) -> Vec<i64> {
        self.heights.lock().unwrap().clone()
    }
}

impl SnapshotScheduler for NullSnapshots {
    fn schedule_snapshot(&self, height: i64) {
        self.heights.lock().unwrap().push(height);
    }
}
