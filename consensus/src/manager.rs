//! Proposal manager: the single-slot admission guard.
//!
//! At most one proposal is active per node. The mining loop checks the slot
//! before assembling a candidate, and the follower path checks it before
//! accepting a remote proposal, so two proposals are never driven
//! concurrently on the same node.

use crate::error::ConsensusError;
use crate::proposal::Proposal;
use cinder_messages::ProposalBody;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Holds zero or one active [`Proposal`].
///
/// Every operation takes the registry lock briefly; none block on the
/// proposal itself.
#[derive(Debug, Default)]
pub struct ProposalManager {
    active: Mutex<Option<Arc<Proposal>>>,
}

impl ProposalManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<Proposal>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `proposal` as the active one.
    ///
    /// Fails with [`ConsensusError::AlreadyActive`] (naming the proposal that
    /// holds the slot) if one is already registered; the registered proposal
    /// is left untouched.
    pub fn set_proposal(&self, proposal: Arc<Proposal>) -> Result<(), ConsensusError> {
        let mut slot = self.lock();
        if let Some(existing) = slot.as_ref() {
            return Err(ConsensusError::AlreadyActive {
                height: existing.height(),
                hash: existing.hash(),
            });
        }
        *slot = Some(proposal);
        Ok(())
    }

    pub fn has_proposal(&self) -> bool {
        self.lock().is_some()
    }

    pub fn get_proposal(&self) -> Option<Arc<Proposal>> {
        self.lock().clone()
    }

    /// Whether the active proposal has the same identity as `body`.
    pub fn is_proposal_for(&self, body: &ProposalBody) -> bool {
        self.lock().as_ref().is_some_and(|p| p.is_for(body))
    }

    /// The active proposal, if it has the same identity as `body`.
    pub fn proposal_for(&self, body: &ProposalBody) -> Option<Arc<Proposal>> {
        self.lock().as_ref().filter(|p| p.is_for(body)).cloned()
    }

    /// Empty the slot unconditionally.
    pub fn clear_proposal(&self) {
        self.lock().take();
    }
}
