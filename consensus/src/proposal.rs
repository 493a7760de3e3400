//! Proposal state machine: the unit of agreement for one candidate block.
//!
//! A [`Proposal`] is shared (behind an `Arc`) between the thread driving it
//! and every network thread that delivers a message about it. All mutation
//! goes through one internal mutex; a condition variable wakes threads
//! blocked in [`Proposal::wait_for_required_responses`],
//! [`Proposal::wait_for_phase`] or [`Proposal::wait_for_block`] whenever the
//! phase, the vote sets or block availability change.
//!
//! Lifecycle: `Proposal → Voting → Commit → Quorum`. Only the immediate
//! successor can be requested through [`Proposal::transition_to_phase`];
//! [`Proposal::cancel`] jumps forward to Quorum with a Rejected result.

use crate::error::ConsensusError;
use crate::phase::{Phase, ProposalResult, Role};
use cinder_messages::ProposalBody;
use cinder_types::{BlockHash, NodeId, Timestamp};
use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct ProposalState {
    phase: Phase,
    result: Option<ProposalResult>,
    /// Peers that voted for the proposal in the current phase.
    accepted: HashSet<NodeId>,
    /// Peers that voted against the proposal in the current phase.
    rejected: HashSet<NodeId>,
    /// Whether the candidate block is held locally.
    block_available: bool,
}

/// A proposal to append one candidate block at a specific height.
#[derive(Debug)]
pub struct Proposal {
    body: ProposalBody,
    role: Role,
    created: Instant,
    state: Mutex<ProposalState>,
    changed: Condvar,
}

impl Proposal {
    pub fn new(body: ProposalBody, role: Role) -> Self {
        Self {
            body,
            role,
            created: Instant::now(),
            state: Mutex::new(ProposalState {
                phase: Phase::Proposal,
                result: None,
                accepted: HashSet::new(),
                rejected: HashSet::new(),
                block_available: false,
            }),
            changed: Condvar::new(),
        }
    }

    /// Wire identity of this proposal.
    pub fn body(&self) -> ProposalBody {
        self.body
    }

    pub fn height(&self) -> i64 {
        self.body.height
    }

    pub fn hash(&self) -> BlockHash {
        self.body.hash
    }

    pub fn proposer(&self) -> NodeId {
        self.body.proposer
    }

    pub fn timestamp(&self) -> Timestamp {
        self.body.timestamp
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Time since this node created or registered the proposal.
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Whether `other` names the same proposal (height, hash and proposer).
    /// The timestamp is informational and not part of the identity.
    pub fn is_for(&self, other: &ProposalBody) -> bool {
        self.body.height == other.height
            && self.body.hash == other.hash
            && self.body.proposer == other.proposer
    }

    fn lock(&self) -> MutexGuard<'_, ProposalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn result(&self) -> Option<ProposalResult> {
        self.lock().result
    }

    /// Whether the proposal reached its terminal phase.
    pub fn is_concluded(&self) -> bool {
        self.lock().phase == Phase::Quorum
    }

    /// Move to `next`, which must be the immediate successor of the current
    /// phase. Requesting the current phase again succeeds without effect.
    ///
    /// Entering Voting or Commit starts a fresh vote epoch.
    pub fn transition_to_phase(&self, next: Phase) -> Result<(), ConsensusError> {
        let mut state = self.lock();
        if state.phase == next {
            return Ok(());
        }
        if state.phase.next() != Some(next) {
            return Err(ConsensusError::InvalidTransition {
                from: state.phase,
                to: next,
            });
        }
        state.phase = next;
        if next.is_voting() {
            state.accepted.clear();
            state.rejected.clear();
        }
        drop(state);
        self.changed.notify_all();
        Ok(())
    }

    /// Record a positive vote from `peer` in the current phase.
    ///
    /// Returns `false` if the peer already voted this phase (either way) or
    /// the proposal has concluded.
    pub fn accept_proposal(&self, peer: NodeId) -> bool {
        self.record_vote(peer, true, None)
    }

    /// Record a negative vote from `peer` in the current phase.
    pub fn reject_proposal(&self, peer: NodeId) -> bool {
        self.record_vote(peer, false, None)
    }

    /// Record a positive vote only if the proposal is still in `phase`.
    ///
    /// Used for acknowledgements that belong to one specific phase so that a
    /// late one is never counted in the next epoch.
    pub fn accept_in_phase(&self, peer: NodeId, phase: Phase) -> bool {
        self.record_vote(peer, true, Some(phase))
    }

    fn record_vote(&self, peer: NodeId, accept: bool, only_in: Option<Phase>) -> bool {
        let mut state = self.lock();
        if state.phase == Phase::Quorum {
            return false;
        }
        if only_in.is_some_and(|phase| phase != state.phase) {
            return false;
        }
        // First vote wins: a peer cannot move between sets within an epoch.
        if state.accepted.contains(&peer) || state.rejected.contains(&peer) {
            return false;
        }
        if accept {
            state.accepted.insert(peer);
        } else {
            state.rejected.insert(peer);
        }
        drop(state);
        self.changed.notify_all();
        true
    }

    pub fn accepted_count(&self) -> usize {
        self.lock().accepted.len()
    }

    pub fn rejected_count(&self) -> usize {
        self.lock().rejected.len()
    }

    pub fn has_voted(&self, peer: &NodeId) -> bool {
        let state = self.lock();
        state.accepted.contains(peer) || state.rejected.contains(peer)
    }

    /// Whether the current phase failed: at least one vote was required and
    /// rejections are not outnumbered by acceptances.
    pub fn was_rejected(&self, required: usize) -> bool {
        let state = self.lock();
        required > 0 && state.rejected.len() >= state.accepted.len()
    }

    /// Block until `required` votes (either way) arrived this phase, the
    /// proposal concluded, or `timeout` elapsed.
    ///
    /// Returns whether the vote count was reached. A `true` result says
    /// nothing about the outcome; check [`Proposal::was_rejected`].
    pub fn wait_for_required_responses(&self, required: usize, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .changed
            .wait_timeout_while(state, timeout, |s| {
                s.accepted.len() + s.rejected.len() < required && s.phase != Phase::Quorum
            })
            .unwrap_or_else(PoisonError::into_inner);
        state.accepted.len() + state.rejected.len() >= required
    }

    /// Block until the proposal reached `phase` or any later phase, or
    /// `timeout` elapsed. Returns whether the phase was reached.
    pub fn wait_for_phase(&self, phase: Phase, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .changed
            .wait_timeout_while(state, timeout, |s| s.phase < phase)
            .unwrap_or_else(PoisonError::into_inner);
        state.phase >= phase
    }

    /// Note that the candidate block is now held locally.
    pub fn mark_block_available(&self) {
        self.lock().block_available = true;
        self.changed.notify_all();
    }

    /// Block until [`Proposal::mark_block_available`] is called, the proposal
    /// concluded, or `timeout` elapsed. Returns whether the block arrived.
    pub fn wait_for_block(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .changed
            .wait_timeout_while(state, timeout, |s| {
                !s.block_available && s.phase != Phase::Quorum
            })
            .unwrap_or_else(PoisonError::into_inner);
        state.block_available
    }

    /// Set the final result. Only the first call at the Quorum phase has any
    /// effect; returns whether this call set it.
    pub fn set_result(&self, result: ProposalResult) -> bool {
        let mut state = self.lock();
        if state.phase != Phase::Quorum || state.result.is_some() {
            return false;
        }
        state.result = Some(result);
        drop(state);
        self.changed.notify_all();
        true
    }

    /// Conclude the proposal as Rejected, from any phase.
    ///
    /// Returns `false` if a result had already been set.
    pub fn cancel(&self) -> bool {
        let mut state = self.lock();
        state.phase = Phase::Quorum;
        let cancelled = state.result.is_none();
        if cancelled {
            state.result = Some(ProposalResult::Rejected);
        }
        drop(state);
        self.changed.notify_all();
        cancelled
    }
}
