//! Proposal handler: drives proposals for both protocol roles.
//!
//! The proposer and follower share one [`Proposal`] state machine; the
//! [`Role`] recorded on the proposal picks which sequence
//! [`ProposalHandler::drive`] runs:
//!
//! ```text
//! Proposer: Voting (broadcast Prepare, wait) → Commit (broadcast Commit, wait)
//!           → append candidate → Quorum / Accepted
//! Follower: fetch candidate → validate → Promise → wait for Commit
//!           → append candidate → Accepted → Quorum / Accepted
//! ```
//!
//! Any failure cancels the proposal (Quorum / Rejected). Messages already
//! sent are not rolled back; peers that voted simply time out. The
//! admission guard is cleared exactly once, when `drive` returns.
//!
//! The `on_*` methods are the network-facing entry points and may be called
//! from any thread.

use crate::config::ConsensusConfig;
use crate::error::ConsensusError;
use crate::manager::ProposalManager;
use crate::phase::{Phase, ProposalResult, Role};
use crate::proposal::Proposal;
use crate::quorum::required_votes;
use crate::transport::PeerTransport;
use crate::validator::{BlockValidator, SnapshotScheduler};
use cinder_messages::{MessageKind, ProposalBody, ProposalMessage, WireMessage};
use cinder_store::{ChainStore, PendingStore, StoreError};
use cinder_types::{Block, BlockHash, NodeId, TxHash};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// External services the handler talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn PeerTransport>,
    pub pending: Arc<dyn PendingStore>,
    pub chain: Arc<dyn ChainStore>,
    pub validator: Arc<dyn BlockValidator>,
    pub snapshots: Option<Arc<dyn SnapshotScheduler>>,
}

/// How a driven proposal ended.
#[derive(Debug)]
pub enum ProposalOutcome {
    Committed {
        height: i64,
        hash: BlockHash,
    },
    Cancelled {
        height: i64,
        hash: BlockHash,
        reason: ConsensusError,
    },
}

impl ProposalOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, ProposalOutcome::Committed { .. })
    }

    pub fn height(&self) -> i64 {
        match self {
            ProposalOutcome::Committed { height, .. } | ProposalOutcome::Cancelled { height, .. } => {
                *height
            }
        }
    }
}

pub struct ProposalHandler {
    local_id: NodeId,
    manager: Arc<ProposalManager>,
    collab: Collaborators,
    config: ConsensusConfig,
}

impl ProposalHandler {
    pub fn new(
        local_id: NodeId,
        manager: Arc<ProposalManager>,
        collaborators: Collaborators,
        config: ConsensusConfig,
    ) -> Self {
        Self {
            local_id,
            manager,
            collab: collaborators,
            config,
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    pub fn manager(&self) -> &Arc<ProposalManager> {
        &self.manager
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collab
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    // ── Driving ────────────────────────────────────────────────────────

    /// Run `proposal` to its conclusion on the calling thread.
    ///
    /// Blocks for at most the configured wait budgets. Clears the admission
    /// guard before returning, whatever the outcome.
    pub fn drive(&self, proposal: &Arc<Proposal>) -> ProposalOutcome {
        let run = match proposal.role() {
            Role::Proposer => self.run_proposer(proposal),
            Role::Follower => self.run_follower(proposal),
        };

        let height = proposal.height();
        let hash = proposal.hash();
        let outcome = match run {
            Ok(()) => {
                info!(
                    height,
                    %hash,
                    role = ?proposal.role(),
                    elapsed_ms = proposal.age().as_millis() as u64,
                    "proposal committed"
                );
                ProposalOutcome::Committed { height, hash }
            }
            Err(reason) => {
                warn!(
                    height,
                    %hash,
                    role = ?proposal.role(),
                    phase = %proposal.phase(),
                    error = %reason,
                    "proposal cancelled"
                );
                self.cancel_proposal(proposal);
                ProposalOutcome::Cancelled {
                    height,
                    hash,
                    reason,
                }
            }
        };

        self.manager.clear_proposal();
        outcome
    }

    fn run_proposer(&self, proposal: &Proposal) -> Result<(), ConsensusError> {
        self.run_voting_round(proposal, Phase::Voting, MessageKind::Prepare)?;
        self.run_voting_round(proposal, Phase::Commit, MessageKind::Commit)?;
        self.commit_candidate(proposal)?;
        self.conclude_accepted(proposal)
    }

    /// Enter `phase`, broadcast `kind`, and wait for the required votes.
    fn run_voting_round(
        &self,
        proposal: &Proposal,
        phase: Phase,
        kind: MessageKind,
    ) -> Result<(), ConsensusError> {
        proposal.transition_to_phase(phase)?;

        let required = required_votes(self.collab.transport.connected_peer_count());
        let message = WireMessage::Proposal(ProposalMessage::new(kind, proposal.body()));
        let sent = self.collab.transport.broadcast(&message)?;
        debug!(
            height = proposal.height(),
            hash = %proposal.hash(),
            %phase,
            sent,
            required,
            "broadcast {}",
            kind.as_str()
        );

        let reached = proposal.wait_for_required_responses(required, self.config.voting_timeout);
        if proposal.is_concluded() {
            return Err(ConsensusError::Concluded);
        }
        let accepted = proposal.accepted_count();
        let rejected = proposal.rejected_count();
        if !reached {
            return Err(ConsensusError::Timeout(phase));
        }
        if proposal.was_rejected(required) {
            return Err(ConsensusError::QuorumFailed {
                accepted,
                rejected,
                required,
            });
        }
        debug!(
            height = proposal.height(),
            hash = %proposal.hash(),
            %phase,
            accepted,
            rejected,
            required,
            "phase decided"
        );
        Ok(())
    }

    fn run_follower(&self, proposal: &Proposal) -> Result<(), ConsensusError> {
        let block = self.await_candidate(proposal)?;
        if let Err(reason) = self.check_candidate(proposal, &block) {
            self.reply_rejected(proposal);
            return Err(reason);
        }
        self.reply(proposal, MessageKind::Promise)?;

        if !proposal.wait_for_phase(Phase::Commit, self.config.phase_wait_timeout) {
            return Err(ConsensusError::Timeout(Phase::Voting));
        }
        if proposal.is_concluded() {
            return Err(ConsensusError::Concluded);
        }

        if let Err(reason) = self.commit_candidate(proposal) {
            self.reply_rejected(proposal);
            return Err(reason);
        }
        self.reply(proposal, MessageKind::Accepted)?;
        self.conclude_accepted(proposal)
    }

    /// Make the candidate block available locally, fetching it from the
    /// proposer if needed.
    fn await_candidate(&self, proposal: &Proposal) -> Result<Block, ConsensusError> {
        let hash = proposal.hash();
        if !self.collab.pending.has_block(&hash)? {
            debug!(
                height = proposal.height(),
                %hash,
                proposer = %proposal.proposer(),
                "requesting candidate block"
            );
            self.collab
                .transport
                .send(&proposal.proposer(), &WireMessage::GetBlock(hash))?;
            if !proposal.wait_for_block(self.config.block_wait_timeout)
                || !self.collab.pending.has_block(&hash)?
            {
                return Err(ConsensusError::BlockUnavailable(hash));
            }
        }
        Ok(self.collab.pending.get_block(&hash)?)
    }

    fn check_candidate(&self, proposal: &Proposal, block: &Block) -> Result<(), ConsensusError> {
        if block.hash != proposal.hash() {
            return Err(ConsensusError::InvalidBlock(format!(
                "hash {} does not match proposal {}",
                block.hash,
                proposal.hash()
            )));
        }
        if block.height != proposal.height() {
            return Err(ConsensusError::InvalidBlock(format!(
                "height {} does not match proposal {}",
                block.height,
                proposal.height()
            )));
        }
        if !self.collab.validator.is_valid(block) {
            return Err(ConsensusError::InvalidBlock(
                "rejected by block validator".to_string(),
            ));
        }
        Ok(())
    }

    /// Append the candidate to the chain and drop it from the pending store.
    fn commit_candidate(&self, proposal: &Proposal) -> Result<(), ConsensusError> {
        let hash = proposal.hash();
        let block = self.collab.pending.get_block(&hash)?;
        self.collab.chain.append(&block)?;

        let committed: Vec<TxHash> = block.transactions.iter().map(|tx| tx.hash).collect();
        self.collab.pending.remove_transactions(&committed)?;
        self.collab.pending.remove_block(&hash)?;
        let pruned = self.collab.pending.prune_blocks(block.height)?;

        if let Some(snapshots) = &self.collab.snapshots {
            snapshots.schedule_snapshot(block.height);
        }
        info!(
            height = block.height,
            %hash,
            transactions = committed.len(),
            pruned,
            "block appended"
        );
        Ok(())
    }

    fn conclude_accepted(&self, proposal: &Proposal) -> Result<(), ConsensusError> {
        proposal.transition_to_phase(Phase::Quorum)?;
        if !proposal.set_result(ProposalResult::Accepted) {
            return Err(ConsensusError::Concluded);
        }
        Ok(())
    }

    /// Conclude as Rejected and release the candidate.
    fn cancel_proposal(&self, proposal: &Proposal) {
        if !proposal.cancel() {
            return;
        }
        let hash = proposal.hash();
        let block = match self.collab.pending.get_block(&hash) {
            Ok(block) => block,
            Err(e) => {
                debug!(height = proposal.height(), %hash, error = %e, "no candidate to release");
                return;
            }
        };

        let appended = matches!(self.collab.chain.head(), Ok(head) if head.hash == hash);
        if proposal.role() == Role::Proposer && !appended {
            let count = block.transactions.len();
            if let Err(e) = self.collab.pending.restore_transactions(block.transactions) {
                warn!(height = proposal.height(), %hash, error = %e, "failed to restore transactions");
            } else {
                debug!(height = proposal.height(), %hash, count, "transactions returned to pool");
            }
        }
        if let Err(e) = self.collab.pending.remove_block(&hash) {
            warn!(height = proposal.height(), %hash, error = %e, "failed to drop candidate block");
        }
    }

    fn reply(&self, proposal: &Proposal, kind: MessageKind) -> Result<(), ConsensusError> {
        let message = WireMessage::Proposal(ProposalMessage::new(kind, proposal.body()));
        self.collab.transport.send(&proposal.proposer(), &message)?;
        debug!(
            height = proposal.height(),
            hash = %proposal.hash(),
            proposer = %proposal.proposer(),
            "sent {}",
            kind.as_str()
        );
        Ok(())
    }

    fn reply_rejected(&self, proposal: &Proposal) {
        if let Err(e) = self.reply(proposal, MessageKind::Rejected) {
            warn!(
                height = proposal.height(),
                hash = %proposal.hash(),
                error = %e,
                "failed to send rejection"
            );
        }
    }

    /// Refuse a Prepare we will never follow and drop its pushed candidate.
    fn refuse_prepare(&self, to: &NodeId, body: ProposalBody) {
        self.release_rival(&body);
        self.send_rejection(to, body);
    }

    fn release_rival(&self, body: &ProposalBody) {
        if self.manager.get_proposal().is_some_and(|p| p.hash() == body.hash) {
            return;
        }
        match self.collab.pending.remove_block(&body.hash) {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(e) => {
                warn!(height = body.height, hash = %body.hash, error = %e, "failed to drop rival candidate")
            }
        }
    }

    fn send_rejection(&self, to: &NodeId, body: ProposalBody) {
        let message = WireMessage::Proposal(ProposalMessage::new(MessageKind::Rejected, body));
        if let Err(e) = self.collab.transport.send(to, &message) {
            warn!(height = body.height, hash = %body.hash, peer = %to, error = %e, "failed to send rejection");
        }
    }

    // ── Network entry points ──────────────────────────────────────────

    /// A remote Prepare arrived.
    ///
    /// Returns the newly registered follower proposal when this node should
    /// follow it; the caller drives it with [`ProposalHandler::drive`] on a
    /// thread of its own. Conflicting or stale proposals are answered with
    /// an explicit Rejected and never registered; a candidate they pushed is
    /// dropped from the pending store.
    pub fn on_prepare(&self, from: NodeId, body: ProposalBody) -> Option<Arc<Proposal>> {
        if body.proposer == self.local_id {
            return None;
        }
        if self.manager.is_proposal_for(&body) {
            debug!(height = body.height, hash = %body.hash, "duplicate prepare ignored");
            return None;
        }
        if let Some(active) = self.manager.get_proposal() {
            info!(
                height = body.height,
                hash = %body.hash,
                active_height = active.height(),
                active_hash = %active.hash(),
                "rejecting prepare: another proposal is active"
            );
            self.refuse_prepare(&from, body);
            return None;
        }

        let expected = match self.collab.chain.current_height() {
            Ok(height) => height + 1,
            Err(e) => {
                warn!(height = body.height, hash = %body.hash, error = %e, "cannot read chain height");
                self.refuse_prepare(&from, body);
                return None;
            }
        };
        if body.height != expected {
            info!(
                height = body.height,
                hash = %body.hash,
                expected,
                "rejecting prepare for unexpected height"
            );
            self.refuse_prepare(&from, body);
            return None;
        }

        let proposal = Arc::new(Proposal::new(body, Role::Follower));
        if let Err(e) = self.manager.set_proposal(Arc::clone(&proposal)) {
            info!(height = body.height, hash = %body.hash, error = %e, "rejecting prepare");
            self.refuse_prepare(&from, body);
            return None;
        }
        // A fresh proposal always accepts Voting; the Prepare opens it.
        if let Err(e) = proposal.transition_to_phase(Phase::Voting) {
            warn!(height = body.height, hash = %body.hash, error = %e, "follower transition failed");
            proposal.cancel();
            self.manager.clear_proposal();
            return None;
        }
        if matches!(self.collab.pending.has_block(&body.hash), Ok(true)) {
            proposal.mark_block_available();
        }
        debug!(height = body.height, hash = %body.hash, proposer = %body.proposer, "following proposal");
        Some(proposal)
    }

    /// The proposer opened the Commit phase.
    pub fn on_commit(&self, from: NodeId, body: ProposalBody) {
        match self.manager.proposal_for(&body) {
            Some(proposal) if proposal.role() == Role::Follower => {
                if let Err(e) = proposal.transition_to_phase(Phase::Commit) {
                    warn!(
                        height = body.height,
                        hash = %body.hash,
                        peer = %from,
                        error = %e,
                        "commit out of order"
                    );
                }
            }
            _ => debug!(height = body.height, hash = %body.hash, peer = %from, "commit for unknown proposal dropped"),
        }
    }

    /// A vote (Promise, Accepted or Rejected) for one of our proposals.
    ///
    /// Returns whether the vote was counted. Promise is only counted during
    /// Voting so a late one never lands in the Commit epoch.
    pub fn on_vote(&self, from: NodeId, message: ProposalMessage) -> bool {
        let Some(proposal) = self.manager.proposal_for(&message.body) else {
            debug!(
                height = message.body.height,
                hash = %message.body.hash,
                peer = %from,
                "{} for unknown proposal dropped",
                message.kind.as_str()
            );
            return false;
        };
        if proposal.role() != Role::Proposer {
            return false;
        }
        let counted = match message.kind {
            MessageKind::Promise => proposal.accept_in_phase(from, Phase::Voting),
            MessageKind::Accepted => proposal.accept_proposal(from),
            MessageKind::Rejected => proposal.reject_proposal(from),
            MessageKind::Prepare | MessageKind::Commit => false,
        };
        debug!(
            height = proposal.height(),
            hash = %proposal.hash(),
            peer = %from,
            phase = %proposal.phase(),
            counted,
            "received {}",
            message.kind.as_str()
        );
        counted
    }

    /// A candidate block arrived (pushed on discovery or fetched on request).
    pub fn on_block(&self, from: NodeId, block: Block) {
        match self.collab.chain.current_height() {
            Ok(height) if block.height <= height => {
                debug!(height = block.height, hash = %block.hash, peer = %from, "stale block dropped");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(hash = %block.hash, error = %e, "cannot read chain height");
                return;
            }
        }
        if !block.verify_hash() {
            warn!(height = block.height, hash = %block.hash, peer = %from, "block hash mismatch, dropped");
            return;
        }
        let hash = block.hash;
        if let Err(e) = self.collab.pending.put_block(&block) {
            warn!(height = block.height, %hash, error = %e, "failed to store candidate block");
            return;
        }
        if let Some(proposal) = self.manager.get_proposal() {
            if proposal.hash() == hash {
                proposal.mark_block_available();
            }
        }
    }

    /// A peer asked for a candidate block.
    pub fn on_get_block(&self, from: NodeId, hash: BlockHash) {
        match self.collab.pending.get_block(&hash) {
            Ok(block) => {
                if let Err(e) = self.collab.transport.send(&from, &WireMessage::Block(block)) {
                    warn!(%hash, peer = %from, error = %e, "failed to serve block");
                }
            }
            Err(e) => debug!(%hash, peer = %from, error = %e, "requested block not held"),
        }
    }
}
