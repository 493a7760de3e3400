//! Proposal phases, results and roles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a proposal in the agreement protocol.
///
/// The derived ordering is the protocol order: a proposal only ever moves
/// to a greater phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Created, not yet broadcast.
    Proposal,
    /// Prepare broadcast; collecting first-round votes.
    Voting,
    /// Commit broadcast; collecting second-round votes.
    Commit,
    /// Concluded, successfully or not. Terminal.
    Quorum,
}

impl Phase {
    /// The immediate successor, or `None` for the terminal phase.
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Proposal => Some(Phase::Voting),
            Phase::Voting => Some(Phase::Commit),
            Phase::Commit => Some(Phase::Quorum),
            Phase::Quorum => None,
        }
    }

    /// Phases that collect peer votes (entering one starts a fresh vote epoch).
    pub fn is_voting(self) -> bool {
        matches!(self, Phase::Voting | Phase::Commit)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Proposal => write!(f, "proposal"),
            Phase::Voting => write!(f, "voting"),
            Phase::Commit => write!(f, "commit"),
            Phase::Quorum => write!(f, "quorum"),
        }
    }
}

/// Final outcome of a proposal, set once the Quorum phase is reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalResult {
    Accepted,
    Rejected,
}

/// Which side of the protocol this node plays for a given proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// This node assembled the candidate and drives the phases.
    Proposer,
    /// This node learned the proposal from the network and acknowledges it.
    Follower,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_matches_protocol() {
        assert!(Phase::Proposal < Phase::Voting);
        assert!(Phase::Voting < Phase::Commit);
        assert!(Phase::Commit < Phase::Quorum);
    }

    #[test]
    fn successor_chain_ends_at_quorum() {
        let mut phase = Phase::Proposal;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            phase = next;
            seen.push(phase);
        }
        assert_eq!(
            seen,
            vec![Phase::Proposal, Phase::Voting, Phase::Commit, Phase::Quorum]
        );
    }

    #[test]
    fn only_voting_and_commit_collect_votes() {
        assert!(!Phase::Proposal.is_voting());
        assert!(Phase::Voting.is_voting());
        assert!(Phase::Commit.is_voting());
        assert!(!Phase::Quorum.is_voting());
    }
}
