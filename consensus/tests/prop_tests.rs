use proptest::prelude::*;

use cinder_consensus::{required_votes, Phase, Proposal, ProposalResult, Role};
use cinder_messages::ProposalBody;
use cinder_types::{BlockHash, NodeId, Timestamp};

#[derive(Clone, Debug)]
enum Op {
    Transition(Phase),
    Accept(u8),
    Reject(u8),
    SetResult(bool),
    Cancel,
}

fn phase() -> impl Strategy<Value = Phase> {
    prop_oneof![
        Just(Phase::Proposal),
        Just(Phase::Voting),
        Just(Phase::Commit),
        Just(Phase::Quorum),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => phase().prop_map(Op::Transition),
        4 => (0u8..6).prop_map(Op::Accept),
        3 => (0u8..6).prop_map(Op::Reject),
        1 => any::<bool>().prop_map(Op::SetResult),
        1 => Just(Op::Cancel),
    ]
}

fn proposal() -> Proposal {
    Proposal::new(
        ProposalBody {
            timestamp: Timestamp::new(1),
            height: 1,
            hash: BlockHash::new([1; 32]),
            proposer: NodeId::new([1; 16]),
        },
        Role::Proposer,
    )
}

fn apply(p: &Proposal, op: &Op) {
    match op {
        Op::Transition(next) => {
            let _ = p.transition_to_phase(*next);
        }
        Op::Accept(n) => {
            p.accept_proposal(NodeId::new([*n; 16]));
        }
        Op::Reject(n) => {
            p.reject_proposal(NodeId::new([*n; 16]));
        }
        Op::SetResult(accepted) => {
            let result = if *accepted {
                ProposalResult::Accepted
            } else {
                ProposalResult::Rejected
            };
            p.set_result(result);
        }
        Op::Cancel => {
            p.cancel();
        }
    }
}

proptest! {
    /// The observed phase never moves backwards, whatever is requested.
    #[test]
    fn phase_never_decreases(ops in prop::collection::vec(op(), 0..40)) {
        let p = proposal();
        let mut last = p.phase();
        for op in &ops {
            apply(&p, op);
            let now = p.phase();
            prop_assert!(now >= last, "{:?} -> {:?} after {:?}", last, now, op);
            last = now;
        }
    }

    /// A result exists exactly when the proposal reached Quorum, and once
    /// set it never changes.
    #[test]
    fn result_only_at_quorum_and_final(ops in prop::collection::vec(op(), 0..40)) {
        let p = proposal();
        let mut settled: Option<ProposalResult> = None;
        for op in &ops {
            apply(&p, op);
            if p.phase() != Phase::Quorum {
                prop_assert_eq!(p.result(), None);
            }
            if let Some(prev) = settled {
                prop_assert_eq!(p.result(), Some(prev));
            }
            settled = p.result();
        }
    }

    /// Repeated votes from the same peer count once, and a peer is never
    /// in both sets.
    #[test]
    fn votes_are_idempotent(votes in prop::collection::vec((0u8..8, any::<bool>()), 0..64)) {
        let p = proposal();
        p.transition_to_phase(Phase::Voting).unwrap();
        let mut seen = std::collections::HashSet::new();
        for (n, accept) in &votes {
            let id = NodeId::new([*n; 16]);
            let counted = if *accept { p.accept_proposal(id) } else { p.reject_proposal(id) };
            prop_assert_eq!(counted, seen.insert(*n));
        }
        prop_assert_eq!(p.accepted_count() + p.rejected_count(), seen.len());
    }

    /// Quorum is a simple majority of peers, never more than all of them.
    #[test]
    fn required_votes_bounds(peers in 0usize..10_000) {
        let required = required_votes(peers);
        prop_assert!(required <= peers);
        if peers >= 1 {
            prop_assert!(required >= 1);
        }
        if peers >= 2 {
            prop_assert_eq!(required, peers / 2);
        }
    }
}
