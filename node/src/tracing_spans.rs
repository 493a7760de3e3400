//! Pre-built [`tracing::Span`] constructors for common node operations.
//!
//! Using consistent span names and field sets across the codebase makes it
//! easy to filter and correlate the logs of one proposal across threads.

use cinder_consensus::Proposal;
use cinder_types::NodeId;
use tracing::{debug_span, info_span, Span};

/// Span covering one proposal from registration to conclusion.
pub fn proposal_span(proposal: &Proposal) -> Span {
    info_span!(
        "proposal",
        height = proposal.height(),
        hash = %proposal.hash(),
        proposer = %proposal.proposer(),
        role = ?proposal.role(),
    )
}

/// Span covering the handling of a single inbound message.
pub fn inbound_span(peer: &NodeId, msg_type: &str) -> Span {
    debug_span!("inbound", peer = %peer, msg_type = %msg_type)
}

/// Span covering one mining loop tick.
pub fn mining_tick_span(node: &NodeId) -> Span {
    debug_span!("mining_tick", node = %node)
}
