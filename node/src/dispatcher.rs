//! Inbound message dispatcher.
//!
//! The transport calls [`Dispatcher::handle`] from its own threads. Quick
//! messages (votes, Commit, block traffic) are handled inline; a Prepare
//! that this node agrees to follow is driven on a short-lived
//! `cinder-follower` thread so the transport thread never blocks on a
//! proposal wait.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use cinder_consensus::{InboundHandler, Proposal, ProposalHandler};
use cinder_messages::{MessageKind, WireMessage};
use cinder_types::NodeId;
use tracing::{debug, warn};

use crate::metrics::ConsensusMetrics;
use crate::tracing_spans::{inbound_span, proposal_span};

pub struct Dispatcher {
    handler: Arc<ProposalHandler>,
    metrics: Arc<ConsensusMetrics>,
    followers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(handler: Arc<ProposalHandler>, metrics: Arc<ConsensusMetrics>) -> Self {
        Self {
            handler,
            metrics,
            followers: Mutex::new(Vec::new()),
        }
    }

    fn spawn_follower(&self, proposal: Arc<Proposal>) {
        self.metrics.follower_proposals.inc();
        let handler = Arc::clone(&self.handler);
        let metrics = Arc::clone(&self.metrics);
        let driven = Arc::clone(&proposal);
        let spawned = thread::Builder::new()
            .name("cinder-follower".to_string())
            .spawn(move || {
                let span = proposal_span(&driven);
                let _enter = span.enter();
                let outcome = handler.drive(&driven);
                metrics.record_outcome(&outcome, driven.age());
            });

        match spawned {
            Ok(handle) => {
                let mut followers = self.followers.lock().unwrap_or_else(PoisonError::into_inner);
                followers.retain(|f| !f.is_finished());
                followers.push(handle);
            }
            Err(e) => {
                warn!(
                    height = proposal.height(),
                    hash = %proposal.hash(),
                    error = %e,
                    "failed to spawn follower thread"
                );
                proposal.cancel();
                self.handler.manager().clear_proposal();
            }
        }
    }

    /// Join every follower thread still running.
    pub fn join_followers(&self) {
        let followers: Vec<JoinHandle<()>> = self
            .followers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in followers {
            if handle.join().is_err() {
                warn!("follower thread panicked");
            }
        }
    }
}

impl InboundHandler for Dispatcher {
    fn handle(&self, from: NodeId, message: WireMessage) {
        let span = inbound_span(&from, message.label());
        let _enter = span.enter();

        match message {
            WireMessage::BlockDiscovered(block) | WireMessage::Block(block) => {
                self.handler.on_block(from, block)
            }
            WireMessage::GetBlock(hash) => self.handler.on_get_block(from, hash),
            WireMessage::Proposal(msg) => match msg.kind {
                MessageKind::Prepare => {
                    if let Some(proposal) = self.handler.on_prepare(from, msg.body) {
                        self.spawn_follower(proposal);
                    }
                }
                MessageKind::Commit => self.handler.on_commit(from, msg.body),
                MessageKind::Promise | MessageKind::Accepted | MessageKind::Rejected => {
                    if self.handler.on_vote(from, msg) {
                        self.metrics.votes_received.inc();
                    } else {
                        debug!(kind = msg.kind.as_str(), "vote not counted");
                    }
                }
            },
        }
    }
}
