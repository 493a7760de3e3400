//! Discovery/mining loop.
//!
//! A dedicated `cinder-miner` thread ticks every `mining_interval` plus a
//! random jitter. Each tick either does nothing (a proposal is already
//! outstanding, or the pool is not full yet) or assembles a candidate block
//! and drives it as proposer to completion before the next tick.
//!
//! The admission guard is the only backpressure: while any proposal (ours
//! or one we follow) is registered, ticks return [`TickOutcome::Busy`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cinder_consensus::{Proposal, ProposalHandler, ProposalOutcome, Role};
use cinder_messages::{ProposalBody, WireMessage};
use cinder_types::Block;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::assembler::BlockAssembler;
use crate::metrics::ConsensusMetrics;
use crate::tracing_spans::{mining_tick_span, proposal_span};
use crate::NodeError;

/// What one mining tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A proposal was already registered.
    Busy,
    /// Not enough pending transactions.
    Idle,
    /// Our block was appended at `height`.
    Committed { height: i64 },
    /// Our proposal for `height` ended Rejected.
    Cancelled { height: i64 },
    /// A store or transport error before the proposal started.
    Failed,
}

pub struct MiningLoop {
    handler: Arc<ProposalHandler>,
    assembler: BlockAssembler,
    metrics: Arc<ConsensusMetrics>,
    interval: Duration,
    jitter: Duration,
    running: AtomicBool,
    stop: Mutex<bool>,
    wake: Condvar,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl MiningLoop {
    pub fn new(
        handler: Arc<ProposalHandler>,
        assembler: BlockAssembler,
        metrics: Arc<ConsensusMetrics>,
        interval: Duration,
        jitter: Duration,
    ) -> Self {
        Self {
            handler,
            assembler,
            metrics,
            interval,
            jitter,
            running: AtomicBool::new(false),
            stop: Mutex::new(false),
            wake: Condvar::new(),
            thread: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one iteration on the calling thread.
    pub fn tick(&self) -> TickOutcome {
        let span = mining_tick_span(&self.handler.local_id());
        let _enter = span.enter();

        if self.handler.manager().has_proposal() {
            return TickOutcome::Busy;
        }
        let peers = self.handler.collaborators().transport.connected_peer_count();
        self.metrics.peer_count.set(peers as i64);

        match self.try_propose() {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "mining tick failed");
                TickOutcome::Failed
            }
        }
    }

    fn try_propose(&self) -> Result<TickOutcome, NodeError> {
        let collab = self.handler.collaborators();
        let pending = collab.pending.as_ref();
        if !self.assembler.is_ready(pending)? {
            return Ok(TickOutcome::Idle);
        }

        let head = collab.chain.head()?;
        let local = self.handler.local_id();
        let Some(block) = self.assembler.assemble(local, &head, pending)? else {
            return Ok(TickOutcome::Idle);
        };
        if let Err(e) = pending.put_block(&block) {
            pending.restore_transactions(block.transactions)?;
            return Err(e.into());
        }

        let body = ProposalBody {
            timestamp: block.timestamp,
            height: block.height,
            hash: block.hash,
            proposer: local,
        };
        let proposal = Arc::new(Proposal::new(body, Role::Proposer));
        if let Err(e) = self.handler.manager().set_proposal(Arc::clone(&proposal)) {
            // A follower registered between the busy check and now.
            debug!(height = block.height, error = %e, "lost the admission race");
            self.abandon(block)?;
            return Ok(TickOutcome::Busy);
        }
        self.metrics.proposals_started.inc();
        info!(
            height = block.height,
            hash = %block.hash,
            transactions = block.transactions.len(),
            "proposing block"
        );

        // Followers fall back to GetBlock if this push is lost.
        if let Err(e) = collab
            .transport
            .broadcast(&WireMessage::BlockDiscovered(block))
        {
            warn!(height = body.height, hash = %body.hash, error = %e, "block announcement failed");
        }

        let span = proposal_span(&proposal);
        let outcome = span.in_scope(|| self.handler.drive(&proposal));
        self.metrics.record_outcome(&outcome, proposal.age());

        Ok(match outcome {
            ProposalOutcome::Committed { height, .. } => TickOutcome::Committed { height },
            ProposalOutcome::Cancelled { height, .. } => TickOutcome::Cancelled { height },
        })
    }

    /// Return a never-proposed candidate's transactions to the pool.
    fn abandon(&self, block: Block) -> Result<(), NodeError> {
        let pending = &self.handler.collaborators().pending;
        let hash = block.hash;
        pending.restore_transactions(block.transactions)?;
        pending.remove_block(&hash)?;
        Ok(())
    }

    fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.interval;
        }
        self.interval + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    /// Sleep for `delay` unless stopped first. Returns whether to keep going.
    fn pause(&self, delay: Duration) -> bool {
        let stop = self.stop.lock().unwrap_or_else(PoisonError::into_inner);
        let (stop, _) = self
            .wake
            .wait_timeout_while(stop, delay, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        !*stop
    }

    /// Spawn the `cinder-miner` thread.
    pub fn start(self: &Arc<Self>) -> Result<(), NodeError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(NodeError::AlreadyRunning);
        }
        *self.stop.lock().unwrap_or_else(PoisonError::into_inner) = false;

        let this = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("cinder-miner".to_string())
            .spawn(move || {
                info!(node = %this.handler.local_id(), "mining loop started");
                while this.pause(this.next_delay()) {
                    let outcome = this.tick();
                    debug!(?outcome, "mining tick");
                }
                info!(node = %this.handler.local_id(), "mining loop stopped");
            });
        match spawned {
            Ok(handle) => {
                *self.thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Stop the thread and wait for it. A proposal in flight finishes first.
    pub fn stop(&self) {
        *self.stop.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.wake.notify_all();
        let handle = self.thread.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("mining thread panicked");
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_consensus::{Collaborators, ConsensusConfig, ProposalManager};
    use cinder_messages::MessageKind;
    use cinder_nullables::{NullChainStore, NullPendingStore, NullTransport, NullValidator};
    use cinder_store::{ChainStore, PendingStore};
    use cinder_types::{NodeId, Timestamp, Transaction};

    struct Rig {
        transport: Arc<NullTransport>,
        pending: Arc<NullPendingStore>,
        chain: Arc<NullChainStore>,
        miner: Arc<MiningLoop>,
    }

    fn rig(peers: usize, max: usize) -> Rig {
        let transport = Arc::new(NullTransport::new(peers));
        let pending = Arc::new(NullPendingStore::new());
        let chain = Arc::new(NullChainStore::new());
        let collab = Collaborators {
            transport: transport.clone(),
            pending: pending.clone(),
            chain: chain.clone(),
            validator: Arc::new(NullValidator::accepting()),
            snapshots: None,
        };
        let config = ConsensusConfig {
            voting_timeout: Duration::from_millis(100),
            ..ConsensusConfig::default()
        };
        let handler = Arc::new(ProposalHandler::new(
            NodeId::new([1; 16]),
            Arc::new(ProposalManager::new()),
            collab,
            config,
        ));
        let miner = Arc::new(MiningLoop::new(
            handler,
            BlockAssembler::new(max),
            Arc::new(ConsensusMetrics::new()),
            Duration::from_millis(10),
            Duration::from_millis(5),
        ));
        Rig {
            transport,
            pending,
            chain,
            miner,
        }
    }

    fn feed(rig: &Rig, count: i64) {
        for i in 0..count {
            rig.pending
                .add_transaction(Transaction::new(Timestamp::new(i), vec![i as u8]))
                .unwrap();
        }
    }

    #[test]
    fn idle_until_pool_is_full() {
        let rig = rig(0, 3);
        feed(&rig, 2);
        assert_eq!(rig.miner.tick(), TickOutcome::Idle);
        assert_eq!(rig.chain.current_height().unwrap(), 0);
    }

    #[test]
    fn solo_node_commits_and_announces() {
        let rig = rig(0, 2);
        feed(&rig, 3);
        assert_eq!(rig.miner.tick(), TickOutcome::Committed { height: 1 });
        assert_eq!(rig.chain.current_height().unwrap(), 1);
        assert_eq!(rig.pending.pending_transaction_count().unwrap(), 1);
        assert_eq!(rig.pending.block_count(), 0);
        assert!(matches!(
            rig.transport.sent().first(),
            Some((None, WireMessage::BlockDiscovered(b))) if b.height == 1
        ));
        assert_eq!(rig.miner.metrics.proposals_committed.get(), 1);
        assert_eq!(rig.miner.metrics.chain_height.get(), 1);
    }

    #[test]
    fn busy_while_a_proposal_is_registered() {
        let rig = rig(0, 1);
        feed(&rig, 1);
        let body = ProposalBody {
            timestamp: Timestamp::new(1),
            height: 1,
            hash: Block::genesis().hash,
            proposer: NodeId::new([9; 16]),
        };
        rig.miner
            .handler
            .manager()
            .set_proposal(Arc::new(Proposal::new(body, Role::Follower)))
            .unwrap();
        assert_eq!(rig.miner.tick(), TickOutcome::Busy);
        assert_eq!(rig.pending.pending_transaction_count().unwrap(), 1);
    }

    #[test]
    fn cancelled_proposal_returns_transactions() {
        let rig = rig(2, 2);
        feed(&rig, 2);
        assert_eq!(rig.miner.tick(), TickOutcome::Cancelled { height: 1 });
        assert_eq!(rig.pending.pending_transaction_count().unwrap(), 2);
        assert_eq!(rig.pending.block_count(), 0);
        assert!(rig
            .transport
            .sent_proposals()
            .iter()
            .any(|(_, m)| m.kind == MessageKind::Prepare));
        assert_eq!(rig.miner.metrics.proposals_cancelled.get(), 1);
    }

    #[test]
    fn abandoned_block_returns_transactions_even_if_removal_fails() {
        let rig = rig(0, 2);
        feed(&rig, 2);
        let head = rig.chain.head().unwrap();
        let block = rig
            .miner
            .assembler
            .assemble(NodeId::new([1; 16]), &head, rig.pending.as_ref())
            .unwrap()
            .unwrap();
        rig.pending.put_block(&block).unwrap();
        assert_eq!(rig.pending.pending_transaction_count().unwrap(), 0);

        rig.pending.set_fail_block_removal(true);
        assert!(rig.miner.abandon(block).is_err());
        assert_eq!(rig.pending.pending_transaction_count().unwrap(), 2);
    }

    #[test]
    fn store_failure_is_reported_not_raised() {
        let rig = rig(0, 1);
        feed(&rig, 1);
        rig.pending.set_fail_writes(true);
        assert_eq!(rig.miner.tick(), TickOutcome::Failed);
    }

    #[test]
    fn thread_mines_until_stopped() {
        let rig = rig(0, 1);
        feed(&rig, 3);
        rig.miner.start().unwrap();
        assert!(matches!(rig.miner.start(), Err(NodeError::AlreadyRunning)));

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while rig.chain.current_height().unwrap() < 3 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        rig.miner.stop();
        assert!(!rig.miner.is_running());
        assert_eq!(rig.chain.current_height().unwrap(), 3);
    }
}
