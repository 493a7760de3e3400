//! Node wiring.
//!
//! [`CinderNode`] owns one instance of every service the proposal core
//! needs and connects them:
//!
//! ```text
//! transport ──▶ Dispatcher ──▶ ProposalHandler ◀── MiningLoop (cinder-miner)
//!                   │                 │
//!                   └─ cinder-follower threads    └─ pending / chain / validator / snapshots
//! ```
//!
//! The transport is injected; the caller attaches [`CinderNode::dispatcher`]
//! to it so inbound messages reach the node.

use std::sync::Arc;

use cinder_consensus::{
    BlockValidator, Collaborators, PeerTransport, ProposalHandler, ProposalManager,
    SnapshotScheduler,
};
use cinder_store::{ChainStore, PendingStore};
use cinder_types::{NodeId, Transaction};
use tracing::info;

use crate::assembler::BlockAssembler;
use crate::config::NodeConfig;
use crate::dispatcher::Dispatcher;
use crate::metrics::ConsensusMetrics;
use crate::miner::{MiningLoop, TickOutcome};
use crate::snapshot::SnapshotJob;
use crate::validator::StructuralValidator;
use crate::NodeError;

pub struct CinderNode {
    id: NodeId,
    config: NodeConfig,
    handler: Arc<ProposalHandler>,
    dispatcher: Arc<Dispatcher>,
    miner: Arc<MiningLoop>,
    metrics: Arc<ConsensusMetrics>,
    snapshots: Option<Arc<SnapshotJob>>,
}

impl CinderNode {
    /// Build a node that validates candidates with [`StructuralValidator`].
    pub fn new(
        config: NodeConfig,
        transport: Arc<dyn PeerTransport>,
        pending: Arc<dyn PendingStore>,
        chain: Arc<dyn ChainStore>,
    ) -> Result<Self, NodeError> {
        let validator = Arc::new(StructuralValidator::new(
            Arc::clone(&chain),
            config.max_transactions_per_block,
        ));
        Self::with_validator(config, transport, pending, chain, validator)
    }

    pub fn with_validator(
        config: NodeConfig,
        transport: Arc<dyn PeerTransport>,
        pending: Arc<dyn PendingStore>,
        chain: Arc<dyn ChainStore>,
        validator: Arc<dyn BlockValidator>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let id = config.node_id();
        let metrics = Arc::new(ConsensusMetrics::new());

        let snapshots = if config.enable_snapshots {
            Some(Arc::new(SnapshotJob::new(
                config.data_dir.join(id.to_string()),
                config.snapshot_interval,
                Arc::clone(&chain),
            )?))
        } else {
            None
        };

        let collab = Collaborators {
            transport,
            pending,
            chain,
            validator,
            snapshots: snapshots
                .clone()
                .map(|job| job as Arc<dyn SnapshotScheduler>),
        };
        let handler = Arc::new(ProposalHandler::new(
            id,
            Arc::new(ProposalManager::new()),
            collab,
            config.consensus(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&handler), Arc::clone(&metrics)));
        let miner = Arc::new(MiningLoop::new(
            Arc::clone(&handler),
            BlockAssembler::new(config.max_transactions_per_block),
            Arc::clone(&metrics),
            config.mining_interval(),
            config.mining_jitter(),
        ));

        if let Ok(height) = handler.collaborators().chain.current_height() {
            metrics.chain_height.set(height);
        }

        Ok(Self {
            id,
            config,
            handler,
            dispatcher,
            miner,
            metrics,
            snapshots,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn handler(&self) -> &Arc<ProposalHandler> {
        &self.handler
    }

    /// The inbound entry point to attach to the transport.
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn metrics(&self) -> &Arc<ConsensusMetrics> {
        &self.metrics
    }

    pub fn is_running(&self) -> bool {
        self.miner.is_running()
    }

    /// Queue a transaction for a future block.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<(), NodeError> {
        self.handler.collaborators().pending.add_transaction(tx)?;
        Ok(())
    }

    pub fn chain_height(&self) -> Result<i64, NodeError> {
        Ok(self.handler.collaborators().chain.current_height()?)
    }

    /// Run one mining iteration on the calling thread.
    pub fn tick(&self) -> TickOutcome {
        self.miner.tick()
    }

    /// Start the mining thread.
    pub fn start(&self) -> Result<(), NodeError> {
        self.miner.start()?;
        info!(
            node = %self.id,
            max_transactions = self.config.max_transactions_per_block,
            snapshots = self.snapshots.is_some(),
            "node started"
        );
        Ok(())
    }

    /// Stop mining and wait for in-flight proposals and snapshots.
    pub fn stop(&self) {
        self.miner.stop();
        self.dispatcher.join_followers();
        if let Some(job) = &self.snapshots {
            job.wait_idle();
        }
        info!(node = %self.id, "node stopped");
    }
}
