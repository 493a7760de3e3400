//! Integration tests exercising whole nodes over the loopback network:
//! mining tick → Prepare/Promise → Commit/Accepted → append on every node.
//!
//! These tests wire together components that are normally only connected
//! inside the daemon, verifying the protocol works end-to-end and not just
//! in isolation.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cinder_consensus::{BlockValidator, Proposal, Role};
use cinder_messages::{ProposalBody, WireMessage};
use cinder_node::{ChainSnapshot, CinderNode, NodeConfig, TickOutcome};
use cinder_nullables::{
    LoopbackNetwork, NullChainStore, NullPendingStore, NullTransport, NullValidator,
};
use cinder_store::{ChainStore, PendingStore};
use cinder_types::{BlockHash, NodeId, Timestamp, Transaction};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Member {
    node: Arc<CinderNode>,
    pending: Arc<NullPendingStore>,
    chain: Arc<NullChainStore>,
}

struct Cluster {
    network: LoopbackNetwork,
    members: Vec<Member>,
}

impl Cluster {
    fn node(&self, i: usize) -> &CinderNode {
        &self.members[i].node
    }

    fn shutdown(self) {
        for m in &self.members {
            m.node.stop();
        }
        self.network.shutdown();
    }
}

fn config(max: usize) -> NodeConfig {
    NodeConfig {
        max_transactions_per_block: max,
        mining_interval_ms: 20,
        mining_jitter_ms: 10,
        voting_timeout_ms: 1_500,
        block_wait_timeout_ms: 500,
        phase_wait_timeout_ms: 2_000,
        ..NodeConfig::default()
    }
}

/// One cluster member per entry; `None` uses the structural validator.
fn cluster(cfg: &NodeConfig, validators: Vec<Option<Arc<dyn BlockValidator>>>) -> Cluster {
    let network = LoopbackNetwork::new();
    let members = validators
        .into_iter()
        .map(|validator| {
            let id = NodeId::random();
            let pending = Arc::new(NullPendingStore::new());
            let chain = Arc::new(NullChainStore::new());
            let mut config = cfg.clone();
            config.node_id = Some(id.as_uuid());
            let transport = network.endpoint(id);
            let node = match validator {
                Some(v) => CinderNode::with_validator(
                    config,
                    transport,
                    pending.clone(),
                    chain.clone(),
                    v,
                ),
                None => CinderNode::new(config, transport, pending.clone(), chain.clone()),
            }
            .expect("node");
            let node = Arc::new(node);
            network.attach(id, node.dispatcher());
            Member {
                node,
                pending,
                chain,
            }
        })
        .collect();
    Cluster { network, members }
}

fn feed(node: &CinderNode, count: i64, offset: i64) {
    for i in 0..count {
        let ts = offset + i;
        node.submit_transaction(Transaction::new(Timestamp::new(ts), ts.to_be_bytes().to_vec()))
            .unwrap();
    }
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

fn idle(c: &Cluster) -> bool {
    c.members
        .iter()
        .all(|m| !m.node.handler().manager().has_proposal())
}

// ---------------------------------------------------------------------------
// Scenario A: three peers accept, the proposal commits everywhere
// ---------------------------------------------------------------------------

#[test]
fn three_accepting_peers_commit_the_block() {
    let c = cluster(&config(4), vec![None, None, None, None]);
    feed(c.node(0), 4, 1);

    assert_eq!(c.node(0).tick(), TickOutcome::Committed { height: 1 });

    let head = c.members[0].chain.head().unwrap();
    assert!(wait_until(Duration::from_secs(5), || c
        .members
        .iter()
        .all(|m| m.chain.head().map(|h| h.hash == head.hash).unwrap_or(false))));
    assert!(wait_until(Duration::from_secs(5), || idle(&c)));
    assert_eq!(c.node(0).metrics().proposals_committed.get(), 1);
    assert!(c.node(0).metrics().votes_received.get() >= 2);
    assert_eq!(c.members[0].pending.pending_transaction_count().unwrap(), 0);
    c.shutdown();
}

// ---------------------------------------------------------------------------
// Scenario B: peers reject at Voting, the proposal is cancelled
// ---------------------------------------------------------------------------

#[test]
fn rejecting_peers_cancel_the_proposal() {
    let rejecting = || -> Option<Arc<dyn BlockValidator>> { Some(Arc::new(NullValidator::rejecting())) };
    let c = cluster(&config(2), vec![None, rejecting(), rejecting(), rejecting()]);
    feed(c.node(0), 2, 1);

    assert_eq!(c.node(0).tick(), TickOutcome::Cancelled { height: 1 });

    assert!(!c.node(0).handler().manager().has_proposal());
    assert_eq!(c.members[0].pending.pending_transaction_count().unwrap(), 2);
    assert_eq!(c.members[0].pending.block_count(), 0);
    assert!(wait_until(Duration::from_secs(5), || idle(&c)));
    for m in &c.members {
        assert_eq!(m.chain.current_height().unwrap(), 0);
    }
    c.shutdown();
}

// ---------------------------------------------------------------------------
// Scenario C: a busy follower rejects a conflicting Prepare
// ---------------------------------------------------------------------------

#[test]
fn busy_follower_rejects_conflicting_prepare() {
    let c = cluster(&config(1), vec![None, None]);
    let follower = c.node(1);

    // The follower is already committed to someone else's proposal at height 1.
    let held = Arc::new(Proposal::new(
        ProposalBody {
            timestamp: Timestamp::new(1),
            height: 1,
            hash: BlockHash::new([0xAB; 32]),
            proposer: NodeId::new([0xCD; 16]),
        },
        Role::Follower,
    ));
    follower
        .handler()
        .manager()
        .set_proposal(Arc::clone(&held))
        .unwrap();

    feed(c.node(0), 1, 1);
    let started = Instant::now();
    assert_eq!(c.node(0).tick(), TickOutcome::Cancelled { height: 1 });
    // The explicit Rejected ends the round well before the voting timeout.
    assert!(started.elapsed() < Duration::from_millis(1_500));
    assert!(wait_until(Duration::from_secs(5), || c
        .node(0)
        .metrics()
        .votes_received
        .get()
        == 1));

    let still = follower.handler().manager().get_proposal().unwrap();
    assert!(Arc::ptr_eq(&still, &held));
    assert_eq!(follower.metrics().follower_proposals.get(), 0);

    follower.handler().manager().clear_proposal();
    c.shutdown();
}

// ---------------------------------------------------------------------------
// Scenario D: the candidate never reaches the follower; both sides give up
// ---------------------------------------------------------------------------

#[test]
fn missing_block_times_out_on_both_sides() {
    let mut cfg = config(1);
    cfg.voting_timeout_ms = 800;
    cfg.block_wait_timeout_ms = 300;
    let c = cluster(&cfg, vec![None, None]);
    let follower_id = c.node(1).id();
    c.network.set_drop_filter(move |_, to, msg| {
        *to == follower_id && matches!(msg, WireMessage::BlockDiscovered(_) | WireMessage::Block(_))
    });

    feed(c.node(0), 1, 1);
    let started = Instant::now();
    assert_eq!(c.node(0).tick(), TickOutcome::Cancelled { height: 1 });
    assert!(started.elapsed() >= Duration::from_millis(800));

    assert!(wait_until(Duration::from_secs(5), || idle(&c)));
    assert!(c.network.dropped_count() >= 1);
    assert_eq!(c.node(1).metrics().proposals_cancelled.get(), 1);
    assert_eq!(c.members[0].pending.pending_transaction_count().unwrap(), 1);
    c.shutdown();
}

// ---------------------------------------------------------------------------
// Mining threads converge on one chain
// ---------------------------------------------------------------------------

#[test]
fn mining_cluster_converges() {
    // With one peer every proposal needs that peer's vote, so the follower
    // cannot be left behind by a round it was too busy to join.
    let c = cluster(&config(3), vec![None, None]);
    for m in &c.members {
        m.node.start().unwrap();
    }

    // Only node 0 receives traffic so there is a single proposer.
    feed(c.node(0), 12, 1);
    assert!(wait_until(Duration::from_secs(20), || c
        .members
        .iter()
        .all(|m| m.chain.current_height().unwrap() >= 4)));

    for m in &c.members {
        m.node.stop();
    }
    assert!(wait_until(Duration::from_secs(5), || idle(&c)));

    let reference = c.members[0].chain.blocks();
    assert_eq!(reference.len(), 5);
    for m in &c.members[1..] {
        assert_eq!(m.chain.blocks(), reference);
        assert_eq!(m.pending.block_count(), 0);
    }
    assert!(c.node(1).metrics().follower_proposals.get() >= 4);
    c.network.shutdown();
}

// ---------------------------------------------------------------------------
// Snapshots land in a per-node directory
// ---------------------------------------------------------------------------

#[test]
fn committed_block_is_snapshotted_under_node_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(1);
    cfg.data_dir = dir.path().to_path_buf();
    cfg.enable_snapshots = true;
    cfg.snapshot_interval = 1;

    let node = CinderNode::new(
        cfg,
        Arc::new(NullTransport::new(0)),
        Arc::new(NullPendingStore::new()),
        Arc::new(NullChainStore::new()),
    )
    .unwrap();
    feed(&node, 1, 1);
    assert_eq!(node.tick(), TickOutcome::Committed { height: 1 });
    node.stop();

    let path = dir
        .path()
        .join(node.id().to_string())
        .join(ChainSnapshot::file_name(1));
    let snapshot = ChainSnapshot::read_from(&path).unwrap();
    assert_eq!(snapshot.height, 1);
    assert!(!dir.path().join(ChainSnapshot::file_name(1)).exists());
}
