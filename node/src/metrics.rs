//! Prometheus metrics for the proposal core.
//!
//! The [`ConsensusMetrics`] struct owns a dedicated [`Registry`] so several
//! in-process nodes (as in a simulated cluster) never collide on metric
//! names. [`ConsensusMetrics::encode`] renders the Prometheus text
//! exposition format.

use std::time::Duration;

use cinder_consensus::ProposalOutcome;
use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

/// Central collection of all node-level Prometheus metrics.
pub struct ConsensusMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Proposals this node started as proposer.
    pub proposals_started: IntCounter,
    /// Proposals (either role) that ended with the block appended.
    pub proposals_committed: IntCounter,
    /// Proposals (either role) that ended Rejected.
    pub proposals_cancelled: IntCounter,
    /// Remote proposals this node agreed to follow.
    pub follower_proposals: IntCounter,
    /// Votes counted toward one of our proposals.
    pub votes_received: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Height of the local chain head.
    pub chain_height: IntGauge,
    /// Connected peers at the last mining tick.
    pub peer_count: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Time from proposal registration to conclusion, in milliseconds.
    pub proposal_duration_ms: Histogram,
}

impl ConsensusMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        // Counters
        let proposals_started = register_int_counter_with_registry!(
            Opts::new(
                "cinder_proposals_started_total",
                "Proposals started by this node"
            ),
            registry
        )
        .expect("failed to register proposals_started counter");

        let proposals_committed = register_int_counter_with_registry!(
            Opts::new(
                "cinder_proposals_committed_total",
                "Proposals that ended with the block appended"
            ),
            registry
        )
        .expect("failed to register proposals_committed counter");

        let proposals_cancelled = register_int_counter_with_registry!(
            Opts::new(
                "cinder_proposals_cancelled_total",
                "Proposals that ended rejected"
            ),
            registry
        )
        .expect("failed to register proposals_cancelled counter");

        let follower_proposals = register_int_counter_with_registry!(
            Opts::new(
                "cinder_follower_proposals_total",
                "Remote proposals followed by this node"
            ),
            registry
        )
        .expect("failed to register follower_proposals counter");

        let votes_received = register_int_counter_with_registry!(
            Opts::new(
                "cinder_votes_received_total",
                "Votes counted toward proposals of this node"
            ),
            registry
        )
        .expect("failed to register votes_received counter");

        // Gauges
        let chain_height = register_int_gauge_with_registry!(
            Opts::new("cinder_chain_height", "Height of the local chain head"),
            registry
        )
        .expect("failed to register chain_height gauge");

        let peer_count = register_int_gauge_with_registry!(
            Opts::new("cinder_peer_count", "Current number of connected peers"),
            registry
        )
        .expect("failed to register peer_count gauge");

        // 1 ms → ~16 s.
        let proposal_duration_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "cinder_proposal_duration_ms",
                "Proposal lifetime in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(1.0, 2.0, 15).unwrap()),
            registry
        )
        .expect("failed to register proposal_duration_ms histogram");

        Self {
            registry,
            proposals_started,
            proposals_committed,
            proposals_cancelled,
            follower_proposals,
            votes_received,
            chain_height,
            peer_count,
            proposal_duration_ms,
        }
    }

    /// Count a concluded proposal and how long it lived.
    pub fn record_outcome(&self, outcome: &ProposalOutcome, lifetime: Duration) {
        match outcome {
            ProposalOutcome::Committed { height, .. } => {
                self.proposals_committed.inc();
                self.chain_height.set(*height);
            }
            ProposalOutcome::Cancelled { .. } => self.proposals_cancelled.inc(),
        }
        self.proposal_duration_ms
            .observe(lifetime.as_secs_f64() * 1_000.0);
    }

    /// Render every metric in the Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buf = Vec::new();
        if TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for ConsensusMetrics {
    fn default() -> Self {
        Self::new()
    }
}
