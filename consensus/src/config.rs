//! Wait budgets for the blocking points of the protocol.

use std::time::Duration;

/// Consensus configuration.
///
/// Every blocking wait in the protocol is bounded by one of these budgets so
/// that a crashed or slow peer can never stall a proposer or follower thread.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// How long the proposer waits for the required votes in each phase.
    pub voting_timeout: Duration,
    /// How long a follower waits for a requested candidate block.
    pub block_wait_timeout: Duration,
    /// How long a follower waits for the proposer to open the Commit phase.
    pub phase_wait_timeout: Duration,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            voting_timeout: Duration::from_secs(5),
            block_wait_timeout: Duration::from_secs(3),
            phase_wait_timeout: Duration::from_secs(10),
        }
    }
}
