//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use cinder_consensus::ConsensusConfig;
use cinder_types::NodeId;

use crate::logging::LogFormat;
use crate::NodeError;

/// Configuration for a cinder node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Fixed node identity. A random v4 UUID is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<Uuid>,

    /// Directory for snapshots.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Pending transactions needed before a block is assembled; also the
    /// most a block may carry.
    #[serde(default = "default_max_transactions_per_block")]
    pub max_transactions_per_block: usize,

    /// Base delay between mining loop ticks.
    #[serde(default = "default_mining_interval_ms")]
    pub mining_interval_ms: u64,

    /// Upper bound of the random delay added to each tick.
    #[serde(default = "default_mining_jitter_ms")]
    pub mining_jitter_ms: u64,

    /// Proposer wait for the required votes in each phase.
    #[serde(default = "default_voting_timeout_ms")]
    pub voting_timeout_ms: u64,

    /// Follower wait for a requested candidate block.
    #[serde(default = "default_block_wait_timeout_ms")]
    pub block_wait_timeout_ms: u64,

    /// Follower wait for the Commit phase.
    #[serde(default = "default_phase_wait_timeout_ms")]
    pub phase_wait_timeout_ms: u64,

    /// Whether to write chain snapshots under `data_dir/<node id>`.
    #[serde(default)]
    pub enable_snapshots: bool,

    /// Snapshot every this many heights.
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval: u64,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./cinder_data")
}

fn default_max_transactions_per_block() -> usize {
    64
}

fn default_mining_interval_ms() -> u64 {
    500
}

fn default_mining_jitter_ms() -> u64 {
    250
}

fn default_voting_timeout_ms() -> u64 {
    5_000
}

fn default_block_wait_timeout_ms() -> u64 {
    3_000
}

fn default_phase_wait_timeout_ms() -> u64 {
    10_000
}

fn default_snapshot_interval() -> u64 {
    100
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("NodeConfig is always serializable to TOML")
    }

    /// Reject values the node cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.max_transactions_per_block == 0 {
            return Err(NodeError::Config(
                "max_transactions_per_block must be at least 1".to_string(),
            ));
        }
        if self.snapshot_interval == 0 {
            return Err(NodeError::Config(
                "snapshot_interval must be at least 1".to_string(),
            ));
        }
        self.parsed_log_format()?;
        Ok(())
    }

    /// The configured identity, or a fresh random one.
    pub fn node_id(&self) -> NodeId {
        self.node_id.map(NodeId::from).unwrap_or_else(NodeId::random)
    }

    pub fn parsed_log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse()
    }

    /// The wait budgets handed to the consensus core.
    pub fn consensus(&self) -> ConsensusConfig {
        ConsensusConfig {
            voting_timeout: Duration::from_millis(self.voting_timeout_ms),
            block_wait_timeout: Duration::from_millis(self.block_wait_timeout_ms),
            phase_wait_timeout: Duration::from_millis(self.phase_wait_timeout_ms),
        }
    }

    pub fn mining_interval(&self) -> Duration {
        Duration::from_millis(self.mining_interval_ms)
    }

    pub fn mining_jitter(&self) -> Duration {
        Duration::from_millis(self.mining_jitter_ms)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            data_dir: default_data_dir(),
            max_transactions_per_block: default_max_transactions_per_block(),
            mining_interval_ms: default_mining_interval_ms(),
            mining_jitter_ms: default_mining_jitter_ms(),
            voting_timeout_ms: default_voting_timeout_ms(),
            block_wait_timeout_ms: default_block_wait_timeout_ms(),
            phase_wait_timeout_ms: default_phase_wait_timeout_ms(),
            enable_snapshots: false,
            snapshot_interval: default_snapshot_interval(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}
