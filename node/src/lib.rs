//! Cinder node: wires the proposal core to its collaborators.
//!
//! The node is the central coordinator that:
//! - Assembles candidate blocks once enough transactions are pending
//! - Drives its own proposals on the mining thread
//! - Follows remote proposals on short-lived follower threads
//! - Validates candidates structurally before voting for them
//! - Takes periodic chain snapshots when enabled
//! - Exposes Prometheus metrics and structured logs

pub mod assembler;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod miner;
pub mod node;
pub mod shutdown;
pub mod snapshot;
pub mod tracing_spans;
pub mod validator;

pub use assembler::BlockAssembler;
pub use config::NodeConfig;
pub use dispatcher::Dispatcher;
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::ConsensusMetrics;
pub use miner::{MiningLoop, TickOutcome};
pub use node::CinderNode;
pub use shutdown::ShutdownController;
pub use snapshot::{ChainSnapshot, SnapshotJob};
pub use validator::StructuralValidator;
