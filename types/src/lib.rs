//! Fundamental types for the cinder block-proposal protocol.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! hashes, node identifiers, timestamps, transactions and blocks.

pub mod block;
pub mod hash;
pub mod node_id;
pub mod time;
pub mod transaction;

pub use block::{Block, BlockHash};
pub use hash::TxHash;
pub use node_id::NodeId;
pub use time::Timestamp;
pub use transaction::Transaction;
