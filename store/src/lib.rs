//! Storage collaborator traits for the cinder consensus core.
//!
//! The consensus core never owns block or transaction storage. It talks to
//! two collaborators through these traits:
//! - [`PendingStore`]: candidate blocks and transactions awaiting commitment.
//! - [`ChainStore`]: the append-only chain of committed blocks.
//!
//! Every backend (in-memory for tests and simulation, durable engines
//! elsewhere) implements these traits and owns its own locking.

pub mod chain;
pub mod error;
pub mod pending;

pub use chain::ChainStore;
pub use error::StoreError;
pub use pending::PendingStore;
