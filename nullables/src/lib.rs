//! Nullable infrastructure for deterministic testing and simulation.
//!
//! Every collaborator the consensus core talks to (pending store, chain,
//! peer transport, block validator, snapshot hook) has an in-memory
//! implementation here that:
//! - Is thread-safe, so follower and miner threads can share it
//! - Can be steered programmatically (failure switches, peer counts, drop filters)
//! - Never touches the filesystem or a socket
//!
//! Usage: swap real implementations for nullables in tests, or wire several
//! nodes together over a [`LoopbackNetwork`] to simulate a cluster.

pub mod network;
pub mod store;
pub mod validator;

pub use network::{DropFilter, LoopbackEndpoint, LoopbackNetwork, NullTransport};
pub use store::{NullChainStore, NullPendingStore};
pub use validator::{NullSnapshots, NullValidator};
