//! Consensus: single-proposal block voting.
//!
//! One candidate block is under agreement at a time. The proposer walks it
//! through two voting rounds and every connected peer follows along:
//!
//! - **Voting**: the proposer broadcasts Prepare; followers fetch and
//!   validate the candidate, then answer Promise or Rejected.
//! - **Commit**: the proposer broadcasts Commit; followers append the block
//!   and answer Accepted.
//! - **Quorum**: terminal. The result is Accepted once the block is on the
//!   local chain, Rejected if anything failed along the way.
//!
//! A phase passes when at least [`quorum::required_votes`] peers answered
//! and acceptances outnumber rejections.
//!
//! ## Module overview
//!
//! - [`proposal`]: Per-proposal state machine with blocking waits.
//! - [`manager`]: Admission guard holding the single active proposal.
//! - [`handler`]: Proposer and follower sequences plus inbound entry points.
//! - [`phase`]: Phase, result and role enums.
//! - [`quorum`]: Required-vote arithmetic.
//! - [`transport`]: Outbound peer transport and inbound handler traits.
//! - [`validator`]: Block validation and snapshot hooks.
//! - [`config`]: Wait budgets.
//! - [`error`]: Consensus error types.

pub mod config;
pub mod error;
pub mod handler;
pub mod manager;
pub mod phase;
pub mod proposal;
pub mod quorum;
pub mod transport;
pub mod validator;

pub use config::ConsensusConfig;
pub use error::ConsensusError;
pub use handler::{Collaborators, ProposalHandler, ProposalOutcome};
pub use manager::ProposalManager;
pub use phase::{Phase, ProposalResult, Role};
pub use proposal::Proposal;
pub use quorum::required_votes;
pub use transport::{InboundHandler, PeerTransport, TransportError};
pub use validator::{BlockValidator, SnapshotScheduler};
