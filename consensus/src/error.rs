use crate::phase::Phase;
use crate::transport::TransportError;
use cinder_store::StoreError;
use cinder_types::BlockHash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("invalid phase transition {from} -> {to}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("a proposal is already active (height {height}, hash {hash})")]
    AlreadyActive { height: i64, hash: BlockHash },

    #[error("quorum failed: {accepted} accepted, {rejected} rejected, {required} required")]
    QuorumFailed {
        accepted: usize,
        rejected: usize,
        required: usize,
    },

    #[error("timed out waiting in {0} phase")]
    Timeout(Phase),

    #[error("candidate block {0} never arrived")]
    BlockUnavailable(BlockHash),

    #[error("invalid candidate block: {0}")]
    InvalidBlock(String),

    #[error("proposal already concluded")]
    Concluded,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
