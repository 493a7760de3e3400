use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("consensus error: {0}")]
    Consensus(#[from] cinder_consensus::ConsensusError),

    #[error("store error: {0}")]
    Store(#[from] cinder_store::StoreError),

    #[error("transport error: {0}")]
    Transport(#[from] cinder_consensus::TransportError),

    #[error("codec error: {0}")]
    Codec(#[from] cinder_messages::CodecError),

    #[error("config error: {0}")]
    Config(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("node is already running")]
    AlreadyRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
