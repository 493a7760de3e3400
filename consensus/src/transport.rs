//! Peer transport collaborator.
//!
//! The consensus core does not own connections. It hands [`WireMessage`]s to
//! a [`PeerTransport`] and receives inbound traffic through an
//! [`InboundHandler`] that the transport calls from any of its threads.

use cinder_messages::WireMessage;
use cinder_types::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer {0} is not connected")]
    NotConnected(NodeId),

    #[error("transport closed")]
    Closed,

    #[error("send failed: {0}")]
    Send(String),
}

/// Outbound half of the peer session layer.
pub trait PeerTransport: Send + Sync {
    /// Send `message` to every connected peer; returns how many it was queued for.
    fn broadcast(&self, message: &WireMessage) -> Result<usize, TransportError>;

    /// Send `message` to one peer.
    fn send(&self, peer: &NodeId, message: &WireMessage) -> Result<(), TransportError>;

    /// Number of currently connected peers (excluding this node).
    fn connected_peer_count(&self) -> usize;
}

/// Receives inbound messages; may be called concurrently from any thread.
pub trait InboundHandler: Send + Sync {
    fn handle(&self, from: NodeId, message: WireMessage);
}
