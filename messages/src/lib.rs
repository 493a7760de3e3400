//! Network message types for cinder node-to-node communication.
//!
//! Proposal traffic uses a fixed-width body shared by every phase message:
//!
//! ```text
//! timestamp: i64 | height: i64 | hash: [u8; 32] | proposer: [u8; 16]
//! ```
//!
//! A framed proposal message is one [`MessageKind`] tag byte followed by the
//! 64-byte body. Only the tag distinguishes intent. Everything the transport
//! carries is wrapped in [`WireMessage`] and serialized with bincode.

use cinder_types::{Block, BlockHash, NodeId, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Encoded length of a [`ProposalBody`].
pub const PROPOSAL_BODY_LEN: usize = 8 + 8 + 32 + 16;
/// Encoded length of a framed [`ProposalMessage`].
pub const PROPOSAL_MESSAGE_LEN: usize = 1 + PROPOSAL_BODY_LEN;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("unknown message kind tag {0}")]
    UnknownKind(u8),

    #[error("envelope error: {0}")]
    Envelope(String),
}

/// Phase tag carried by every proposal message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Proposer opens the Voting phase.
    Prepare,
    /// Follower's positive vote at the Voting phase.
    Promise,
    /// Proposer opens the Commit phase.
    Commit,
    /// Positive vote (Voting or Commit phase).
    Accepted,
    /// Negative vote at the current phase.
    Rejected,
}

impl MessageKind {
    pub fn tag(self) -> u8 {
        match self {
            MessageKind::Prepare => 1,
            MessageKind::Promise => 2,
            MessageKind::Commit => 3,
            MessageKind::Accepted => 4,
            MessageKind::Rejected => 5,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, CodecError> {
        match tag {
            1 => Ok(MessageKind::Prepare),
            2 => Ok(MessageKind::Promise),
            3 => Ok(MessageKind::Commit),
            4 => Ok(MessageKind::Accepted),
            5 => Ok(MessageKind::Rejected),
            other => Err(CodecError::UnknownKind(other)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Prepare => "prepare",
            MessageKind::Promise => "promise",
            MessageKind::Commit => "commit",
            MessageKind::Accepted => "accepted",
            MessageKind::Rejected => "rejected",
        }
    }
}

/// Identity of a proposal as it travels on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalBody {
    pub timestamp: Timestamp,
    pub height: i64,
    pub hash: BlockHash,
    pub proposer: NodeId,
}

impl ProposalBody {
    /// Fixed-width big-endian encoding.
    pub fn encode(&self) -> [u8; PROPOSAL_BODY_LEN] {
        let mut out = [0u8; PROPOSAL_BODY_LEN];
        out[0..8].copy_from_slice(&self.timestamp.as_millis().to_be_bytes());
        out[8..16].copy_from_slice(&self.height.to_be_bytes());
        out[16..48].copy_from_slice(self.hash.as_bytes());
        out[48..64].copy_from_slice(self.proposer.as_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != PROPOSAL_BODY_LEN {
            return Err(CodecError::Length {
                expected: PROPOSAL_BODY_LEN,
                actual: bytes.len(),
            });
        }
        let mut i64_buf = [0u8; 8];
        i64_buf.copy_from_slice(&bytes[0..8]);
        let timestamp = Timestamp::new(i64::from_be_bytes(i64_buf));
        i64_buf.copy_from_slice(&bytes[8..16]);
        let height = i64::from_be_bytes(i64_buf);
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[16..48]);
        let mut proposer = [0u8; 16];
        proposer.copy_from_slice(&bytes[48..64]);
        Ok(Self {
            timestamp,
            height,
            hash: BlockHash::new(hash),
            proposer: NodeId::new(proposer),
        })
    }
}

/// A phase message about one proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalMessage {
    pub kind: MessageKind,
    pub body: ProposalBody,
}

impl ProposalMessage {
    pub fn new(kind: MessageKind, body: ProposalBody) -> Self {
        Self { kind, body }
    }

    /// Tag byte followed by the fixed-width body.
    pub fn encode(&self) -> [u8; PROPOSAL_MESSAGE_LEN] {
        let mut out = [0u8; PROPOSAL_MESSAGE_LEN];
        out[0] = self.kind.tag();
        out[1..].copy_from_slice(&self.body.encode());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != PROPOSAL_MESSAGE_LEN {
            return Err(CodecError::Length {
                expected: PROPOSAL_MESSAGE_LEN,
                actual: bytes.len(),
            });
        }
        let kind = MessageKind::from_tag(bytes[0])?;
        let body = ProposalBody::decode(&bytes[1..])?;
        Ok(Self { kind, body })
    }
}

/// Top-level P2P wire message.
/// Every message sent between nodes is wrapped in this enum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    /// A phase message about a proposal.
    Proposal(ProposalMessage),
    /// A freshly assembled candidate block, pushed by its proposer.
    BlockDiscovered(Block),
    /// Ask a peer for a candidate block by hash.
    GetBlock(BlockHash),
    /// Response to `GetBlock`.
    Block(Block),
}

impl WireMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(self).map_err(|e| CodecError::Envelope(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Envelope(e.to_string()))
    }

    /// Short label for logs and tracing spans.
    pub fn label(&self) -> &'static str {
        match self {
            WireMessage::Proposal(msg) => msg.kind.as_str(),
            WireMessage::BlockDiscovered(_) => "block_discovered",
            WireMessage::GetBlock(_) => "get_block",
            WireMessage::Block(_) => "block",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_types::Transaction;

    fn sample_body() -> ProposalBody {
        ProposalBody {
            timestamp: Timestamp::new(1_700_000_000_123),
            height: 42,
            hash: BlockHash::new([0xAA; 32]),
            proposer: NodeId::new([0x11; 16]),
        }
    }

    #[test]
    fn body_layout_is_fixed_width_big_endian() {
        let bytes = sample_body().encode();
        assert_eq!(bytes.len(), 64);
        assert_eq!(&bytes[0..8], &1_700_000_000_123i64.to_be_bytes());
        assert_eq!(&bytes[8..16], &42i64.to_be_bytes());
        assert_eq!(&bytes[16..48], &[0xAA; 32]);
        assert_eq!(&bytes[48..64], &[0x11; 16]);
    }

    #[test]
    fn every_kind_shares_the_same_body() {
        let body = sample_body();
        for kind in [
            MessageKind::Prepare,
            MessageKind::Promise,
            MessageKind::Commit,
            MessageKind::Accepted,
            MessageKind::Rejected,
        ] {
            let encoded = ProposalMessage::new(kind, body).encode();
            assert_eq!(encoded[0], kind.tag());
            assert_eq!(&encoded[1..], &body.encode());
            let decoded = ProposalMessage::decode(&encoded).unwrap();
            assert_eq!(decoded.kind, kind);
            assert_eq!(decoded.body, body);
        }
    }

    #[test]
    fn negative_height_survives_encoding() {
        let mut body = sample_body();
        body.height = -1;
        assert_eq!(ProposalBody::decode(&body.encode()).unwrap().height, -1);
    }

    #[test]
    fn unknown_tag_rejected() {
        let mut encoded = ProposalMessage::new(MessageKind::Commit, sample_body()).encode();
        encoded[0] = 99;
        assert_eq!(
            ProposalMessage::decode(&encoded),
            Err(CodecError::UnknownKind(99))
        );
    }

    #[test]
    fn truncated_message_rejected() {
        let encoded = ProposalMessage::new(MessageKind::Prepare, sample_body()).encode();
        assert_eq!(
            ProposalMessage::decode(&encoded[..40]),
            Err(CodecError::Length {
                expected: PROPOSAL_MESSAGE_LEN,
                actual: 40
            })
        );
    }

    #[test]
    fn block_envelope_roundtrip() {
        let block = Block::new(
            3,
            BlockHash::new([1; 32]),
            Timestamp::new(9),
            NodeId::new([2; 16]),
            vec![Transaction::new(Timestamp::new(8), b"pay".to_vec())],
        );
        let bytes = WireMessage::BlockDiscovered(block.clone()).to_bytes().unwrap();
        match WireMessage::from_bytes(&bytes).unwrap() {
            WireMessage::BlockDiscovered(b) => assert_eq!(b, block),
            other => panic!("expected BlockDiscovered, got {:?}", other),
        }
    }

    #[test]
    fn corrupt_envelope_rejected_gracefully() {
        let garbage = vec![0xFF, 0x00, 0xDE, 0xAD, 0xBE, 0xEF];
        assert!(matches!(
            WireMessage::from_bytes(&garbage),
            Err(CodecError::Envelope(_))
        ));
    }

    #[test]
    fn labels_follow_kind() {
        let msg = WireMessage::Proposal(ProposalMessage::new(MessageKind::Rejected, sample_body()));
        assert_eq!(msg.label(), "rejected");
        assert_eq!(WireMessage::GetBlock(BlockHash::ZERO).label(), "get_block");
    }
}
