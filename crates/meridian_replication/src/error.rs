//! # Replication Error Types
//!
//! All errors that can occur in the replication layer.
//!
//! Most authority-side failure is absorbed, not raised: a failed
//! precondition (no peers, wrong role, disconnected session) falls through
//! to pass-through behavior. The variants here cover the genuine failures
//! that remain - admission limits and bad configuration.

use crate::world::peer::NodeId;
use thiserror::Error;

/// Errors that can occur in the replication layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplicationError {
    /// Peer admission refused: the server is at its configured limit.
    #[error("server full: limit {limit}, {connected} peers connected")]
    ServerFull {
        /// Configured player limit.
        limit: u32,
        /// Peers connected when admission was attempted.
        connected: u32,
    },

    /// A peer tried to connect with an identifier that is already admitted.
    #[error("peer {0} is already admitted")]
    PeerAlreadyAdmitted(NodeId),

    /// An operation referenced a peer that is not in the peer table.
    #[error("unknown peer: {0}")]
    UnknownPeer(NodeId),

    /// The reserved null identifier was used where a real peer is required.
    #[error("the null node id is not a valid peer")]
    NullNodeId,

    /// Configuration file could not be read.
    #[error("config file unreadable: {0}")]
    ConfigRead(String),

    /// Configuration file could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;
