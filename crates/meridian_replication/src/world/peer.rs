//! Peers, the local session, and the start-of-tick peer snapshot.
//!
//! Every authority decision in a tick reads one immutable
//! [`PeerSnapshot`] taken when the tick starts. Nothing downstream sees
//! a half-updated peer table.

use crate::error::{ReplicationError, ReplicationResult};
use crate::spatial::Zone;
use meridian_shared::math::Vec3;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// Peer/node identifier. `0` is reserved: as an owner it means
/// "unowned/server-default", and it is never a valid peer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    /// The reserved neutral id.
    pub const NONE: Self = Self(0);

    /// True for the reserved neutral id.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The local node's world-session status. The lifecycle driver is a
/// no-op in any state but [`SessionState::Connected`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No session.
    #[default]
    Disconnected = 0,
    /// Session being established.
    Connecting = 1,
    /// World session live.
    Connected = 2,
}

/// A connected remote peer.
#[derive(Clone, Debug)]
pub struct Peer {
    /// Peer identifier.
    pub id: NodeId,
    /// Latest known location of interest (usually its avatar).
    pub reference_position: Vec3,
    /// False while the peer is still handshaking. Only ready peers
    /// contribute to area aggregation.
    pub ready: bool,
}

/// Immutable per-tick view of one peer.
#[derive(Clone, Copy, Debug)]
pub struct PeerView {
    /// Peer identifier.
    pub id: NodeId,
    /// Reference position at snapshot time.
    pub reference_position: Vec3,
    /// Zone containing the reference position.
    pub zone: Zone,
    /// Readiness at snapshot time.
    pub ready: bool,
}

impl PeerView {
    /// Builds a view, deriving the zone from the position.
    #[must_use]
    pub fn new(id: NodeId, reference_position: Vec3, ready: bool) -> Self {
        Self {
            id,
            reference_position,
            zone: Zone::containing(reference_position),
            ready,
        }
    }
}

/// Start-of-tick capture of the whole peer table, ordered by peer id.
#[derive(Clone, Debug, Default)]
pub struct PeerSnapshot {
    views: Vec<PeerView>,
}

impl PeerSnapshot {
    /// Builds a snapshot from explicit views (sorted by id).
    #[must_use]
    pub fn from_views(mut views: Vec<PeerView>) -> Self {
        views.sort_by_key(|view| view.id);
        Self { views }
    }

    /// All captured peers.
    #[must_use]
    pub fn peers(&self) -> &[PeerView] {
        &self.views
    }

    /// Ready peers only.
    pub fn ready(&self) -> impl Iterator<Item = &PeerView> + '_ {
        self.views.iter().filter(|view| view.ready)
    }

    /// Number of ready peers.
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.ready().count()
    }

    /// Looks up one peer's view.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&PeerView> {
        self.views
            .binary_search_by_key(&id, |view| view.id)
            .ok()
            .map(|index| &self.views[index])
    }

    /// True when the peer was present at snapshot time.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of captured peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// True when no peers were captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

/// Peer admission and tracking. Enforces the configured player limit.
#[derive(Debug)]
pub struct PeerTable {
    peers: HashMap<NodeId, Peer>,
    limit: u32,
}

impl PeerTable {
    /// Creates a table admitting up to `limit` peers.
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            peers: HashMap::new(),
            limit,
        }
    }

    /// Replaces the admission limit. Already-admitted peers are kept
    /// even when the new limit is lower; the limit gates future
    /// admissions only.
    pub fn set_limit(&mut self, limit: u32) {
        self.limit = limit;
    }

    /// Current admission limit.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Admits a new peer in the not-ready state.
    ///
    /// # Errors
    ///
    /// [`ReplicationError::NullNodeId`] for the reserved id,
    /// [`ReplicationError::PeerAlreadyAdmitted`] for a duplicate,
    /// [`ReplicationError::ServerFull`] past the configured limit.
    pub fn admit(&mut self, id: NodeId, reference_position: Vec3) -> ReplicationResult<()> {
        if id.is_none() {
            return Err(ReplicationError::NullNodeId);
        }
        if self.peers.contains_key(&id) {
            return Err(ReplicationError::PeerAlreadyAdmitted(id));
        }
        let connected = self.peers.len() as u32;
        if connected >= self.limit {
            return Err(ReplicationError::ServerFull {
                limit: self.limit,
                connected,
            });
        }
        self.peers.insert(
            id,
            Peer {
                id,
                reference_position,
                ready: false,
            },
        );
        debug!(peer = %id, "peer admitted");
        Ok(())
    }

    /// Removes a peer, returning its last known state.
    pub fn remove(&mut self, id: NodeId) -> Option<Peer> {
        let removed = self.peers.remove(&id);
        if removed.is_some() {
            info!(peer = %id, "peer removed");
        }
        removed
    }

    /// Updates a peer's reference position from the position feed.
    ///
    /// # Errors
    ///
    /// [`ReplicationError::UnknownPeer`] when the peer is not admitted.
    pub fn update_position(&mut self, id: NodeId, position: Vec3) -> ReplicationResult<()> {
        match self.peers.get_mut(&id) {
            Some(peer) => {
                peer.reference_position = position;
                Ok(())
            }
            None => Err(ReplicationError::UnknownPeer(id)),
        }
    }

    /// Marks a peer as fully handshaked.
    ///
    /// # Errors
    ///
    /// [`ReplicationError::UnknownPeer`] when the peer is not admitted.
    pub fn mark_ready(&mut self, id: NodeId) -> ReplicationResult<()> {
        match self.peers.get_mut(&id) {
            Some(peer) => {
                if !peer.ready {
                    peer.ready = true;
                    info!(peer = %id, "peer ready");
                }
                Ok(())
            }
            None => Err(ReplicationError::UnknownPeer(id)),
        }
    }

    /// Looks up a peer.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    /// True when the peer is admitted.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.peers.contains_key(&id)
    }

    /// Number of admitted peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// True when no peers are admitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Captures the start-of-tick snapshot.
    #[must_use]
    pub fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot::from_views(
            self.peers
                .values()
                .map(|peer| PeerView::new(peer.id, peer.reference_position, peer.ready))
                .collect(),
        )
    }
}
