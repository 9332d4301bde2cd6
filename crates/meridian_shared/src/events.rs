//! Replication event types crossing the transport boundary.
//!
//! The SERVER emits these from its lifecycle and send passes.
//! The CLIENT consumes them to materialize, tear down and smooth objects.
//! How they are encoded on the wire is the transport's business.

use crate::math::{Quaternion, Vec3};
use serde::{Deserialize, Serialize};

/// Event kind discriminator
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Object entered a required region and must be materialized
    ObjectCreated = 0,
    /// Object left every required region and must be torn down
    ObjectDestroyed = 1,
    /// Object state refresh
    StateUpdate = 2,
}

impl EventKind {
    /// Estimated encoded size in bytes, used for send budget accounting.
    /// The true size depends on the transport's codec; this only has to be
    /// stable and roughly proportional.
    #[must_use]
    pub const fn wire_size_hint(self) -> usize {
        match self {
            // kind + id + position + distant flag + tick
            Self::ObjectCreated => 1 + 8 + 12 + 1 + 8,
            // kind + id + tick
            Self::ObjectDestroyed => 1 + 8 + 8,
            // kind + id + position + rotation + revision
            Self::StateUpdate => 1 + 8 + 12 + 16 + 4,
        }
    }
}

/// Payloads replicated from the authoritative server to its peers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ReplicationEvent {
    /// Object must exist on the receiving side
    ObjectCreated {
        /// Object ID
        object_id: u64,
        /// Spawn position
        position: Vec3,
        /// True when visible from the distant ring only
        distant: bool,
        /// Lifecycle tick that produced this event
        tick: u64,
    },

    /// Object must be removed on the receiving side
    ObjectDestroyed {
        /// Object ID
        object_id: u64,
        /// Lifecycle tick that produced this event
        tick: u64,
    },

    /// Fresh state for an already-materialized object
    StateUpdate {
        /// Object ID
        object_id: u64,
        /// Current position
        position: Vec3,
        /// Current rotation
        rotation: Quaternion,
        /// Mutation counter at send time
        revision: u32,
    },
}

impl ReplicationEvent {
    /// Returns the event kind
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::ObjectCreated { .. } => EventKind::ObjectCreated,
            Self::ObjectDestroyed { .. } => EventKind::ObjectDestroyed,
            Self::StateUpdate { .. } => EventKind::StateUpdate,
        }
    }

    /// Returns the subject object ID
    #[must_use]
    pub const fn object_id(&self) -> u64 {
        match self {
            Self::ObjectCreated { object_id, .. }
            | Self::ObjectDestroyed { object_id, .. }
            | Self::StateUpdate { object_id, .. } => *object_id,
        }
    }

    /// Estimated encoded size in bytes, delegated to the kind.
    #[must_use]
    pub const fn wire_size_hint(&self) -> usize {
        self.kind().wire_size_hint()
    }
}
