//! # World State
//!
//! The authoritative in-memory state: replicated objects, their
//! attribute bags, the peer table and the resident-count pruner.
//!
//! Everything here is plain data with synchronous accessors. The
//! decision logic that reads and mutates it lives one level up in the
//! area, ownership, lifecycle and scheduler modules.

pub mod attributes;
pub mod object;
pub mod peer;
pub mod pruner;
pub mod store;

pub use attributes::{AttrKey, AttrValue, Attributes, PLAYER_NAME};
pub use object::{ObjectId, WorldObject};
pub use peer::{NodeId, Peer, PeerSnapshot, PeerTable, PeerView, SessionState};
pub use pruner::ObjectPruner;
pub use store::ObjectStore;
