//! World objects - the unit of replication.
//!
//! An object's existence on the authoritative node is a cache of "is this
//! currently relevant to someone"; the canonical record lives with the
//! world database. Position changes must go through the
//! [`ObjectStore`](crate::world::store::ObjectStore) so the sector index
//! stays consistent.

use crate::world::attributes::{AttrKey, AttrValue, Attributes, PLAYER_NAME};
use crate::world::peer::NodeId;
use meridian_shared::math::{Quaternion, Vec3};
use std::fmt;

/// Unique object identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl ObjectId {
    /// Reserved null object.
    pub const NULL: Self = Self(0);

    /// True for the reserved null id.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A replicated world object.
#[derive(Clone, Debug)]
pub struct WorldObject {
    id: ObjectId,
    position: Vec3,
    rotation: Quaternion,
    persistent: bool,
    distant: bool,
    owner: NodeId,
    revision: u32,
    attributes: Attributes,
}

impl WorldObject {
    /// Creates a transient, unowned object at a position.
    #[must_use]
    pub fn new(id: ObjectId, position: Vec3) -> Self {
        Self {
            id,
            position,
            rotation: Quaternion::IDENTITY,
            persistent: false,
            distant: false,
            owner: NodeId::NONE,
            revision: 0,
            attributes: Attributes::new(),
        }
    }

    /// Object identifier.
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    /// Current position.
    #[must_use]
    pub const fn position(&self) -> Vec3 {
        self.position
    }

    /// Current rotation.
    #[must_use]
    pub const fn rotation(&self) -> Quaternion {
        self.rotation
    }

    /// Owning node. [`NodeId::NONE`] means unowned/server-default.
    #[must_use]
    pub const fn owner(&self) -> NodeId {
        self.owner
    }

    /// Mutation counter, bumped on every state change.
    #[must_use]
    pub const fn revision(&self) -> u32 {
        self.revision
    }

    /// True for objects that participate in ownership arbitration.
    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// True for objects visible from the distant ring.
    #[must_use]
    pub const fn is_distant(&self) -> bool {
        self.distant
    }

    /// Attribute bag.
    #[must_use]
    pub const fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// True when tagged as a live remote player avatar: a non-empty
    /// `player_name` attribute.
    #[must_use]
    pub fn is_player_avatar(&self) -> bool {
        self.attributes
            .text(PLAYER_NAME)
            .is_some_and(|name| !name.is_empty())
    }

    /// Marks the object persistent (or transient again).
    pub fn set_persistent(&mut self, persistent: bool) {
        self.persistent = persistent;
    }

    /// Marks the object distant-visible.
    pub fn set_distant(&mut self, distant: bool) {
        self.distant = distant;
    }

    /// Replaces the rotation and bumps the revision.
    pub fn set_rotation(&mut self, rotation: Quaternion) {
        self.rotation = rotation;
        self.bump();
    }

    /// Sets an attribute and bumps the revision.
    pub fn set_attribute(&mut self, key: AttrKey, value: AttrValue) {
        self.attributes.set(key, value);
        self.bump();
    }

    pub(crate) fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.bump();
    }

    pub(crate) fn set_owner(&mut self, owner: NodeId) {
        self.owner = owner;
        self.bump();
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avatar_tagging() {
        let mut object = WorldObject::new(ObjectId(1), Vec3::ZERO);
        assert!(!object.is_player_avatar());

        object.set_attribute(PLAYER_NAME, AttrValue::Text("Runa".to_string()));
        assert!(object.is_player_avatar());

        // Empty name does not count as a live avatar
        object.set_attribute(PLAYER_NAME, AttrValue::Text(String::new()));
        assert!(!object.is_player_avatar());
    }

    #[test]
    fn test_revision_bumps_on_state_change() {
        let mut object = WorldObject::new(ObjectId(2), Vec3::ZERO);
        let initial = object.revision();

        object.set_position(Vec3::new(1.0, 0.0, 0.0));
        object.set_owner(NodeId(9));
        object.set_rotation(Quaternion::IDENTITY);

        assert_eq!(object.revision(), initial + 3);
        // Flag flips are bookkeeping, not replicated state
        object.set_persistent(true);
        assert_eq!(object.revision(), initial + 3);
    }
}
