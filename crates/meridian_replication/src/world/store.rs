//! The authoritative object table, kept consistent with its sector index.
//!
//! All spatial mutation goes through the store so a bucket never
//! disagrees with an object's actual position.

use crate::spatial::{SectorIndex, Zone};
use crate::world::object::{ObjectId, WorldObject};
use crate::world::peer::NodeId;
use meridian_shared::math::{Quaternion, Vec3};
use std::collections::HashMap;

/// Object table plus sector index.
#[derive(Debug, Default)]
pub struct ObjectStore {
    objects: HashMap<ObjectId, WorldObject>,
    index: SectorIndex,
}

impl ObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            index: SectorIndex::new(),
        }
    }

    /// Inserts an object, replacing any previous record under its id.
    pub fn insert(&mut self, object: WorldObject) {
        let id = object.id();
        let zone = Zone::containing(object.position());
        if let Some(previous) = self.objects.insert(id, object) {
            self.index.remove(Zone::containing(previous.position()), id);
        }
        self.index.insert(zone, id);
    }

    /// Removes an object.
    pub fn remove(&mut self, id: ObjectId) -> Option<WorldObject> {
        let removed = self.objects.remove(&id);
        if let Some(object) = &removed {
            self.index.remove(Zone::containing(object.position()), id);
        }
        removed
    }

    /// Looks up an object.
    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&WorldObject> {
        self.objects.get(&id)
    }

    /// True when the object exists.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Number of resident objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when no objects are resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterates all resident objects.
    pub fn objects(&self) -> impl Iterator<Item = &WorldObject> {
        self.objects.values()
    }

    /// Zone currently containing an object.
    #[must_use]
    pub fn zone_of(&self, id: ObjectId) -> Option<Zone> {
        self.objects
            .get(&id)
            .map(|object| Zone::containing(object.position()))
    }

    /// Iterates the objects registered in one zone.
    pub fn objects_in_zone(&self, zone: Zone) -> impl Iterator<Item = &WorldObject> {
        self.index
            .objects_in(zone)
            .iter()
            .filter_map(|id| self.objects.get(id))
    }

    /// Moves an object, relocating its index bucket when the zone
    /// changes. Returns false for an unknown id.
    pub fn set_position(&mut self, id: ObjectId, position: Vec3) -> bool {
        let Some(object) = self.objects.get_mut(&id) else {
            return false;
        };
        let from = Zone::containing(object.position());
        let to = Zone::containing(position);
        object.set_position(position);
        self.index.relocate(from, to, id);
        true
    }

    /// Replaces an object's owner. Returns false for an unknown id.
    pub fn set_owner(&mut self, id: ObjectId, owner: NodeId) -> bool {
        match self.objects.get_mut(&id) {
            Some(object) => {
                object.set_owner(owner);
                true
            }
            None => false,
        }
    }

    /// Replaces an object's rotation. Returns false for an unknown id.
    pub fn set_rotation(&mut self, id: ObjectId, rotation: Quaternion) -> bool {
        match self.objects.get_mut(&id) {
            Some(object) => {
                object.set_rotation(rotation);
                true
            }
            None => false,
        }
    }

    /// Sector query around `center`: every object within the inner
    /// square of radius `near` is appended to `near_out`; objects in the
    /// rings `near+1..=distant` are appended to `distant_out` when they
    /// are flagged distant-visible. Appends without clearing, so callers
    /// own buffer reuse.
    pub fn find_sector_objects(
        &self,
        center: Zone,
        near: i32,
        distant: i32,
        near_out: &mut Vec<ObjectId>,
        distant_out: &mut Vec<ObjectId>,
    ) {
        self.index.collect_square(center, near, near_out);

        let mut ring = Vec::new();
        for radius in (near + 1)..=distant {
            ring.clear();
            self.index.collect_ring(center, radius, &mut ring);
            for id in &ring {
                if let Some(object) = self.objects.get(id) {
                    if object.is_distant() {
                        distant_out.push(*id);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_shared::constants::ZONE_SIZE;

    fn object_at(id: u64, zone_x: i32, zone_y: i32) -> WorldObject {
        WorldObject::new(
            ObjectId(id),
            Vec3::new(
                (zone_x as f32 + 0.5) * ZONE_SIZE,
                0.0,
                (zone_y as f32 + 0.5) * ZONE_SIZE,
            ),
        )
    }

    #[test]
    fn test_sector_query_splits_near_and_distant() {
        let mut store = ObjectStore::new();
        store.insert(object_at(1, 0, 0));
        store.insert(object_at(2, 1, 1));
        let mut lighthouse = object_at(3, 3, 0);
        lighthouse.set_distant(true);
        store.insert(lighthouse);
        // In the distant ring but not distant-visible: filtered out
        store.insert(object_at(4, 0, 3));

        let mut near = Vec::new();
        let mut distant = Vec::new();
        store.find_sector_objects(Zone::new(0, 0), 2, 3, &mut near, &mut distant);

        near.sort_unstable();
        assert_eq!(near, vec![ObjectId(1), ObjectId(2)]);
        assert_eq!(distant, vec![ObjectId(3)]);
    }

    #[test]
    fn test_query_is_pure() {
        let mut store = ObjectStore::new();
        store.insert(object_at(1, 0, 0));

        let mut first = Vec::new();
        let mut distant = Vec::new();
        store.find_sector_objects(Zone::new(0, 0), 1, 1, &mut first, &mut distant);
        let mut second = Vec::new();
        store.find_sector_objects(Zone::new(0, 0), 1, 1, &mut second, &mut distant);

        assert_eq!(first, second);
        assert!(distant.is_empty());
    }

    #[test]
    fn test_move_relocates_bucket() {
        let mut store = ObjectStore::new();
        store.insert(object_at(1, 0, 0));
        assert_eq!(store.zone_of(ObjectId(1)), Some(Zone::new(0, 0)));

        let moved = store.set_position(ObjectId(1), Vec3::new(5.0 * ZONE_SIZE, 0.0, 0.0));
        assert!(moved);
        assert_eq!(store.zone_of(ObjectId(1)), Some(Zone::new(5, 0)));
        assert_eq!(store.objects_in_zone(Zone::new(0, 0)).count(), 0);
        assert_eq!(store.objects_in_zone(Zone::new(5, 0)).count(), 1);
    }

    #[test]
    fn test_remove_cleans_index() {
        let mut store = ObjectStore::new();
        store.insert(object_at(1, 2, 2));
        assert!(store.remove(ObjectId(1)).is_some());
        assert!(store.remove(ObjectId(1)).is_none());

        let mut near = Vec::new();
        let mut distant = Vec::new();
        store.find_sector_objects(Zone::new(2, 2), 1, 1, &mut near, &mut distant);
        assert!(near.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_insert_replaces_and_reindexes() {
        let mut store = ObjectStore::new();
        store.insert(object_at(1, 0, 0));
        store.insert(object_at(1, 4, 4));

        assert_eq!(store.len(), 1);
        assert_eq!(store.zone_of(ObjectId(1)), Some(Zone::new(4, 4)));
        assert_eq!(store.objects_in_zone(Zone::new(0, 0)).count(), 0);
    }
}
