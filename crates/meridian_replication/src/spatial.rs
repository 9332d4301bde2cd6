//! # Spatial Index
//!
//! Partitions the world into fixed-size square zones and answers
//! "which objects lie within radius R of zone Z" queries.
//!
//! ## Design
//!
//! Objects are bucketed by zone coordinate. Radius queries walk the
//! square of zones around a center (Chebyshev metric, so a radius-2
//! query touches a 5x5 block) and drain the touched buckets into a
//! caller-provided buffer. Queries are pure: repeated calls with an
//! unchanged store return the same ids in the same order.

use crate::world::object::ObjectId;
use meridian_shared::constants::ZONE_SIZE;
use meridian_shared::math::Vec3;
use std::collections::HashMap;

/// Integer 2D zone coordinate identifying one fixed-size spatial cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Zone {
    /// Zone column (world X axis).
    pub x: i32,
    /// Zone row (world Z axis).
    pub y: i32,
}

impl Zone {
    /// Creates a zone coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Zone containing a world position. Floor-division keeps the
    /// mapping deterministic on both sides of the origin.
    #[must_use]
    pub fn containing(position: Vec3) -> Self {
        Self {
            x: (position.x / ZONE_SIZE).floor() as i32,
            y: (position.z / ZONE_SIZE).floor() as i32,
        }
    }

    /// Chebyshev distance to another zone. Radius checks over this
    /// metric describe square areas, matching the zone grid.
    #[must_use]
    pub const fn chebyshev_distance(self, other: Self) -> i32 {
        let dx = if self.x > other.x {
            self.x - other.x
        } else {
            other.x - self.x
        };
        let dy = if self.y > other.y {
            self.y - other.y
        } else {
            other.y - self.y
        };
        if dx > dy {
            dx
        } else {
            dy
        }
    }

    /// True when this zone lies within `radius` (inclusive) of `center`.
    #[must_use]
    pub const fn within(self, center: Self, radius: i32) -> bool {
        self.chebyshev_distance(center) <= radius
    }

    /// World-space center of this zone.
    #[must_use]
    pub fn center(self) -> Vec3 {
        Vec3::new(
            (self.x as f32 + 0.5) * ZONE_SIZE,
            0.0,
            (self.y as f32 + 0.5) * ZONE_SIZE,
        )
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Zone-bucketed object index. The object store keeps it in sync on
/// every insert, removal and position change.
#[derive(Debug, Default)]
pub struct SectorIndex {
    buckets: HashMap<Zone, Vec<ObjectId>>,
}

impl SectorIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }

    /// Registers an object in a zone bucket.
    pub fn insert(&mut self, zone: Zone, id: ObjectId) {
        self.buckets.entry(zone).or_default().push(id);
    }

    /// Removes an object from a zone bucket. Unknown ids are ignored.
    pub fn remove(&mut self, zone: Zone, id: ObjectId) {
        if let Some(bucket) = self.buckets.get_mut(&zone) {
            bucket.retain(|entry| *entry != id);
            if bucket.is_empty() {
                self.buckets.remove(&zone);
            }
        }
    }

    /// Moves an object between zone buckets.
    pub fn relocate(&mut self, from: Zone, to: Zone, id: ObjectId) {
        if from == to {
            return;
        }
        self.remove(from, id);
        self.insert(to, id);
    }

    /// Objects registered in one zone.
    #[must_use]
    pub fn objects_in(&self, zone: Zone) -> &[ObjectId] {
        self.buckets.get(&zone).map_or(&[], Vec::as_slice)
    }

    /// Number of non-empty zone buckets.
    #[must_use]
    pub fn occupied_zones(&self) -> usize {
        self.buckets.len()
    }

    /// Appends every object within `radius` (inclusive square) of
    /// `center` to `out`.
    pub fn collect_square(&self, center: Zone, radius: i32, out: &mut Vec<ObjectId>) {
        if radius < 0 {
            return;
        }
        for y in (center.y - radius)..=(center.y + radius) {
            for x in (center.x - radius)..=(center.x + radius) {
                out.extend_from_slice(self.objects_in(Zone::new(x, y)));
            }
        }
    }

    /// Appends every object at exactly Chebyshev distance `radius` from
    /// `center` to `out`. Walks only the ring perimeter.
    pub fn collect_ring(&self, center: Zone, radius: i32, out: &mut Vec<ObjectId>) {
        if radius < 0 {
            return;
        }
        if radius == 0 {
            out.extend_from_slice(self.objects_in(center));
            return;
        }
        for x in (center.x - radius)..=(center.x + radius) {
            out.extend_from_slice(self.objects_in(Zone::new(x, center.y - radius)));
            out.extend_from_slice(self.objects_in(Zone::new(x, center.y + radius)));
        }
        for y in (center.y - radius + 1)..(center.y + radius) {
            out.extend_from_slice(self.objects_in(Zone::new(center.x - radius, y)));
            out.extend_from_slice(self.objects_in(Zone::new(center.x + radius, y)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_containing_floor_division() {
        assert_eq!(Zone::containing(Vec3::new(0.0, 0.0, 0.0)), Zone::new(0, 0));
        assert_eq!(
            Zone::containing(Vec3::new(63.9, 10.0, 63.9)),
            Zone::new(0, 0)
        );
        assert_eq!(
            Zone::containing(Vec3::new(64.0, 0.0, 128.0)),
            Zone::new(1, 2)
        );
        // Negative side of the origin belongs to zone -1, not 0
        assert_eq!(
            Zone::containing(Vec3::new(-0.5, 0.0, -64.1)),
            Zone::new(-1, -2)
        );
    }

    #[test]
    fn test_chebyshev_distance() {
        let origin = Zone::new(0, 0);
        assert_eq!(origin.chebyshev_distance(Zone::new(3, -2)), 3);
        assert_eq!(origin.chebyshev_distance(Zone::new(-1, 4)), 4);
        assert_eq!(origin.chebyshev_distance(origin), 0);
        assert!(Zone::new(2, 2).within(origin, 2));
        assert!(!Zone::new(3, 0).within(origin, 2));
    }

    #[test]
    fn test_square_and_ring_partition() {
        let mut index = SectorIndex::new();
        // One object per zone in a 7x7 block around the origin
        let mut next = 1u64;
        for y in -3..=3 {
            for x in -3..=3 {
                index.insert(Zone::new(x, y), ObjectId(next));
                next += 1;
            }
        }

        let center = Zone::new(0, 0);
        let mut square = Vec::new();
        index.collect_square(center, 2, &mut square);
        assert_eq!(square.len(), 25);

        let mut ring = Vec::new();
        index.collect_ring(center, 3, &mut ring);
        assert_eq!(ring.len(), 24);

        // Square(2) plus ring(3) covers the whole 7x7 block exactly once
        let mut all = square;
        all.extend_from_slice(&ring);
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 49);
    }

    #[test]
    fn test_ring_zero_is_center_only() {
        let mut index = SectorIndex::new();
        index.insert(Zone::new(0, 0), ObjectId(1));
        index.insert(Zone::new(1, 0), ObjectId(2));

        let mut out = Vec::new();
        index.collect_ring(Zone::new(0, 0), 0, &mut out);
        assert_eq!(out, vec![ObjectId(1)]);
    }

    #[test]
    fn test_relocate_moves_bucket() {
        let mut index = SectorIndex::new();
        let id = ObjectId(42);
        index.insert(Zone::new(0, 0), id);
        index.relocate(Zone::new(0, 0), Zone::new(5, 5), id);

        assert!(index.objects_in(Zone::new(0, 0)).is_empty());
        assert_eq!(index.objects_in(Zone::new(5, 5)), &[id]);
        assert_eq!(index.occupied_zones(), 1);
    }

    #[test]
    fn test_empty_index_queries() {
        let index = SectorIndex::new();
        let mut out = Vec::new();
        index.collect_square(Zone::new(0, 0), 3, &mut out);
        index.collect_ring(Zone::new(0, 0), 2, &mut out);
        assert!(out.is_empty());
    }
}
