//! # Active Area Aggregation
//!
//! Folds every ready peer's required region into one global requirement:
//! a de-duplicated near set and distant set of object ids, and the
//! "is everything we require already loaded?" check.
//!
//! ## Design
//!
//! Aggregation is a pure fold over the start-of-tick peer snapshot.
//! Set semantics do the de-duplication: an object visible to five peers
//! appears once. The fully-loaded check is an AND over peers with
//! short-circuit - the node is ready only when every peer's entire
//! square is present, and vacuously ready with no peers at all.

use crate::pipeline::AreaStage;
use crate::spatial::Zone;
use crate::world::object::ObjectId;
use crate::world::peer::{NodeId, PeerSnapshot, PeerView};
use crate::world::store::ObjectStore;
use std::collections::BTreeSet;

/// Active-area radii in zone units, extended radius already applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AreaSpec {
    /// Inner square radius: zones that must be fully simulated.
    pub near_radius: i32,
    /// Outer radius: rings `near+1..=distant` carry distant-visible
    /// objects only. Always at least `near_radius`.
    pub distant_radius: i32,
}

impl AreaSpec {
    /// Builds a spec, clamping negatives away and keeping the distant
    /// radius at or beyond the near radius.
    #[must_use]
    pub fn new(near_radius: i32, distant_radius: i32) -> Self {
        let near_radius = near_radius.max(0);
        Self {
            near_radius,
            distant_radius: distant_radius.max(near_radius),
        }
    }
}

/// Union near/distant object sets required loaded this tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AreaSets {
    /// Objects inside some peer's inner square.
    pub near: BTreeSet<ObjectId>,
    /// Distant-visible objects inside some peer's outer rings, minus
    /// anything already required near.
    pub distant: BTreeSet<ObjectId>,
}

impl AreaSets {
    /// Creates empty sets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the id is required near or distant.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.near.contains(&id) || self.distant.contains(&id)
    }

    /// Iterates every required id, near first.
    pub fn required(&self) -> impl Iterator<Item = &ObjectId> {
        self.near.iter().chain(self.distant.iter())
    }

    /// Total number of required ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.near.len() + self.distant.len()
    }

    /// True when nothing is required.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.near.is_empty() && self.distant.is_empty()
    }
}

/// Computes the union requirement over the given peers. Callers pass
/// ready peers only; a peer mid-handshake must not grow the area.
pub fn compute_union<'a>(
    peers: impl Iterator<Item = &'a PeerView>,
    store: &ObjectStore,
    spec: AreaSpec,
) -> AreaSets {
    let mut sets = AreaSets::new();
    let mut near_scratch = Vec::new();
    let mut distant_scratch = Vec::new();

    for peer in peers {
        near_scratch.clear();
        distant_scratch.clear();
        store.find_sector_objects(
            peer.zone,
            spec.near_radius,
            spec.distant_radius,
            &mut near_scratch,
            &mut distant_scratch,
        );
        for id in &near_scratch {
            sets.near.insert(*id);
        }
        for id in &distant_scratch {
            sets.distant.insert(*id);
        }
    }

    // An id required near any peer is reported near only
    let near = &sets.near;
    sets.distant.retain(|id| !near.contains(id));
    sets
}

/// True when every zone within `near_radius` of every given peer
/// satisfies the `loaded` predicate. Short-circuits on the first hole.
/// No peers means nothing is required, which reads as loaded.
pub fn is_fully_loaded<'a>(
    peers: impl Iterator<Item = &'a PeerView>,
    near_radius: i32,
    loaded: impl Fn(Zone) -> bool,
) -> bool {
    for peer in peers {
        for y in (peer.zone.y - near_radius)..=(peer.zone.y + near_radius) {
            for x in (peer.zone.x - near_radius)..=(peer.zone.x + near_radius) {
                if !loaded(Zone::new(x, y)) {
                    return false;
                }
            }
        }
    }
    true
}

/// Authoritative aggregation: every ready peer's area counts.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllPeersArea;

impl AreaStage for AllPeersArea {
    fn required_sets(
        &self,
        snapshot: &PeerSnapshot,
        store: &ObjectStore,
        spec: AreaSpec,
    ) -> AreaSets {
        compute_union(snapshot.ready(), store, spec)
    }

    fn fully_loaded(
        &self,
        snapshot: &PeerSnapshot,
        near_radius: i32,
        loaded: &dyn Fn(Zone) -> bool,
    ) -> bool {
        is_fully_loaded(snapshot.ready(), near_radius, loaded)
    }
}

/// Pass-through aggregation: only the local node's own entry counts,
/// the way a plain client maintains the world around itself.
#[derive(Clone, Copy, Debug)]
pub struct LocalArea {
    /// The local node whose entry is honored.
    pub local: NodeId,
}

impl LocalArea {
    fn own_entry<'a>(&self, snapshot: &'a PeerSnapshot) -> impl Iterator<Item = &'a PeerView> {
        let local = self.local;
        snapshot
            .ready()
            .filter(move |view| view.id == local)
    }
}

impl AreaStage for LocalArea {
    fn required_sets(
        &self,
        snapshot: &PeerSnapshot,
        store: &ObjectStore,
        spec: AreaSpec,
    ) -> AreaSets {
        compute_union(self.own_entry(snapshot), store, spec)
    }

    fn fully_loaded(
        &self,
        snapshot: &PeerSnapshot,
        near_radius: i32,
        loaded: &dyn Fn(Zone) -> bool,
    ) -> bool {
        is_fully_loaded(self.own_entry(snapshot), near_radius, loaded)
    }
}
