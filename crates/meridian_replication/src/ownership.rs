//! # Ownership Arbitration
//!
//! Decides who simulates each persistent object. The local node is the
//! only one that ever claims here; peers are never handed ownership by
//! this pass, they only lose it when they stop covering.
//!
//! ## Design
//!
//! One pass per subject, where a subject is a connected peer or the
//! final pass on behalf of a peer that just left. Each pass scans the
//! near square around the subject's reference position and applies two
//! rules per persistent object:
//!
//! * Inside some ready peer's inner square and not covered by its
//!   current owner: claim for the local node. An owner that still
//!   covers its object is never preempted.
//! * Outside every ready peer's inner square and owned by the local
//!   node, the subject, or a departed node: release to no owner.
//!
//! A row naming an owner that is no longer connected is inconsistent
//! state, not an error. The claim rule heals it on the next pass that
//! scans the object.

use crate::area::AreaSpec;
use crate::pipeline::OwnershipStage;
use crate::spatial::Zone;
use crate::world::object::{ObjectId, WorldObject};
use crate::world::peer::{NodeId, PeerSnapshot};
use crate::world::store::ObjectStore;
use meridian_shared::math::Vec3;
use tracing::debug;

/// One reference point an arbitration pass scans around.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Subject {
    /// Peer the pass runs on behalf of. May already be disconnected
    /// when this is a departure pass.
    pub node: NodeId,
    /// Reference position to scan around.
    pub center: Vec3,
}

impl Subject {
    /// Creates a subject.
    #[must_use]
    pub const fn new(node: NodeId, center: Vec3) -> Self {
        Self { node, center }
    }
}

/// Counters from one or more arbitration passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArbitrationReport {
    /// Objects claimed for the local node.
    pub claims: u32,
    /// Objects released to no owner.
    pub releases: u32,
    /// Claims that replaced an owner no longer connected.
    pub healed: u32,
}

impl ArbitrationReport {
    /// Folds another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.claims += other.claims;
        self.releases += other.releases;
        self.healed += other.healed;
    }
}

/// Runs one release/claim scan around a subject's reference position.
///
/// `scratch` is a reusable id buffer; it is cleared on entry.
pub fn release_nearby(
    store: &mut ObjectStore,
    snapshot: &PeerSnapshot,
    subject: Subject,
    local: NodeId,
    spec: AreaSpec,
    scratch: &mut Vec<ObjectId>,
) -> ArbitrationReport {
    let mut report = ArbitrationReport::default();
    let center = Zone::containing(subject.center);

    scratch.clear();
    for y in (center.y - spec.near_radius)..=(center.y + spec.near_radius) {
        for x in (center.x - spec.near_radius)..=(center.x + spec.near_radius) {
            scratch.extend(store.objects_in_zone(Zone::new(x, y)).map(WorldObject::id));
        }
    }

    for id in scratch.drain(..) {
        let Some(object) = store.get(id) else {
            continue;
        };
        if !object.is_persistent() {
            continue;
        }
        let owner = object.owner();
        let zone = Zone::containing(object.position());
        let in_any = snapshot
            .ready()
            .any(|view| zone.within(view.zone, spec.near_radius));

        if in_any {
            let covered = owner == local
                || snapshot
                    .get(owner)
                    .is_some_and(|view| view.ready && zone.within(view.zone, spec.near_radius));
            if !covered {
                if !owner.is_none() && !snapshot.contains(owner) {
                    debug!(object = %id, stale_owner = %owner, "replacing owner no longer connected");
                    report.healed += 1;
                }
                store.set_owner(id, local);
                report.claims += 1;
            }
        } else {
            let owner_departed = !owner.is_none() && owner != local && !snapshot.contains(owner);
            if owner == local || owner == subject.node || owner_departed {
                store.set_owner(id, NodeId::NONE);
                report.releases += 1;
            }
        }
    }
    report
}

/// Authoritative arbitration: one release/claim pass per subject.
#[derive(Debug, Default)]
pub struct ServerAuthority {
    scratch: Vec<ObjectId>,
}

impl ServerAuthority {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl OwnershipStage for ServerAuthority {
    fn arbitrate(
        &mut self,
        store: &mut ObjectStore,
        snapshot: &PeerSnapshot,
        subjects: &[Subject],
        spec: AreaSpec,
        local: NodeId,
    ) -> ArbitrationReport {
        let mut report = ArbitrationReport::default();
        for subject in subjects {
            report.merge(release_nearby(
                store,
                snapshot,
                *subject,
                local,
                spec,
                &mut self.scratch,
            ));
        }
        report
    }
}

/// Client-side stand-in: arbitrates nothing. Ownership state arrives
/// from the authoritative node with the object stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassiveOwnership;

impl OwnershipStage for PassiveOwnership {
    fn arbitrate(
        &mut self,
        _store: &mut ObjectStore,
        _snapshot: &PeerSnapshot,
        _subjects: &[Subject],
        _spec: AreaSpec,
        _local: NodeId,
    ) -> ArbitrationReport {
        ArbitrationReport::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::peer::PeerView;

    const LOCAL: NodeId = NodeId(1);

    fn persistent_object(id: u64, zone_x: i32, zone_y: i32) -> WorldObject {
        let mut object = WorldObject::new(ObjectId(id), Zone::new(zone_x, zone_y).center());
        object.set_persistent(true);
        object
    }

    fn store_with(objects: Vec<(WorldObject, NodeId)>) -> ObjectStore {
        let mut store = ObjectStore::new();
        for (object, owner) in objects {
            let id = object.id();
            store.insert(object);
            if !owner.is_none() {
                store.set_owner(id, owner);
            }
        }
        store
    }

    fn ready_view(id: u64, zone_x: i32, zone_y: i32) -> PeerView {
        PeerView::new(NodeId(id), Zone::new(zone_x, zone_y).center(), true)
    }

    fn spec() -> AreaSpec {
        AreaSpec::new(2, 3)
    }

    #[test]
    fn test_claims_unowned_object_in_area() {
        let mut store = store_with(vec![(persistent_object(7, 0, 0), NodeId::NONE)]);
        let snapshot = PeerSnapshot::from_views(vec![ready_view(10, 0, 0)]);

        let report = release_nearby(
            &mut store,
            &snapshot,
            Subject::new(NodeId(10), Zone::new(0, 0).center()),
            LOCAL,
            spec(),
            &mut Vec::new(),
        );

        assert_eq!(report.claims, 1);
        assert_eq!(report.releases, 0);
        assert_eq!(store.get(ObjectId(7)).unwrap().owner(), LOCAL);
    }

    #[test]
    fn test_never_claims_for_a_peer() {
        // Every claim in the pass lands on the local node, regardless
        // of which subject triggered it
        let mut store = store_with(vec![(persistent_object(7, 5, 5), NodeId::NONE)]);
        let snapshot = PeerSnapshot::from_views(vec![ready_view(10, 5, 5)]);

        release_nearby(
            &mut store,
            &snapshot,
            Subject::new(NodeId(10), Zone::new(5, 5).center()),
            LOCAL,
            spec(),
            &mut Vec::new(),
        );

        assert_eq!(store.get(ObjectId(7)).unwrap().owner(), LOCAL);
    }

    #[test]
    fn test_releases_after_departure() {
        // Node 30 owned the object, disconnected, and gets a final
        // departure pass; no remaining peer covers the object
        let mut store = store_with(vec![(persistent_object(7, 0, 0), NodeId(30))]);
        let snapshot = PeerSnapshot::from_views(vec![ready_view(10, 20, 20)]);

        let report = release_nearby(
            &mut store,
            &snapshot,
            Subject::new(NodeId(30), Zone::new(0, 0).center()),
            LOCAL,
            spec(),
            &mut Vec::new(),
        );

        assert_eq!(report.releases, 1);
        assert!(store.get(ObjectId(7)).unwrap().owner().is_none());
    }

    #[test]
    fn test_releases_local_ownership_outside_all_areas() {
        let mut store = store_with(vec![(persistent_object(7, 0, 0), LOCAL)]);
        let snapshot = PeerSnapshot::from_views(vec![ready_view(10, 20, 20)]);

        let report = release_nearby(
            &mut store,
            &snapshot,
            Subject::new(NodeId(30), Zone::new(0, 0).center()),
            LOCAL,
            spec(),
            &mut Vec::new(),
        );

        assert_eq!(report.releases, 1);
        assert!(store.get(ObjectId(7)).unwrap().owner().is_none());
    }

    #[test]
    fn test_never_steals_from_covering_owner() {
        // Node 20 owns the object and its area still contains it
        let mut store = store_with(vec![(persistent_object(7, 1, 0), NodeId(20))]);
        let snapshot =
            PeerSnapshot::from_views(vec![ready_view(10, 0, 0), ready_view(20, 0, 0)]);

        let report = release_nearby(
            &mut store,
            &snapshot,
            Subject::new(NodeId(10), Zone::new(0, 0).center()),
            LOCAL,
            spec(),
            &mut Vec::new(),
        );

        assert_eq!(report.claims, 0);
        assert_eq!(store.get(ObjectId(7)).unwrap().owner(), NodeId(20));
    }

    #[test]
    fn test_claims_when_owner_stops_covering() {
        // Node 20 owns the object but sits far away; node 10 covers it
        let mut store = store_with(vec![(persistent_object(7, 0, 0), NodeId(20))]);
        let snapshot =
            PeerSnapshot::from_views(vec![ready_view(10, 0, 0), ready_view(20, 30, 30)]);

        let report = release_nearby(
            &mut store,
            &snapshot,
            Subject::new(NodeId(10), Zone::new(0, 0).center()),
            LOCAL,
            spec(),
            &mut Vec::new(),
        );

        assert_eq!(report.claims, 1);
        assert_eq!(report.healed, 0);
        assert_eq!(store.get(ObjectId(7)).unwrap().owner(), LOCAL);
    }

    #[test]
    fn test_heals_owner_no_longer_connected() {
        // Owner 99 is gone entirely but the object is still required
        let mut store = store_with(vec![(persistent_object(7, 0, 0), NodeId(99))]);
        let snapshot = PeerSnapshot::from_views(vec![ready_view(10, 0, 0)]);

        let report = release_nearby(
            &mut store,
            &snapshot,
            Subject::new(NodeId(10), Zone::new(0, 0).center()),
            LOCAL,
            spec(),
            &mut Vec::new(),
        );

        assert_eq!(report.claims, 1);
        assert_eq!(report.healed, 1);
        assert_eq!(store.get(ObjectId(7)).unwrap().owner(), LOCAL);
    }

    #[test]
    fn test_skips_transient_objects() {
        let mut object = WorldObject::new(ObjectId(7), Zone::new(0, 0).center());
        object.set_persistent(false);
        let mut store = ObjectStore::new();
        store.insert(object);
        let snapshot = PeerSnapshot::from_views(vec![ready_view(10, 0, 0)]);

        let report = release_nearby(
            &mut store,
            &snapshot,
            Subject::new(NodeId(10), Zone::new(0, 0).center()),
            LOCAL,
            spec(),
            &mut Vec::new(),
        );

        assert_eq!(report.claims, 0);
        assert!(store.get(ObjectId(7)).unwrap().owner().is_none());
    }

    #[test]
    fn test_connected_subject_keeps_covered_objects() {
        // Subject 10 owns an object inside its own square; the scan
        // must not release it while the subject still covers it
        let mut store = store_with(vec![(persistent_object(7, 1, 1), NodeId(10))]);
        let snapshot = PeerSnapshot::from_views(vec![ready_view(10, 0, 0)]);

        let report = release_nearby(
            &mut store,
            &snapshot,
            Subject::new(NodeId(10), Zone::new(0, 0).center()),
            LOCAL,
            spec(),
            &mut Vec::new(),
        );

        assert_eq!(report.releases, 0);
        assert_eq!(store.get(ObjectId(7)).unwrap().owner(), NodeId(10));
    }

    #[test]
    fn test_passive_stage_changes_nothing() {
        let mut store = store_with(vec![(persistent_object(7, 0, 0), NodeId::NONE)]);
        let snapshot = PeerSnapshot::from_views(vec![ready_view(10, 0, 0)]);
        let subjects = [Subject::new(NodeId(10), Zone::new(0, 0).center())];

        let mut stage = PassiveOwnership;
        let report = stage.arbitrate(&mut store, &snapshot, &subjects, spec(), LOCAL);

        assert_eq!(report, ArbitrationReport::default());
        assert!(store.get(ObjectId(7)).unwrap().owner().is_none());
    }
}
