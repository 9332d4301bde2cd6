//! # Zone Lifecycle
//!
//! The fixed-step heartbeat of the replication layer. Every tenth of a
//! second it refreshes zone residency around the connected peers,
//! diffs the union requirement against what is already materialized,
//! and hands the arbiter its release/claim subjects.
//!
//! ## Design
//!
//! The driver accumulates wall time and catches up in whole steps, so
//! a long frame runs several lifecycle ticks back to back. Zone records
//! carry a time-to-live that is refreshed while some ready peer's inner
//! square contains the zone and decays once nobody needs it. The
//! materialization diff is skipped entirely while no peer is ready:
//! the previous requirement freezes with the scene instead of tearing
//! the world down under an empty server.

use crate::area::{AreaSets, AreaSpec};
use crate::ownership::{ArbitrationReport, Subject};
use crate::pipeline::{AreaStage, OwnershipStage};
use crate::spatial::Zone;
use crate::world::object::ObjectId;
use crate::world::peer::{NodeId, PeerSnapshot, SessionState};
use crate::world::store::ObjectStore;
use meridian_shared::constants::{LIFECYCLE_TICK_SECS, ZONE_TTL_SECS};
use std::collections::HashMap;
use tracing::debug;

/// Scene-side collaborator that materializes and tears down object
/// instances. Both calls are idempotent: re-creating a live instance
/// and re-removing a missing one are no-ops on the scene side. Within
/// one lifecycle tick the same id never appears in both a create and
/// a remove call.
pub trait Materializer {
    /// Instantiates the given objects, split by visibility class.
    fn create_objects(&mut self, near: &[ObjectId], distant: &[ObjectId]);

    /// Tears down the given instances, split the same way.
    fn remove_objects(&mut self, near: &[ObjectId], distant: &[ObjectId]);
}

/// Materializer that records every call, for wiring tests and a
/// headless host that only needs the bookkeeping.
#[derive(Debug, Default)]
pub struct RecordingMaterializer {
    /// Ids created near, in call order.
    pub created_near: Vec<ObjectId>,
    /// Ids created distant, in call order.
    pub created_distant: Vec<ObjectId>,
    /// Ids removed, in call order, both classes merged.
    pub removed: Vec<ObjectId>,
}

impl RecordingMaterializer {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&mut self) {
        self.created_near.clear();
        self.created_distant.clear();
        self.removed.clear();
    }
}

impl Materializer for RecordingMaterializer {
    fn create_objects(&mut self, near: &[ObjectId], distant: &[ObjectId]) {
        self.created_near.extend_from_slice(near);
        self.created_distant.extend_from_slice(distant);
    }

    fn remove_objects(&mut self, near: &[ObjectId], distant: &[ObjectId]) {
        self.removed.extend_from_slice(near);
        self.removed.extend_from_slice(distant);
    }
}

#[derive(Debug)]
struct ZoneRecord {
    ttl: f32,
}

/// What one `advance` call did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LifecycleReport {
    /// Whole lifecycle ticks run by this advance.
    pub ticks_run: u32,
    /// Lifecycle tick counter after this advance.
    pub tick: u64,
    /// Objects newly required, with their distant flag.
    pub created: Vec<(ObjectId, bool)>,
    /// Objects no longer required anywhere.
    pub destroyed: Vec<ObjectId>,
    /// Folded result of every arbitration pass.
    pub arbitration: ArbitrationReport,
}

/// Fixed-step driver owning zone residency, the materialization diff
/// and the arbitration schedule.
#[derive(Debug, Default)]
pub struct LifecycleDriver {
    accumulator: f32,
    tick: u64,
    zones: HashMap<Zone, ZoneRecord>,
    previous: AreaSets,
    departures: Vec<Subject>,
    subjects: Vec<Subject>,
    near_create: Vec<ObjectId>,
    distant_create: Vec<ObjectId>,
    near_destroy: Vec<ObjectId>,
    distant_destroy: Vec<ObjectId>,
}

impl LifecycleDriver {
    /// Creates an idle driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lifecycle ticks run since creation.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// True while the zone's residency record has time to live.
    #[must_use]
    pub fn is_zone_loaded(&self, zone: Zone) -> bool {
        self.zones.contains_key(&zone)
    }

    /// Number of zones currently resident.
    #[must_use]
    pub fn loaded_zone_count(&self) -> usize {
        self.zones.len()
    }

    /// The active-area requirement as of the last materialization diff.
    /// This is what the send scheduler treats as the replicated set.
    #[must_use]
    pub fn current_requirement(&self) -> &AreaSets {
        &self.previous
    }

    /// Queues one final release pass on behalf of a peer that left.
    /// Runs on the next lifecycle tick, then is forgotten.
    pub fn note_departure(&mut self, subject: Subject) {
        self.departures.push(subject);
    }

    /// Drops all residency and diff state, as when leaving a session.
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
        self.zones.clear();
        self.previous = AreaSets::new();
        self.departures.clear();
    }

    /// Accumulates `dt` and runs every lifecycle tick that fits.
    /// Outside a connected session nothing accumulates and nothing
    /// runs.
    #[allow(clippy::too_many_arguments)]
    pub fn advance(
        &mut self,
        dt: f32,
        session: SessionState,
        snapshot: &PeerSnapshot,
        store: &mut ObjectStore,
        spec: AreaSpec,
        local: NodeId,
        area: &dyn AreaStage,
        ownership: &mut dyn OwnershipStage,
        materializer: &mut dyn Materializer,
    ) -> LifecycleReport {
        let mut report = LifecycleReport::default();
        if session != SessionState::Connected {
            report.tick = self.tick;
            return report;
        }

        self.accumulator += dt;
        while self.accumulator >= LIFECYCLE_TICK_SECS {
            self.accumulator -= LIFECYCLE_TICK_SECS;
            self.run_tick(snapshot, store, spec, local, area, ownership, materializer, &mut report);
            report.ticks_run += 1;
        }
        report.tick = self.tick;
        report
    }

    #[allow(clippy::too_many_arguments)]
    fn run_tick(
        &mut self,
        snapshot: &PeerSnapshot,
        store: &mut ObjectStore,
        spec: AreaSpec,
        local: NodeId,
        area: &dyn AreaStage,
        ownership: &mut dyn OwnershipStage,
        materializer: &mut dyn Materializer,
        report: &mut LifecycleReport,
    ) {
        self.tick += 1;

        // 1. Decay residency
        self.zones.retain(|_, record| {
            record.ttl -= LIFECYCLE_TICK_SECS;
            record.ttl > 0.0
        });

        // 2. Refresh every zone inside a ready peer's inner square
        for view in snapshot.ready() {
            for y in (view.zone.y - spec.near_radius)..=(view.zone.y + spec.near_radius) {
                for x in (view.zone.x - spec.near_radius)..=(view.zone.x + spec.near_radius) {
                    self.zones
                        .insert(Zone::new(x, y), ZoneRecord { ttl: ZONE_TTL_SECS });
                }
            }
        }

        // 3. Materialization diff, frozen while nobody is ready
        if snapshot.ready_count() > 0 {
            let required = area.required_sets(snapshot, store, spec);

            self.near_create.clear();
            self.distant_create.clear();
            self.near_destroy.clear();
            self.distant_destroy.clear();
            for id in &required.near {
                if !self.previous.contains(*id) {
                    self.near_create.push(*id);
                }
            }
            for id in &required.distant {
                if !self.previous.contains(*id) {
                    self.distant_create.push(*id);
                }
            }
            for id in &self.previous.near {
                if !required.contains(*id) {
                    self.near_destroy.push(*id);
                }
            }
            for id in &self.previous.distant {
                if !required.contains(*id) {
                    self.distant_destroy.push(*id);
                }
            }

            if !self.near_create.is_empty() || !self.distant_create.is_empty() {
                materializer.create_objects(&self.near_create, &self.distant_create);
            }
            if !self.near_destroy.is_empty() || !self.distant_destroy.is_empty() {
                materializer.remove_objects(&self.near_destroy, &self.distant_destroy);
            }
            let created = self.near_create.len() + self.distant_create.len();
            let destroyed = self.near_destroy.len() + self.distant_destroy.len();
            if created > 0 || destroyed > 0 {
                debug!(
                    tick = self.tick,
                    created, destroyed, "materialization diff applied"
                );
            }

            report
                .created
                .extend(self.near_create.iter().map(|id| (*id, false)));
            report
                .created
                .extend(self.distant_create.iter().map(|id| (*id, true)));
            report.destroyed.extend_from_slice(&self.near_destroy);
            report.destroyed.extend_from_slice(&self.distant_destroy);
            self.previous = required;
        }

        // 4. Arbitration over ready peers plus any queued departures
        self.subjects.clear();
        self.subjects.extend(
            snapshot
                .ready()
                .map(|view| Subject::new(view.id, view.reference_position)),
        );
        self.subjects.append(&mut self.departures);
        let pass = ownership.arbitrate(store, snapshot, &self.subjects, spec, local);
        report.arbitration.merge(pass);
    }
}
