//! # Replication Pipeline
//!
//! The composition root. One `ReplicationPipeline` per process wires the
//! peer table, the object store, the lifecycle driver and the send
//! scheduler behind a single `advance(dt)` entry point.
//!
//! ## Design
//!
//! The three decision stages sit behind traits and are picked once at
//! assembly from the node's capabilities:
//!
//! | stage     | authoritative      | fallback           |
//! |-----------|--------------------|--------------------|
//! | area      | [`AllPeersArea`]   | [`LocalArea`]      |
//! | ownership | [`ServerAuthority`]| [`PassiveOwnership`]|
//! | send      | [`PrioritizedSend`]| [`VanillaSend`]    |
//!
//! Everything runs on the caller's tick thread. Each `advance` reads one
//! configuration snapshot and one peer snapshot up front; nothing
//! downstream observes a half-applied change.

use crate::area::{AllPeersArea, AreaSets, AreaSpec, LocalArea};
use crate::capability::Capabilities;
use crate::config::{ConfigStore, SyncConfig};
use crate::error::{ReplicationError, ReplicationResult};
use crate::handshake::{HandshakeDirectory, HandshakeMsg};
use crate::lifecycle::{LifecycleDriver, LifecycleReport, Materializer};
use crate::ownership::{ArbitrationReport, PassiveOwnership, ServerAuthority, Subject};
use crate::scheduler::{PrioritizedSend, SendPlan, VanillaSend};
use crate::spatial::Zone;
use crate::transport::{apply_rate_limits, Transport};
use crate::world::object::ObjectId;
use crate::world::peer::{NodeId, PeerSnapshot, PeerTable, PeerView, SessionState};
use crate::world::pruner::ObjectPruner;
use crate::world::store::ObjectStore;
use meridian_shared::constants::SEND_TICK_SECS;
use meridian_shared::events::ReplicationEvent;
use meridian_shared::math::Vec3;
use std::sync::Arc;
use tracing::{debug, info};

/// Aggregates which objects peers need this tick.
pub trait AreaStage {
    /// Computes the near/distant requirement over the snapshot.
    fn required_sets(
        &self,
        snapshot: &PeerSnapshot,
        store: &ObjectStore,
        spec: AreaSpec,
    ) -> AreaSets;

    /// True when every zone the stage cares about satisfies `loaded`.
    fn fully_loaded(
        &self,
        snapshot: &PeerSnapshot,
        near_radius: i32,
        loaded: &dyn Fn(Zone) -> bool,
    ) -> bool;
}

/// Runs the per-tick ownership pass over the given subjects.
pub trait OwnershipStage {
    /// Releases and claims persistent objects around each subject.
    fn arbitrate(
        &mut self,
        store: &mut ObjectStore,
        snapshot: &PeerSnapshot,
        subjects: &[Subject],
        spec: AreaSpec,
        local: NodeId,
    ) -> ArbitrationReport;
}

/// Plans which state updates one peer receives this send tick.
pub trait SendStage {
    /// Builds a pure plan; nothing is recorded until [`SendStage::commit`].
    fn plan(
        &mut self,
        peer: &PeerView,
        candidates: &AreaSets,
        store: &ObjectStore,
        config: &SyncConfig,
        now_secs: f64,
    ) -> SendPlan;

    /// Records the plan's entries as sent at `now_secs`.
    fn commit(&mut self, plan: &SendPlan, now_secs: f64);

    /// Drops all per-peer send history.
    fn forget_peer(&mut self, peer: NodeId);

    /// Drops one object's send history for every peer.
    fn forget_object(&mut self, id: ObjectId);
}

/// Running totals across the pipeline's lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Whole lifecycle ticks run.
    pub lifecycle_ticks: u64,
    /// Whole send ticks run.
    pub send_ticks: u64,
    /// Objects handed to the materializer for creation.
    pub objects_created: u64,
    /// Objects handed to the materializer for teardown.
    pub objects_destroyed: u64,
    /// Ownership claims taken by the local node.
    pub claims: u64,
    /// Ownership releases back to the neutral owner.
    pub releases: u64,
    /// Owner references healed to the neutral owner before a claim.
    pub healed: u64,
    /// State updates handed to the transport.
    pub state_updates_sent: u64,
    /// Planned sends pushed past a send tick by the byte budget.
    pub sends_deferred: u64,
    /// Objects evicted by the resident-count ceiling.
    pub pruned: u64,
    /// Configuration snapshots picked up mid-flight.
    pub config_reloads: u64,
}

/// Owns every replication subsystem and drives them in tick order.
pub struct ReplicationPipeline<M: Materializer, T: Transport> {
    /// Facts about this process, probed once at assembly.
    capabilities: Capabilities,
    /// This node's identifier.
    local: NodeId,
    /// Shared configuration store; reloads land between ticks.
    config: Arc<ConfigStore>,
    /// Version of the last applied snapshot.
    config_version: u64,
    /// World-session status gating the lifecycle and send passes.
    session: SessionState,
    /// Admitted peers.
    peers: PeerTable,
    /// Authoritative object state.
    store: ObjectStore,
    /// Fixed-step residency/diff/arbitration driver.
    driver: LifecycleDriver,
    /// Area aggregation stage.
    area: Box<dyn AreaStage>,
    /// Ownership arbitration stage.
    ownership: Box<dyn OwnershipStage>,
    /// Send scheduling stage.
    send: Box<dyn SendStage>,
    /// Per-peer compression negotiation.
    handshakes: HandshakeDirectory,
    /// Resident-count enforcement for non-authoritative nodes.
    pruner: ObjectPruner,
    /// Scene-side create/remove collaborator.
    materializer: M,
    /// Event sink towards the peers.
    transport: T,
    /// Seconds of simulated time accumulated so far.
    clock: f64,
    /// Partial send tick carried between advances.
    send_accumulator: f32,
    /// Outgoing handshake messages awaiting the host.
    control: Vec<(NodeId, HandshakeMsg)>,
    /// Running totals.
    stats: PipelineStats,
}

impl<M: Materializer, T: Transport> ReplicationPipeline<M, T> {
    /// Wires a pipeline for the given node, picking the decision stages
    /// from its capabilities.
    ///
    /// # Errors
    ///
    /// [`ReplicationError::NullNodeId`] when `local` is the reserved id.
    pub fn assemble(
        capabilities: Capabilities,
        local: NodeId,
        config: Arc<ConfigStore>,
        materializer: M,
        mut transport: T,
    ) -> ReplicationResult<Self> {
        if local.is_none() {
            return Err(ReplicationError::NullNodeId);
        }
        let boot = config.snapshot();
        let version = config.version();
        apply_rate_limits(&mut transport, &boot);

        let (area, ownership, send): (
            Box<dyn AreaStage>,
            Box<dyn OwnershipStage>,
            Box<dyn SendStage>,
        ) = if capabilities.authoritative() {
            (
                Box::new(AllPeersArea),
                Box::new(ServerAuthority::new()),
                Box::new(PrioritizedSend::new()),
            )
        } else {
            (
                Box::new(LocalArea { local }),
                Box::new(PassiveOwnership),
                Box::new(VanillaSend::new()),
            )
        };

        info!(
            role = %capabilities.role,
            backend = ?capabilities.backend,
            local = %local,
            "replication pipeline assembled"
        );

        Ok(Self {
            capabilities,
            local,
            peers: PeerTable::new(boot.player_limit),
            handshakes: HandshakeDirectory::new(boot.compression_enabled),
            config,
            config_version: version,
            session: SessionState::Disconnected,
            store: ObjectStore::new(),
            driver: LifecycleDriver::new(),
            area,
            ownership,
            send,
            pruner: ObjectPruner::new(),
            materializer,
            transport,
            clock: 0.0,
            send_accumulator: 0.0,
            control: Vec::new(),
            stats: PipelineStats::default(),
        })
    }

    /// Moves the session state machine. Leaving for
    /// [`SessionState::Disconnected`] drops residency, diff state and
    /// the prune grace period.
    pub fn set_session(&mut self, session: SessionState) {
        if session == self.session {
            return;
        }
        info!(from = ?self.session, to = ?session, "session state changed");
        if session == SessionState::Disconnected {
            self.driver.reset();
            self.pruner.reset();
            self.send_accumulator = 0.0;
        }
        self.session = session;
    }

    /// Admits a peer and queues the negotiation hello for it.
    ///
    /// # Errors
    ///
    /// [`ReplicationError::NullNodeId`] for the reserved id,
    /// [`ReplicationError::PeerAlreadyAdmitted`] for a duplicate,
    /// [`ReplicationError::ServerFull`] past the configured limit.
    pub fn peer_connected(&mut self, id: NodeId, position: Vec3) -> ReplicationResult<()> {
        self.peers.admit(id, position)?;
        let hello = self.handshakes.register(id);
        self.control.push((id, hello));
        Ok(())
    }

    /// Marks a peer as fully handshaked. Only ready peers contribute to
    /// area aggregation and receive state updates.
    ///
    /// # Errors
    ///
    /// [`ReplicationError::UnknownPeer`] when the peer is not admitted.
    pub fn peer_ready(&mut self, id: NodeId) -> ReplicationResult<()> {
        self.peers.mark_ready(id)
    }

    /// Updates a peer's reference position from the position feed.
    ///
    /// # Errors
    ///
    /// [`ReplicationError::UnknownPeer`] when the peer is not admitted.
    pub fn peer_position(&mut self, id: NodeId, position: Vec3) -> ReplicationResult<()> {
        self.peers.update_position(id, position)
    }

    /// Removes a peer, forgets its send history and negotiation link,
    /// and queues one release pass over its last known surroundings.
    pub fn peer_disconnected(&mut self, id: NodeId) {
        if let Some(peer) = self.peers.remove(id) {
            self.driver
                .note_departure(Subject::new(peer.id, peer.reference_position));
        }
        self.handshakes.remove(id);
        self.send.forget_peer(id);
    }

    /// Feeds one negotiation message from a peer; any reply lands in the
    /// control queue. Messages from unknown peers are dropped.
    pub fn handshake_message(&mut self, peer: NodeId, message: HandshakeMsg) {
        if let Some(reply) = self.handshakes.on_message(peer, message) {
            self.control.push((peer, reply));
        }
    }

    /// Notes a compressed-payload decode failure from a peer; receiving
    /// falls back to plain.
    pub fn handshake_decode_failure(&mut self, peer: NodeId) {
        self.handshakes.on_decode_failure(peer);
    }

    /// Takes the queued outgoing negotiation messages. The host delivers
    /// them over its ordered control channel.
    #[must_use]
    pub fn drain_control(&mut self) -> Vec<(NodeId, HandshakeMsg)> {
        std::mem::take(&mut self.control)
    }

    /// Runs one frame: picks up configuration changes, advances the
    /// lifecycle driver, broadcasts its diff, enforces the resident
    /// ceiling and runs every send tick that fits.
    pub fn advance(&mut self, dt: f32) {
        self.clock += f64::from(dt);

        let version = self.config.version();
        let config = self.config.snapshot();
        if version != self.config_version {
            self.config_version = version;
            self.stats.config_reloads += 1;
            self.peers.set_limit(config.player_limit);
            apply_rate_limits(&mut self.transport, &config);
            let notices = self.handshakes.set_enabled(config.compression_enabled);
            self.control.extend(notices);
            debug!(version, "tick picked up replaced configuration");
        }

        let snapshot = self.peers.snapshot();
        let spec = config.area_spec();

        let report = self.driver.advance(
            dt,
            self.session,
            &snapshot,
            &mut self.store,
            spec,
            self.local,
            self.area.as_ref(),
            self.ownership.as_mut(),
            &mut self.materializer,
        );

        self.stats.lifecycle_ticks += u64::from(report.ticks_run);
        self.stats.objects_created += report.created.len() as u64;
        self.stats.objects_destroyed += report.destroyed.len() as u64;
        self.stats.claims += u64::from(report.arbitration.claims);
        self.stats.releases += u64::from(report.arbitration.releases);
        self.stats.healed += u64::from(report.arbitration.healed);

        if !report.created.is_empty() || !report.destroyed.is_empty() {
            self.broadcast_lifecycle(&snapshot, &report);
        }

        let pruned = self.pruner.advance(
            dt,
            self.capabilities.authoritative(),
            &config,
            &mut self.store,
            self.driver.current_requirement(),
        );
        self.stats.pruned += pruned as u64;

        if self.session == SessionState::Connected {
            self.send_accumulator += dt;
            while self.send_accumulator >= SEND_TICK_SECS {
                self.send_accumulator -= SEND_TICK_SECS;
                self.run_send_tick(&snapshot, &config);
            }
        }
    }

    /// True when every zone the local area stage needs is resident.
    #[must_use]
    pub fn is_area_ready(&self) -> bool {
        let snapshot = self.peers.snapshot();
        let spec = self.config.snapshot().area_spec();
        self.area
            .fully_loaded(&snapshot, spec.near_radius, &|zone| {
                self.driver.is_zone_loaded(zone)
            })
    }

    /// Running totals.
    #[must_use]
    pub const fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// This node's capabilities.
    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// This node's identifier.
    #[must_use]
    pub const fn local(&self) -> NodeId {
        self.local
    }

    /// Current session state.
    #[must_use]
    pub const fn session(&self) -> SessionState {
        self.session
    }

    /// The peer table.
    #[must_use]
    pub const fn peers(&self) -> &PeerTable {
        &self.peers
    }

    /// The object store.
    #[must_use]
    pub const fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// Mutable access to the object store for the host's world feed.
    pub fn store_mut(&mut self) -> &mut ObjectStore {
        &mut self.store
    }

    /// The negotiation directory.
    #[must_use]
    pub const fn handshakes(&self) -> &HandshakeDirectory {
        &self.handshakes
    }

    /// The scene-side collaborator.
    #[must_use]
    pub const fn materializer(&self) -> &M {
        &self.materializer
    }

    /// Mutable access to the scene-side collaborator.
    pub fn materializer_mut(&mut self) -> &mut M {
        &mut self.materializer
    }

    /// The event sink.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    fn broadcast_lifecycle(&mut self, snapshot: &PeerSnapshot, report: &LifecycleReport) {
        for (id, distant) in &report.created {
            let Some(object) = self.store.get(*id) else {
                continue;
            };
            let event = ReplicationEvent::ObjectCreated {
                object_id: id.0,
                position: object.position(),
                distant: *distant,
                tick: report.tick,
            };
            for view in snapshot.ready() {
                self.transport.transmit(view.id, &event);
            }
        }
        for id in &report.destroyed {
            self.send.forget_object(*id);
            let event = ReplicationEvent::ObjectDestroyed {
                object_id: id.0,
                tick: report.tick,
            };
            for view in snapshot.ready() {
                self.transport.transmit(view.id, &event);
            }
        }
        for view in snapshot.ready() {
            self.transport.flush(view.id);
        }
    }

    fn run_send_tick(&mut self, snapshot: &PeerSnapshot, config: &SyncConfig) {
        self.stats.send_ticks += 1;
        for view in snapshot.ready() {
            let plan = self.send.plan(
                view,
                self.driver.current_requirement(),
                &self.store,
                config,
                self.clock,
            );
            if plan.is_empty() && plan.deferred == 0 {
                continue;
            }
            for entry in &plan.entries {
                let Some(object) = self.store.get(entry.object_id) else {
                    continue;
                };
                let event = ReplicationEvent::StateUpdate {
                    object_id: entry.object_id.0,
                    position: object.position(),
                    rotation: object.rotation(),
                    revision: object.revision(),
                };
                self.transport.transmit(view.id, &event);
                self.stats.state_updates_sent += 1;
            }
            self.transport.flush(view.id);
            self.stats.sends_deferred += u64::from(plan.deferred);
            self.send.commit(&plan, self.clock);
        }
    }
}
