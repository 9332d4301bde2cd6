//! # Send Scheduling
//!
//! Turns "these objects are required by this peer" into "send these
//! state updates now, in this order". Planning is pure: a plan is data,
//! and nothing is recorded until the caller commits it after the
//! transport accepted the sends.
//!
//! ## Design
//!
//! Each candidate gets a score, lower sends first. The base score is
//! plain 3D distance to the peer's reference position; player avatars
//! subtract a boost so a sprinting player outranks the scenery around
//! them. Distance throttling doubles a far object's resend interval
//! rather than dropping it. A per-peer byte budget cuts the tail of
//! the sorted plan; what is cut is merely deferred and wins on a later
//! tick once it is overdue.

use crate::area::AreaSets;
use crate::config::SyncConfig;
use crate::pipeline::SendStage;
use crate::world::object::ObjectId;
use crate::world::peer::{NodeId, PeerView};
use crate::world::store::ObjectStore;
use meridian_shared::constants::{AVATAR_BOOST_BASE, SEND_TICK_SECS};
use meridian_shared::events::EventKind;
use std::collections::HashMap;

// Interval multiplier applied to objects beyond the throttle distance.
const THROTTLE_INTERVAL_FACTOR: f64 = 2.0;

/// One planned state update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlannedSend {
    /// Object to send.
    pub object_id: ObjectId,
    /// Priority score, lower first. Negative for boosted avatars.
    pub score: f32,
    /// Estimated encoded size in bytes.
    pub wire_size: usize,
}

/// Ordered send plan for one peer and one send tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SendPlan {
    /// Peer this plan addresses.
    pub peer: NodeId,
    /// Sends in transmit order.
    pub entries: Vec<PlannedSend>,
    /// Due sends cut by the byte budget this tick.
    pub deferred: u32,
    /// True when the budget cut the plan.
    pub budget_exhausted: bool,
}

impl SendPlan {
    /// True when nothing is due.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of planned sends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Default)]
struct PeerSendState {
    last_sent: HashMap<ObjectId, f64>,
}

fn priority_score(distance: f32, is_avatar: bool, config: &SyncConfig) -> f32 {
    let mut score = distance;
    if config.avatar_boost_enabled && is_avatar {
        score -= AVATAR_BOOST_BASE * config.position_update_multiplier.clamp(1.0, 5.0);
    }
    score
}

/// Boosted, throttled and budgeted planner for authoritative nodes.
#[derive(Debug, Default)]
pub struct PrioritizedSend {
    states: HashMap<NodeId, PeerSendState>,
}

impl PrioritizedSend {
    /// Creates the stage with no send history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SendStage for PrioritizedSend {
    fn plan(
        &mut self,
        peer: &PeerView,
        candidates: &AreaSets,
        store: &ObjectStore,
        config: &SyncConfig,
        now_secs: f64,
    ) -> SendPlan {
        let state = self.states.get(&peer.id);
        let base_interval = f64::from(SEND_TICK_SECS / config.update_rate.factor());
        let throttle_active = config.throttle_enabled && config.throttle_distance > 0.0;

        let mut due: Vec<PlannedSend> = Vec::new();
        for id in candidates.required() {
            let Some(object) = store.get(*id) else {
                continue;
            };
            let distance = object.position().distance(peer.reference_position);
            let throttled = throttle_active && distance > config.throttle_distance;
            let interval = if throttled {
                base_interval * THROTTLE_INTERVAL_FACTOR
            } else {
                base_interval
            };
            let due_now = state
                .and_then(|state| state.last_sent.get(id))
                .map_or(true, |sent| now_secs - sent >= interval);
            if !due_now {
                continue;
            }
            due.push(PlannedSend {
                object_id: *id,
                score: priority_score(distance, object.is_player_avatar(), config),
                wire_size: EventKind::StateUpdate.wire_size_hint(),
            });
        }

        due.sort_by(|a, b| a.score.total_cmp(&b.score));

        let budget = config.queue_size.bytes();
        let mut used = 0usize;
        let mut plan = SendPlan {
            peer: peer.id,
            ..SendPlan::default()
        };
        for entry in due {
            if plan.budget_exhausted || used + entry.wire_size > budget {
                plan.budget_exhausted = true;
                plan.deferred += 1;
                continue;
            }
            used += entry.wire_size;
            plan.entries.push(entry);
        }
        plan
    }

    fn commit(&mut self, plan: &SendPlan, now_secs: f64) {
        let state = self.states.entry(plan.peer).or_default();
        for entry in &plan.entries {
            state.last_sent.insert(entry.object_id, now_secs);
        }
    }

    fn forget_peer(&mut self, peer: NodeId) {
        self.states.remove(&peer);
    }

    fn forget_object(&mut self, id: ObjectId) {
        for state in self.states.values_mut() {
            state.last_sent.remove(&id);
        }
    }
}

/// Plain nearest-first planner: no boost, no throttle, no budget.
/// What a node falls back to when it is not the authority.
#[derive(Debug, Default)]
pub struct VanillaSend {
    states: HashMap<NodeId, PeerSendState>,
}

impl VanillaSend {
    /// Creates the stage with no send history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SendStage for VanillaSend {
    fn plan(
        &mut self,
        peer: &PeerView,
        candidates: &AreaSets,
        store: &ObjectStore,
        _config: &SyncConfig,
        now_secs: f64,
    ) -> SendPlan {
        let state = self.states.get(&peer.id);
        let interval = f64::from(SEND_TICK_SECS);

        let mut plan = SendPlan {
            peer: peer.id,
            ..SendPlan::default()
        };
        for id in candidates.required() {
            let Some(object) = store.get(*id) else {
                continue;
            };
            let due_now = state
                .and_then(|state| state.last_sent.get(id))
                .map_or(true, |sent| now_secs - sent >= interval);
            if !due_now {
                continue;
            }
            plan.entries.push(PlannedSend {
                object_id: *id,
                score: object.position().distance(peer.reference_position),
                wire_size: EventKind::StateUpdate.wire_size_hint(),
            });
        }
        plan.entries.sort_by(|a, b| a.score.total_cmp(&b.score));
        plan
    }

    fn commit(&mut self, plan: &SendPlan, now_secs: f64) {
        let state = self.states.entry(plan.peer).or_default();
        for entry in &plan.entries {
            state.last_sent.insert(entry.object_id, now_secs);
        }
    }

    fn forget_peer(&mut self, peer: NodeId) {
        self.states.remove(&peer);
    }

    fn forget_object(&mut self, id: ObjectId) {
        for state in self.states.values_mut() {
            state.last_sent.remove(&id);
        }
    }
}
