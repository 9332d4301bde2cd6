//! Client memory guard. A long session drifts through many areas and
//! accumulates resident objects the server will never tear down on its
//! behalf; the pruner evicts the non-persistent, unrequired surplus
//! once a configured ceiling is crossed.

use crate::area::AreaSets;
use crate::config::SyncConfig;
use crate::world::object::ObjectId;
use crate::world::store::ObjectStore;
use tracing::{info, warn};

/// Time after joining before the first eviction may happen.
pub const PRUNE_GRACE_SECS: f32 = 600.0;

/// Evicts surplus resident objects above the configured ceiling.
/// Never runs on an authoritative node; persistent, required and owned
/// objects are exempt.
#[derive(Debug, Default)]
pub struct ObjectPruner {
    elapsed: f32,
    warned: bool,
    pruned_total: u64,
    candidates: Vec<ObjectId>,
}

impl ObjectPruner {
    /// Creates an idle pruner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Objects evicted since the last reset.
    #[must_use]
    pub const fn pruned_total(&self) -> u64 {
        self.pruned_total
    }

    /// Restarts the grace period, as when joining a new session.
    pub fn reset(&mut self) {
        self.elapsed = 0.0;
        self.warned = false;
        self.pruned_total = 0;
    }

    /// Accumulates time and evicts the surplus when the ceiling is
    /// crossed. Returns how many objects were evicted.
    pub fn advance(
        &mut self,
        dt: f32,
        authoritative: bool,
        config: &SyncConfig,
        store: &mut ObjectStore,
        required: &AreaSets,
    ) -> usize {
        if authoritative {
            return 0;
        }
        self.elapsed += dt;
        if self.elapsed < PRUNE_GRACE_SECS || config.max_resident_objects == 0 {
            return 0;
        }
        let limit = config.max_resident_objects as usize;
        if store.len() <= limit {
            return 0;
        }

        let excess = store.len() - limit;
        self.candidates.clear();
        self.candidates.extend(
            store
                .objects()
                .filter(|object| {
                    !object.is_persistent()
                        && !required.contains(object.id())
                        && object.owner().is_none()
                })
                .map(|object| object.id())
                .take(excess),
        );
        for id in &self.candidates {
            store.remove(*id);
        }

        let pruned = self.candidates.len();
        if pruned > 0 {
            if !self.warned {
                warn!(
                    limit,
                    "resident object ceiling crossed, evicting unrequired objects"
                );
                self.warned = true;
            }
            info!(pruned, resident = store.len(), "evicted resident objects");
            self.pruned_total += pruned as u64;
        }
        pruned
    }
}
