//! # Live Configuration
//!
//! One snapshot struct holds every tunable the replication layer
//! consumes. The [`ConfigStore`] replaces the snapshot atomically and
//! bumps a version counter; components fetch one `Arc` snapshot per
//! tick and never see a half-applied change.
//!
//! Values load from TOML. A file that fails validation is rejected
//! whole - the previous snapshot stays in effect.

use crate::area::AreaSpec;
use crate::error::{ReplicationError, ReplicationResult};
use meridian_shared::constants::DEFAULT_PLAYER_LIMIT;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Simulation-side update rate scaling. Lower rates stretch the
/// effective send interval to trade freshness for bandwidth.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateRate {
    /// Every send tick.
    #[default]
    Full,
    /// Three quarters of the full rate.
    ThreeQuarters,
    /// Half of the full rate.
    Half,
}

impl UpdateRate {
    /// Rate factor the base send interval is divided by.
    #[must_use]
    pub const fn factor(self) -> f32 {
        match self {
            Self::Full => 1.0,
            Self::ThreeQuarters => 0.75,
            Self::Half => 0.5,
        }
    }
}

/// Socket send-rate class in the transport's terms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendRateClass {
    /// Stock 150 KB/s.
    #[default]
    Vanilla150,
    /// 256 KB/s.
    Kb256,
    /// 512 KB/s.
    Kb512,
    /// 768 KB/s.
    Kb768,
    /// 1024 KB/s.
    Kb1024,
}

impl SendRateClass {
    /// Bytes per second for this class.
    #[must_use]
    pub const fn bytes_per_sec(self) -> u32 {
        match self {
            Self::Vanilla150 => 150 * 1024,
            Self::Kb256 => 256 * 1024,
            Self::Kb512 => 512 * 1024,
            Self::Kb768 => 768 * 1024,
            Self::Kb1024 => 1024 * 1024,
        }
    }
}

/// Per-peer send queue budget class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueSizeClass {
    /// Stock 10 KB queue.
    #[default]
    Vanilla10,
    /// 32 KB queue.
    Kb32,
    /// 48 KB queue.
    Kb48,
    /// 64 KB queue.
    Kb64,
    /// 80 KB queue.
    Kb80,
}

impl QueueSizeClass {
    /// Queue budget in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Vanilla10 => 10_240,
            Self::Kb32 => 32_768,
            Self::Kb48 => 49_152,
            Self::Kb64 => 65_536,
            Self::Kb80 => 81_920,
        }
    }
}

/// Transport backend override.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendChoice {
    /// Probe the environment.
    #[default]
    Auto,
    /// Force direct connections.
    Direct,
    /// Force relayed connections.
    Relay,
}

/// The replication tunables, one flat snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Zone radius added to both active-area radii. Must be >= 0.
    pub extended_zone_radius: i32,
    /// Inner active-area radius in zones.
    pub near_area_radius: i32,
    /// Outer active-area radius in zones. Must be >= the near radius.
    pub distant_area_radius: i32,
    /// Master switch for distance throttling.
    pub throttle_enabled: bool,
    /// Distance in meters beyond which updates are throttled.
    /// `0` disables throttling even when the switch is on.
    pub throttle_distance: f32,
    /// Master switch for the avatar priority boost.
    pub avatar_boost_enabled: bool,
    /// Avatar boost multiplier, honored in `1.0..=5.0`.
    pub position_update_multiplier: f32,
    /// Update rate scaling.
    pub update_rate: UpdateRate,
    /// Lower bound handed to the transport's rate limiter.
    pub send_rate_min: SendRateClass,
    /// Upper bound handed to the transport's rate limiter.
    pub send_rate_max: SendRateClass,
    /// Per-peer send plan budget. Read from the snapshot every tick,
    /// so a change applies to the next plan without a restart.
    pub queue_size: QueueSizeClass,
    /// Whether this node negotiates compressed links.
    pub compression_enabled: bool,
    /// Client-side smoothing: interpolate remote avatars.
    pub interpolation_enabled: bool,
    /// Client-side smoothing: extrapolate remote avatars ahead of the
    /// last update instead of trailing it.
    pub prediction_enabled: bool,
    /// Maximum number of simultaneously admitted peers.
    pub player_limit: u32,
    /// Client-side resident object ceiling. `0` disables pruning.
    pub max_resident_objects: u32,
    /// Transport backend override.
    pub backend_override: BackendChoice,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            extended_zone_radius: 1,
            near_area_radius: 2,
            distant_area_radius: 3,
            throttle_enabled: true,
            throttle_distance: 200.0,
            avatar_boost_enabled: true,
            position_update_multiplier: 2.5,
            update_rate: UpdateRate::Full,
            send_rate_min: SendRateClass::Vanilla150,
            send_rate_max: SendRateClass::Vanilla150,
            queue_size: QueueSizeClass::Vanilla10,
            compression_enabled: true,
            interpolation_enabled: true,
            prediction_enabled: false,
            player_limit: DEFAULT_PLAYER_LIMIT,
            max_resident_objects: 0,
            backend_override: BackendChoice::Auto,
        }
    }
}

impl SyncConfig {
    /// Active-area radii with the extended radius applied.
    #[must_use]
    pub fn area_spec(&self) -> AreaSpec {
        AreaSpec::new(
            self.near_area_radius + self.extended_zone_radius,
            self.distant_area_radius + self.extended_zone_radius,
        )
    }

    /// Checks every field against its documented range.
    ///
    /// # Errors
    ///
    /// [`ReplicationError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> ReplicationResult<()> {
        if self.extended_zone_radius < 0 {
            return Err(ReplicationError::InvalidConfig(
                "extended_zone_radius must be >= 0".to_string(),
            ));
        }
        if self.near_area_radius < 0 {
            return Err(ReplicationError::InvalidConfig(
                "near_area_radius must be >= 0".to_string(),
            ));
        }
        if self.distant_area_radius < self.near_area_radius {
            return Err(ReplicationError::InvalidConfig(
                "distant_area_radius must be >= near_area_radius".to_string(),
            ));
        }
        if self.throttle_distance < 0.0 {
            return Err(ReplicationError::InvalidConfig(
                "throttle_distance must be >= 0 (0 disables throttling)".to_string(),
            ));
        }
        if !(1.0..=5.0).contains(&self.position_update_multiplier) {
            return Err(ReplicationError::InvalidConfig(
                "position_update_multiplier must be within 1.0..=5.0".to_string(),
            ));
        }
        if self.send_rate_min > self.send_rate_max {
            return Err(ReplicationError::InvalidConfig(
                "send_rate_min must not exceed send_rate_max".to_string(),
            ));
        }
        if self.player_limit == 0 {
            return Err(ReplicationError::InvalidConfig(
                "player_limit must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses and validates a TOML document. Absent keys keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// [`ReplicationError::ConfigParse`] for malformed TOML,
    /// [`ReplicationError::InvalidConfig`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> ReplicationResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|error| ReplicationError::ConfigParse(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// [`ReplicationError::ConfigRead`] when the file cannot be read,
    /// plus everything [`SyncConfig::from_toml_str`] raises.
    pub fn load(path: &Path) -> ReplicationResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|error| ReplicationError::ConfigRead(error.to_string()))?;
        Self::from_toml_str(&text)
    }
}

/// Atomically replaceable configuration snapshot with a version
/// counter. Readers grab one `Arc` per tick; writers swap the whole
/// snapshot or nothing.
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<Arc<SyncConfig>>,
    version: AtomicU64,
}

impl ConfigStore {
    /// Creates a store holding a validated snapshot.
    ///
    /// # Errors
    ///
    /// [`ReplicationError::InvalidConfig`] when the initial snapshot
    /// fails validation.
    pub fn new(config: SyncConfig) -> ReplicationResult<Self> {
        config.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(config)),
            version: AtomicU64::new(1),
        })
    }

    /// Creates a store holding the defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            current: RwLock::new(Arc::new(SyncConfig::default())),
            version: AtomicU64::new(1),
        }
    }

    /// The current snapshot. Fetch once per tick and pass it down.
    #[must_use]
    pub fn snapshot(&self) -> Arc<SyncConfig> {
        self.current.read().clone()
    }

    /// Counter bumped on every successful install.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Validates and installs a new snapshot, returning its version.
    /// A rejected snapshot leaves the previous one in effect.
    ///
    /// # Errors
    ///
    /// [`ReplicationError::InvalidConfig`] naming the offending field.
    pub fn install(&self, config: SyncConfig) -> ReplicationResult<u64> {
        if let Err(error) = config.validate() {
            warn!(%error, "configuration rejected, keeping previous snapshot");
            return Err(error);
        }
        *self.current.write() = Arc::new(config);
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        info!(version, "configuration replaced");
        Ok(version)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(SyncConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SyncConfig::from_toml_str(
            r#"
            throttle_distance = 350.0
            update_rate = "three_quarters"
            queue_size = "kb64"
            "#,
        )
        .unwrap();

        assert_eq!(config.throttle_distance, 350.0);
        assert_eq!(config.update_rate, UpdateRate::ThreeQuarters);
        assert_eq!(config.queue_size.bytes(), 65_536);
        // Untouched keys stay at their defaults
        assert_eq!(config.near_area_radius, 2);
        assert_eq!(config.position_update_multiplier, 2.5);
    }

    #[test]
    fn test_validation_rejects_inverted_radii() {
        let config = SyncConfig {
            near_area_radius: 4,
            distant_area_radius: 2,
            ..SyncConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ReplicationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validation_bounds_multiplier() {
        let config = SyncConfig {
            position_update_multiplier: 7.5,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SyncConfig {
            position_update_multiplier: 0.5,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_swaps_and_versions() {
        let store = ConfigStore::with_defaults();
        assert_eq!(store.version(), 1);
        assert_eq!(store.snapshot().extended_zone_radius, 1);

        let updated = SyncConfig {
            extended_zone_radius: 3,
            ..SyncConfig::default()
        };
        let version = store.install(updated).unwrap();
        assert_eq!(version, 2);
        assert_eq!(store.snapshot().extended_zone_radius, 3);
    }

    #[test]
    fn test_store_keeps_previous_on_rejection() {
        let store = ConfigStore::with_defaults();
        let bad = SyncConfig {
            player_limit: 0,
            ..SyncConfig::default()
        };

        assert!(store.install(bad).is_err());
        assert_eq!(store.version(), 1);
        assert_eq!(store.snapshot().player_limit, DEFAULT_PLAYER_LIMIT);
    }

    #[test]
    fn test_area_spec_applies_extended_radius() {
        let spec = SyncConfig::default().area_spec();
        assert_eq!(spec.near_radius, 3);
        assert_eq!(spec.distant_radius, 4);
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        assert!(matches!(
            SyncConfig::from_toml_str("throttle_distance = \"fast\""),
            Err(ReplicationError::ConfigParse(_))
        ));
    }
}
