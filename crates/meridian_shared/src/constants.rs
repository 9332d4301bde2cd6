//! # Replication Constants
//!
//! Production configuration for the MERIDIAN world sync layer.
//!
//! **CRITICAL:** These values are baked into both binaries.
//! Changes require a server AND client rebuild.

// =============================================================================
// WORLD GEOMETRY
// =============================================================================

/// Zone edge length in meters. World positions map to zone coordinates
/// by floor-division with this value.
pub const ZONE_SIZE: f32 = 64.0;

// =============================================================================
// TICK CADENCE
// =============================================================================

/// World lifecycle cadence in seconds (10 Hz): zone TTL decay,
/// materialization diffing and ownership arbitration.
pub const LIFECYCLE_TICK_SECS: f32 = 0.1;

/// Send scheduling cadence in seconds (20 Hz).
pub const SEND_TICK_SECS: f32 = 0.05;

/// Seconds a zone bookkeeping record survives without any peer's
/// active area refreshing it.
pub const ZONE_TTL_SECS: f32 = 4.0;

// =============================================================================
// SEND PRIORITY
// =============================================================================

/// Base score bonus subtracted for live player avatars, scaled by the
/// configured position update multiplier. Lower score = sent earlier.
pub const AVATAR_BOOST_BASE: f32 = 150.0;

/// Default maximum number of simultaneously admitted peers.
pub const DEFAULT_PLAYER_LIMIT: u32 = 10;
