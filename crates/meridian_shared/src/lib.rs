//! # MERIDIAN Shared
//!
//! Common types used by both the authoritative server and thin clients.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on:
//! - Any transport or socket crate
//! - Anything that knows about the wire encoding
//!
//! If you need replication machinery, put it in `meridian_replication`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod events;
pub mod math;

pub use constants::{
    AVATAR_BOOST_BASE, LIFECYCLE_TICK_SECS, SEND_TICK_SECS, ZONE_SIZE, ZONE_TTL_SECS,
};
pub use events::{EventKind, ReplicationEvent};
pub use math::{Quaternion, Vec3};
