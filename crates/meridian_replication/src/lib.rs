//! # MERIDIAN Replication - The Authority Plane
//!
//! The server decides what exists, who simulates it, and who hears
//! about it. This crate is that decision logic: pure, synchronous,
//! transport-agnostic.
//!
//! ## Architecture
//!
//! ```text
//! host frame ── advance(dt) ──────────────────────────────────────┐
//!                                                                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │ ReplicationPipeline                                               │
//! │                                                                   │
//! │  config snapshot ─► peer snapshot ─► LifecycleDriver (10 Hz)      │
//! │                                       ├─ zone residency / TTL     │
//! │                                       ├─ area diff ───────────────┼─► Materializer
//! │                                       └─ ownership arbitration    │
//! │                                                                   │
//! │  send accumulator ─► SendStage (20 Hz, scored, budgeted) ─────────┼─► Transport
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every tick reads ONE configuration snapshot and ONE peer snapshot,
//! taken up front. Nothing downstream observes a half-applied change.
//!
//! The three decision stages (area aggregation, ownership arbitration,
//! send scheduling) sit behind traits and are picked once at assembly
//! from the node's [`Capabilities`]: an authoritative node runs the
//! full set, everything else runs the passive fallbacks.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use meridian_replication::{
//!     Capabilities, ConfigStore, NodeId, NodeRole, NullTransport,
//!     RecordingMaterializer, ReplicationPipeline, TransportBackend,
//! };
//!
//! let mut pipeline = ReplicationPipeline::assemble(
//!     Capabilities::with_role(NodeRole::DedicatedServer, TransportBackend::Direct),
//!     NodeId(1),
//!     Arc::new(ConfigStore::with_defaults()),
//!     RecordingMaterializer::new(),
//!     NullTransport::new(),
//! )?;
//! pipeline.advance(0.016); // once per host frame
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod area;
pub mod capability;
pub mod config;
pub mod error;
pub mod handshake;
pub mod lifecycle;
pub mod ownership;
pub mod pipeline;
pub mod scheduler;
pub mod smoothing;
pub mod spatial;
pub mod transport;
pub mod world;

// Re-exports for convenience
pub use area::{AllPeersArea, AreaSets, AreaSpec, LocalArea};
pub use capability::{Capabilities, NodeRole, TransportBackend};
pub use config::{ConfigStore, SyncConfig};
pub use error::{ReplicationError, ReplicationResult};
pub use handshake::{
    HandshakeDirectory, HandshakeMsg, HandshakePhase, PeerLink, NEGOTIATION_VERSION,
};
pub use lifecycle::{LifecycleDriver, LifecycleReport, Materializer, RecordingMaterializer};
pub use meridian_shared::events::{EventKind, ReplicationEvent};
pub use ownership::{ArbitrationReport, PassiveOwnership, ServerAuthority, Subject};
pub use pipeline::{AreaStage, OwnershipStage, PipelineStats, ReplicationPipeline, SendStage};
pub use scheduler::{PlannedSend, PrioritizedSend, SendPlan, VanillaSend};
pub use smoothing::AvatarSmoother;
pub use spatial::{SectorIndex, Zone};
pub use transport::{ChannelTransport, NullTransport, Transport};
pub use world::{NodeId, ObjectId, ObjectStore, PeerTable, SessionState, WorldObject};
