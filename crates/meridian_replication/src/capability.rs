//! # Node Capabilities
//!
//! What kind of node this process is and how it talks to the world.
//! Probed exactly once by the composition root and passed down by
//! value; nothing re-reads the environment after assembly.

use crate::config::{BackendChoice, SyncConfig};
use std::fmt;
use tracing::info;

/// Role this node plays in the session topology.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeRole {
    /// Headless authoritative host with no local avatar.
    DedicatedServer,
    /// Authoritative host that also runs a local avatar.
    ListenServer,
    /// Pure client, authoritative over nothing.
    Client,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DedicatedServer => write!(f, "dedicated-server"),
            Self::ListenServer => write!(f, "listen-server"),
            Self::Client => write!(f, "client"),
        }
    }
}

/// Transport path in use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportBackend {
    /// Peers connect straight to this node.
    Direct,
    /// Traffic rides a relay service.
    Relay,
}

/// Immutable facts about this process, probed once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Session role.
    pub role: NodeRole,
    /// Transport path.
    pub backend: TransportBackend,
    /// True when the process runs without any local presentation.
    pub headless: bool,
}

impl Capabilities {
    /// Probes the environment and the config override. Call once at
    /// startup, then hand the result down.
    ///
    /// `MERIDIAN_ROLE` (`server`, `listen`, `client`) pins the role;
    /// otherwise `MERIDIAN_HEADLESS=1` implies a dedicated server.
    /// `MERIDIAN_BACKEND=relay` selects the relay path when the config
    /// leaves the backend on auto.
    #[must_use]
    pub fn detect(config: &SyncConfig) -> Self {
        let env_role = std::env::var("MERIDIAN_ROLE").ok();
        let headless = std::env::var("MERIDIAN_HEADLESS").as_deref() == Ok("1");
        let env_backend = std::env::var("MERIDIAN_BACKEND").ok();

        let role = Self::role_from(env_role.as_deref(), headless);
        let backend = Self::backend_from(config.backend_override, env_backend.as_deref());
        let caps = Self {
            role,
            backend,
            headless,
        };
        info!(%role, ?backend, headless, "node capabilities probed");
        caps
    }

    /// Fixed capabilities, for hosts that already know what they are.
    #[must_use]
    pub const fn with_role(role: NodeRole, backend: TransportBackend) -> Self {
        Self {
            role,
            backend,
            headless: matches!(role, NodeRole::DedicatedServer),
        }
    }

    /// True when this node owns the world and runs the full pipeline.
    #[must_use]
    pub const fn authoritative(&self) -> bool {
        matches!(self.role, NodeRole::DedicatedServer | NodeRole::ListenServer)
    }

    fn role_from(env_role: Option<&str>, headless: bool) -> NodeRole {
        match env_role {
            Some("server") => NodeRole::DedicatedServer,
            Some("listen") => NodeRole::ListenServer,
            Some("client") => NodeRole::Client,
            _ if headless => NodeRole::DedicatedServer,
            _ => NodeRole::Client,
        }
    }

    fn backend_from(choice: BackendChoice, env_backend: Option<&str>) -> TransportBackend {
        match choice {
            BackendChoice::Direct => TransportBackend::Direct,
            BackendChoice::Relay => TransportBackend::Relay,
            BackendChoice::Auto => match env_backend {
                Some("relay") => TransportBackend::Relay,
                _ => TransportBackend::Direct,
            },
        }
    }
}
