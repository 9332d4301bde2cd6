//! # Link Negotiation
//!
//! Explicit per-peer compression handshake. Each side announces its
//! protocol version, then whether it accepts compressed traffic, then
//! whether its own outbound is compressed. Nothing is assumed from
//! silence: a link compresses only after both announcements landed.
//!
//! Messages ride the ordered control channel, so `Version` is always
//! observed before `Enabled`, and `Enabled` before `Started`.

use crate::world::peer::NodeId;
use std::collections::HashMap;
use tracing::debug;

/// Protocol version this build negotiates with.
pub const NEGOTIATION_VERSION: u32 = 6;

/// Where a link stands in the negotiation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HandshakePhase {
    /// Nothing exchanged yet.
    #[default]
    Hello,
    /// We announced our version, theirs is pending.
    VersionExchanged,
    /// Versions match; compression may be enabled.
    Compatible,
    /// Versions differ; the link stays uncompressed forever.
    Incompatible,
}

/// Control messages exchanged during negotiation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeMsg {
    /// Announces the sender's protocol version.
    Version(u32),
    /// Announces whether the sender accepts compressed traffic.
    Enabled(bool),
    /// Announces whether the sender's outbound is now compressed.
    Started(bool),
}

/// Negotiation state for one peer link.
#[derive(Clone, Copy, Debug)]
pub struct PeerLink {
    phase: HandshakePhase,
    remote_version: u32,
    remote_enabled: bool,
    sending_compressed: bool,
    receiving_compressed: bool,
    local_enabled: bool,
}

impl PeerLink {
    /// Creates a fresh link under the given local policy.
    #[must_use]
    pub const fn new(local_enabled: bool) -> Self {
        Self {
            phase: HandshakePhase::Hello,
            remote_version: 0,
            remote_enabled: false,
            sending_compressed: false,
            receiving_compressed: false,
            local_enabled,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// Version the remote announced, zero before its `Version` landed.
    #[must_use]
    pub const fn remote_version(&self) -> u32 {
        self.remote_version
    }

    /// True when our outbound to this peer is compressed.
    #[must_use]
    pub const fn sending_compressed(&self) -> bool {
        self.sending_compressed
    }

    /// True when the peer declared its outbound compressed.
    #[must_use]
    pub const fn receiving_compressed(&self) -> bool {
        self.receiving_compressed
    }

    /// Opens the negotiation. Returns our version announcement.
    pub fn begin(&mut self) -> HandshakeMsg {
        if self.phase == HandshakePhase::Hello {
            self.phase = HandshakePhase::VersionExchanged;
        }
        HandshakeMsg::Version(NEGOTIATION_VERSION)
    }

    /// Handles the remote version announcement. Replies with our
    /// `Enabled` policy when the versions match.
    pub fn on_version(&mut self, version: u32) -> Option<HandshakeMsg> {
        self.remote_version = version;
        if version == NEGOTIATION_VERSION {
            self.phase = HandshakePhase::Compatible;
            Some(HandshakeMsg::Enabled(self.local_enabled))
        } else {
            self.phase = HandshakePhase::Incompatible;
            debug!(
                remote = version,
                local = NEGOTIATION_VERSION,
                "link stays uncompressed, version mismatch"
            );
            None
        }
    }

    /// Handles the remote acceptance announcement. Starts or stops our
    /// outbound compression and reports the change to the remote.
    pub fn on_enabled(&mut self, enabled: bool) -> Option<HandshakeMsg> {
        self.remote_enabled = enabled;
        self.refresh_sending()
    }

    /// Handles the remote outbound state announcement.
    pub fn on_started(&mut self, started: bool) {
        self.receiving_compressed = started;
    }

    /// Called when an inbound frame failed to decompress. The link
    /// falls back to treating inbound traffic as plain.
    pub fn on_decode_failure(&mut self) {
        if self.receiving_compressed {
            debug!("inbound decompression failed, falling back to plain frames");
        }
        self.receiving_compressed = false;
    }

    /// Applies a local policy change mid-session. Returns every
    /// message the remote must hear about it.
    pub fn set_local_enabled(&mut self, enabled: bool) -> Vec<HandshakeMsg> {
        self.local_enabled = enabled;
        let mut messages = Vec::new();
        if self.phase == HandshakePhase::Compatible {
            messages.push(HandshakeMsg::Enabled(enabled));
        }
        if let Some(started) = self.refresh_sending() {
            messages.push(started);
        }
        messages
    }

    fn refresh_sending(&mut self) -> Option<HandshakeMsg> {
        let want = self.phase == HandshakePhase::Compatible
            && self.local_enabled
            && self.remote_enabled;
        if want == self.sending_compressed {
            return None;
        }
        self.sending_compressed = want;
        Some(HandshakeMsg::Started(want))
    }
}

/// All peer links, keyed by node.
#[derive(Debug)]
pub struct HandshakeDirectory {
    links: HashMap<NodeId, PeerLink>,
    local_enabled: bool,
}

impl HandshakeDirectory {
    /// Creates an empty directory under the given local policy.
    #[must_use]
    pub fn new(local_enabled: bool) -> Self {
        Self {
            links: HashMap::new(),
            local_enabled,
        }
    }

    /// Opens a link for a newly connected peer and returns our
    /// version announcement for it.
    pub fn register(&mut self, peer: NodeId) -> HandshakeMsg {
        let link = self
            .links
            .entry(peer)
            .or_insert_with(|| PeerLink::new(self.local_enabled));
        link.begin()
    }

    /// Drops a peer's link.
    pub fn remove(&mut self, peer: NodeId) {
        self.links.remove(&peer);
    }

    /// Routes an inbound control message. Messages from unknown peers
    /// are dropped.
    pub fn on_message(&mut self, peer: NodeId, message: HandshakeMsg) -> Option<HandshakeMsg> {
        let Some(link) = self.links.get_mut(&peer) else {
            debug!(%peer, "control message from unknown peer dropped");
            return None;
        };
        match message {
            HandshakeMsg::Version(version) => link.on_version(version),
            HandshakeMsg::Enabled(enabled) => link.on_enabled(enabled),
            HandshakeMsg::Started(started) => {
                link.on_started(started);
                None
            }
        }
    }

    /// Records a decompression failure on a peer's link.
    pub fn on_decode_failure(&mut self, peer: NodeId) {
        if let Some(link) = self.links.get_mut(&peer) {
            link.on_decode_failure();
        }
    }

    /// Applies a local policy change to every link. Returns the
    /// messages each affected peer must receive, in link order.
    pub fn set_enabled(&mut self, enabled: bool) -> Vec<(NodeId, HandshakeMsg)> {
        self.local_enabled = enabled;
        let mut out = Vec::new();
        for (peer, link) in &mut self.links {
            for message in link.set_local_enabled(enabled) {
                out.push((*peer, message));
            }
        }
        out
    }

    /// Looks up a peer's link.
    #[must_use]
    pub fn link(&self, peer: NodeId) -> Option<&PeerLink> {
        self.links.get(&peer)
    }

    /// Number of open links.
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// True when no links are open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_negotiation_compresses_both_ways() {
        let mut ours = PeerLink::new(true);
        let mut theirs = PeerLink::new(true);

        let hello = ours.begin();
        assert_eq!(hello, HandshakeMsg::Version(NEGOTIATION_VERSION));

        // They hear our version and accept
        let reply = theirs.on_version(NEGOTIATION_VERSION).unwrap();
        assert_eq!(reply, HandshakeMsg::Enabled(true));
        assert_eq!(theirs.phase(), HandshakePhase::Compatible);

        // We hear their acceptance and start compressing
        assert!(ours.on_version(NEGOTIATION_VERSION).is_some());
        let started = ours.on_enabled(true).unwrap();
        assert_eq!(started, HandshakeMsg::Started(true));
        assert!(ours.sending_compressed());

        theirs.on_started(true);
        assert!(theirs.receiving_compressed());
    }

    #[test]
    fn test_version_mismatch_never_compresses() {
        let mut link = PeerLink::new(true);
        link.begin();

        assert!(link.on_version(5).is_none());
        assert_eq!(link.phase(), HandshakePhase::Incompatible);
        assert_eq!(link.remote_version(), 5);

        // Even an eager remote acceptance changes nothing
        assert!(link.on_enabled(true).is_none());
        assert!(!link.sending_compressed());
    }

    #[test]
    fn test_remote_refusal_keeps_plain_sends() {
        let mut link = PeerLink::new(true);
        link.begin();
        link.on_version(NEGOTIATION_VERSION);

        assert!(link.on_enabled(false).is_none());
        assert!(!link.sending_compressed());
    }

    #[test]
    fn test_local_policy_off_is_announced() {
        let mut link = PeerLink::new(false);
        link.begin();

        let reply = link.on_version(NEGOTIATION_VERSION).unwrap();
        assert_eq!(reply, HandshakeMsg::Enabled(false));

        // Remote accepts, but our policy keeps sends plain
        assert!(link.on_enabled(true).is_none());
        assert!(!link.sending_compressed());
    }

    #[test]
    fn test_decode_failure_falls_back_to_plain() {
        let mut link = PeerLink::new(true);
        link.begin();
        link.on_version(NEGOTIATION_VERSION);
        link.on_started(true);
        assert!(link.receiving_compressed());

        link.on_decode_failure();
        assert!(!link.receiving_compressed());
    }

    #[test]
    fn test_mid_session_policy_change() {
        let mut link = PeerLink::new(true);
        link.begin();
        link.on_version(NEGOTIATION_VERSION);
        link.on_enabled(true);
        assert!(link.sending_compressed());

        let messages = link.set_local_enabled(false);
        assert_eq!(
            messages,
            vec![HandshakeMsg::Enabled(false), HandshakeMsg::Started(false)]
        );
        assert!(!link.sending_compressed());
    }

    #[test]
    fn test_directory_routes_and_forgets() {
        let mut directory = HandshakeDirectory::new(true);
        let peer = NodeId(7);

        assert_eq!(
            directory.register(peer),
            HandshakeMsg::Version(NEGOTIATION_VERSION)
        );
        let reply = directory.on_message(peer, HandshakeMsg::Version(NEGOTIATION_VERSION));
        assert_eq!(reply, Some(HandshakeMsg::Enabled(true)));

        // Unknown peers are dropped silently
        assert_eq!(
            directory.on_message(NodeId(99), HandshakeMsg::Enabled(true)),
            None
        );

        directory.remove(peer);
        assert!(directory.is_empty());
        assert!(directory.link(peer).is_none());
    }
}
