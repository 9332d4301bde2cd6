//! # Transport Seam
//!
//! The replication layer never owns a socket. It hands ordered events
//! to a [`Transport`] and lets the host decide what carries them. The
//! in-memory [`ChannelTransport`] is the loopback used by tests, the
//! simulation harness and single-process hosts.

use crate::config::SyncConfig;
use crate::world::peer::NodeId;
use crossbeam_channel::{bounded, Receiver, Sender};
use meridian_shared::events::ReplicationEvent;
use tracing::{info, warn};

/// Outbound event sink the pipeline writes to.
pub trait Transport {
    /// Queues one event for a peer. Must not block the tick.
    fn transmit(&mut self, peer: NodeId, event: &ReplicationEvent);

    /// Marks the end of a peer's batch for this send tick.
    fn flush(&mut self, peer: NodeId);

    /// Applies the configured socket rate window.
    fn set_rate_limits(&mut self, min_bytes_per_sec: u32, max_bytes_per_sec: u32);
}

/// Pushes the configured rate window into a transport.
pub fn apply_rate_limits(transport: &mut dyn Transport, config: &SyncConfig) {
    let min = config.send_rate_min.bytes_per_sec();
    let max = config.send_rate_max.bytes_per_sec();
    transport.set_rate_limits(min, max);
    info!(min, max, "transport rate limits applied");
}

/// Bounded in-process transport over a crossbeam channel. A full
/// channel drops the event and counts it; the tick never blocks.
#[derive(Debug)]
pub struct ChannelTransport {
    sender: Sender<(NodeId, ReplicationEvent)>,
    dropped: u64,
    min_rate: u32,
    max_rate: u32,
}

impl ChannelTransport {
    /// Creates a transport and the receiving end of its channel.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<(NodeId, ReplicationEvent)>) {
        let (sender, receiver) = bounded(capacity);
        (
            Self {
                sender,
                dropped: 0,
                min_rate: 0,
                max_rate: 0,
            },
            receiver,
        )
    }

    /// Events dropped because the channel was full or closed.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// The rate window last applied.
    #[must_use]
    pub const fn rate_limits(&self) -> (u32, u32) {
        (self.min_rate, self.max_rate)
    }
}

impl Transport for ChannelTransport {
    fn transmit(&mut self, peer: NodeId, event: &ReplicationEvent) {
        if self.sender.try_send((peer, event.clone())).is_err() {
            if self.dropped == 0 {
                warn!(%peer, "transport channel full, dropping events");
            }
            self.dropped += 1;
        }
    }

    fn flush(&mut self, _peer: NodeId) {
        // Channel delivery is immediate, nothing buffers per peer
    }

    fn set_rate_limits(&mut self, min_bytes_per_sec: u32, max_bytes_per_sec: u32) {
        self.min_rate = min_bytes_per_sec;
        self.max_rate = max_bytes_per_sec;
    }
}

/// Transport that discards everything, for headless benches and
/// wiring tests that only watch the counters.
#[derive(Debug, Default)]
pub struct NullTransport {
    discarded: u64,
}

impl NullTransport {
    /// Creates the sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events discarded so far.
    #[must_use]
    pub const fn discarded(&self) -> u64 {
        self.discarded
    }
}

impl Transport for NullTransport {
    fn transmit(&mut self, _peer: NodeId, _event: &ReplicationEvent) {
        self.discarded += 1;
    }

    fn flush(&mut self, _peer: NodeId) {}

    fn set_rate_limits(&mut self, _min_bytes_per_sec: u32, _max_bytes_per_sec: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destroy_event(object_id: u64) -> ReplicationEvent {
        ReplicationEvent::ObjectDestroyed { object_id, tick: 1 }
    }

    #[test]
    fn test_channel_delivers_in_order() {
        let (mut transport, receiver) = ChannelTransport::bounded(8);
        let peer = NodeId(5);

        for id in 1..=3 {
            transport.transmit(peer, &destroy_event(id));
        }
        transport.flush(peer);

        let ids: Vec<u64> = receiver.try_iter().map(|(_, event)| event.object_id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(transport.dropped(), 0);
    }

    #[test]
    fn test_full_channel_drops_without_blocking() {
        let (mut transport, receiver) = ChannelTransport::bounded(1);
        let peer = NodeId(5);

        transport.transmit(peer, &destroy_event(1));
        transport.transmit(peer, &destroy_event(2));

        assert_eq!(transport.dropped(), 1);
        let ids: Vec<u64> = receiver.try_iter().map(|(_, event)| event.object_id()).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_rate_window_plumbing() {
        let (mut transport, _receiver) = ChannelTransport::bounded(1);
        apply_rate_limits(&mut transport, &SyncConfig::default());
        assert_eq!(transport.rate_limits(), (150 * 1024, 150 * 1024));
    }

    #[test]
    fn test_null_transport_counts() {
        let mut transport = NullTransport::new();
        transport.transmit(NodeId(1), &destroy_event(1));
        transport.transmit(NodeId(1), &destroy_event(2));
        assert_eq!(transport.discarded(), 2);
    }
}
