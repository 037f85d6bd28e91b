//! # Connectors
//!
//! Capabilities through which timelines talk to each other.
//!
//! ```text
//!   SERVER                                    CLIENT
//!   Timeline ──DownlinkConnector──────────────▶ Timeline (incoming_*)
//!            ◀──────────────UplinkConnector─── acknowledge_snapshot
//! ```
//!
//! A connector may be a direct call into the remote timeline (local games),
//! a [`PacketBuilder`](crate::protocol::PacketBuilder) feeding a transport, or
//! a queue.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender, TryIter};
use parking_lot::Mutex;
use tideline_shared::{ObjectId, TickNumber};
use tideline_state::{DynStateBundle, ObjectStates, StateResult};

use crate::error::{TimelineError, TimelineResult};
use crate::timeline::Timeline;

/// Sender to receiver messages of one tick.
pub trait DownlinkConnector {
    /// Basic state changes of one object.
    fn object_states_changed(&self, tick: TickNumber, id: ObjectId, states: &ObjectStates);

    /// Extra state changes of one object.
    fn object_extra_states_changed(&self, tick: TickNumber, id: ObjectId, states: &dyn DynStateBundle);

    /// Checks that an extra bundle can be carried at all.
    ///
    /// Called for every extra bundle of a tick before any message of that
    /// tick is emitted.
    ///
    /// # Errors
    ///
    /// Fails if the connector cannot encode the bundle's schema.
    fn check_extra_states(&self, _states: &dyn DynStateBundle) -> StateResult<()> {
        Ok(())
    }

    /// Closes the tick.
    fn confirm_snapshot(
        &self,
        tick: TickNumber,
        realtime: f64,
        discrete_change_count: u32,
        reference_tick: TickNumber,
    );
}

/// Receiver to sender messages.
pub trait UplinkConnector: Send + Sync {
    /// The receiver committed `tick`.
    fn acknowledge_snapshot(&self, tick: TickNumber);
}

/// Uplink that queues acknowledgements for the simulation thread to drain.
#[derive(Debug, Clone)]
pub struct QueuedUplinkConnector {
    tx: Sender<TickNumber>,
    rx: Receiver<TickNumber>,
}

impl QueuedUplinkConnector {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Drains the queued acknowledgements.
    pub fn drain(&self) -> TryIter<'_, TickNumber> {
        self.rx.try_iter()
    }

    /// Number of queued acknowledgements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for QueuedUplinkConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl UplinkConnector for QueuedUplinkConnector {
    fn acknowledge_snapshot(&self, tick: TickNumber) {
        // Both ends live in `self`, so the channel cannot be disconnected.
        let _ = self.tx.send(tick);
    }
}

/// Downlink that feeds a receiving timeline in-process.
///
/// Errors that require a resync are logged by the timeline; the last one is
/// kept for the owner to act on.
#[derive(Debug)]
pub struct LocalDownlink {
    timeline: Arc<Timeline>,
    last_error: Mutex<Option<TimelineError>>,
}

impl LocalDownlink {
    /// Wraps a receiving timeline.
    #[must_use]
    pub fn new(timeline: Arc<Timeline>) -> Self {
        Self {
            timeline,
            last_error: Mutex::new(None),
        }
    }

    /// Takes the last error the receiving timeline reported.
    pub fn take_error(&self) -> Option<TimelineError> {
        self.last_error.lock().take()
    }

    fn record(&self, result: TimelineResult<()>) {
        if let Err(error) = result {
            *self.last_error.lock() = Some(error);
        }
    }
}

impl DownlinkConnector for LocalDownlink {
    fn object_states_changed(&self, tick: TickNumber, id: ObjectId, states: &ObjectStates) {
        self.record(self.timeline.incoming_object_states_changed(tick, id, states));
    }

    fn object_extra_states_changed(&self, tick: TickNumber, id: ObjectId, states: &dyn DynStateBundle) {
        self.record(self.timeline.incoming_object_extra_states_changed(tick, id, states));
    }

    fn confirm_snapshot(
        &self,
        tick: TickNumber,
        realtime: f64,
        discrete_change_count: u32,
        reference_tick: TickNumber,
    ) {
        self.record(
            self.timeline
                .confirm_incoming_snapshot(tick, realtime, discrete_change_count, reference_tick),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tideline_shared::Vec3;

    #[test]
    fn test_queued_uplink_drains_in_order() {
        let uplink = QueuedUplinkConnector::new();
        uplink.acknowledge_snapshot(3);
        uplink.acknowledge_snapshot(5);
        assert_eq!(uplink.len(), 2);

        let acks: Vec<_> = uplink.drain().collect();
        assert_eq!(acks, vec![3, 5]);
        assert!(uplink.is_empty());
    }

    #[test]
    fn test_queued_uplink_clones_share_queue() {
        let uplink = QueuedUplinkConnector::new();
        let handle = uplink.clone();
        std::thread::spawn(move || handle.acknowledge_snapshot(9))
            .join()
            .unwrap();
        assert_eq!(uplink.drain().max(), Some(9));
    }

    #[test]
    fn test_local_downlink_keeps_last_error() {
        let downlink = LocalDownlink::new(Arc::new(Timeline::new()));
        downlink.confirm_snapshot(1, 0.0, 0, 0);
        downlink.object_states_changed(1, ObjectId(1), &ObjectStates::spawned(Vec3::ZERO));
        assert!(downlink.take_error().is_none());

        // The committed tick confirmed differently.
        downlink.confirm_snapshot(1, 0.0, 5, 0);
        assert!(downlink.take_error().unwrap().requires_resync());
        assert!(downlink.take_error().is_none());
    }
}
