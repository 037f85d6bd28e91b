//! Connectors that turn calls into packets.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tideline_shared::{ObjectId, TickNumber};
use tideline_state::{BundleRegistry, DynStateBundle, ObjectStates, StateResult, StateWriter};

use super::message::{write_acknowledgement, write_confirmation, write_extra_states, write_object_states};
use crate::connector::{DownlinkConnector, UplinkConnector};

/// Downlink that encodes every call into one packet for `sink`.
pub struct PacketBuilder<F> {
    bundles: Arc<BundleRegistry>,
    sink: F,
    buffer: Mutex<StateWriter>,
}

impl<F: Fn(&[u8])> PacketBuilder<F> {
    /// Builder resolving extra bundle kinds through `bundles`.
    pub fn new(bundles: Arc<BundleRegistry>, sink: F) -> Self {
        Self {
            bundles,
            sink,
            buffer: Mutex::new(StateWriter::with_capacity(256)),
        }
    }

    fn emit(&self, write: impl FnOnce(&mut StateWriter)) {
        let mut buffer = self.buffer.lock();
        buffer.clear();
        write(&mut *buffer);
        (self.sink)(buffer.as_slice());
    }
}

impl<F: Fn(&[u8])> DownlinkConnector for PacketBuilder<F> {
    fn object_states_changed(&self, tick: TickNumber, id: ObjectId, states: &ObjectStates) {
        self.emit(|writer| write_object_states(writer, tick, id, states));
    }

    fn object_extra_states_changed(&self, tick: TickNumber, id: ObjectId, states: &dyn DynStateBundle) {
        // Timelines check every kind up front, so this only trips on direct calls.
        match self.bundles.kind_of(states) {
            Ok(kind) => self.emit(|writer| write_extra_states(writer, tick, id, kind, states)),
            Err(error) => tracing::error!(tick, %id, %error, "unregistered extra states not sent"),
        }
    }

    fn check_extra_states(&self, states: &dyn DynStateBundle) -> StateResult<()> {
        self.bundles.kind_of(states).map(|_| ())
    }

    fn confirm_snapshot(
        &self,
        tick: TickNumber,
        realtime: f64,
        discrete_change_count: u32,
        reference_tick: TickNumber,
    ) {
        self.emit(|writer| write_confirmation(writer, tick, realtime, discrete_change_count, reference_tick));
    }
}

impl<F> fmt::Debug for PacketBuilder<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketBuilder").field("bundles", &self.bundles).finish_non_exhaustive()
    }
}

/// Uplink that encodes acknowledgements for `sink`.
pub struct AckPacketBuilder<F> {
    sink: F,
}

impl<F: Fn(&[u8]) + Send + Sync> AckPacketBuilder<F> {
    /// Wraps `sink`.
    pub const fn new(sink: F) -> Self {
        Self { sink }
    }
}

impl<F: Fn(&[u8]) + Send + Sync> UplinkConnector for AckPacketBuilder<F> {
    fn acknowledge_snapshot(&self, tick: TickNumber) {
        let mut writer = StateWriter::with_capacity(super::MESSAGE_HEADER_SIZE);
        write_acknowledgement(&mut writer, tick);
        (self.sink)(writer.as_slice());
    }
}

impl<F> fmt::Debug for AckPacketBuilder<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckPacketBuilder").finish_non_exhaustive()
    }
}
