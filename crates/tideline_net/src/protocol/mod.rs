//! # Wire Protocol
//!
//! One message per packet, little endian.
//!
//! ```text
//! ┌─────────┬──────────┬───────────────────────────────────────────────┐
//! │ type u8 │ tick u32 │ payload                                       │
//! ├─────────┴──────────┼───────────────────────────────────────────────┤
//! │ 0 ObjectStates     │ object u32, bundle                            │
//! │ 1 ExtraStates      │ object u32, kind u16, bundle                  │
//! │ 2 ConfirmSnapshot  │ realtime f64, change count u32, reference u32 │
//! │ 3 AcknowledgeSnap. │ -                                             │
//! └────────────────────┴───────────────────────────────────────────────┘
//!   bundle = presence mask, then the values of the present fields
//! ```
//!
//! Delivery guarantees belong to the transport below. Messages of one tick
//! may arrive in any order; the receiving timeline sorts them out.

mod builder;
mod message;

pub use builder::{AckPacketBuilder, PacketBuilder};
pub use message::{decode_message, encode_message, Message, MessageType, MESSAGE_HEADER_SIZE};

use crate::connector::UplinkConnector;
use crate::error::{ProtocolError, ProtocolResult};
use crate::timeline::Timeline;

/// Feeds a decoded sender message into a receiving timeline.
///
/// # Errors
///
/// [`ProtocolError::NotDownlink`] for acknowledgements, otherwise whatever
/// the timeline rejects. Check
/// [`requires_resync`](ProtocolError::requires_resync) on failure.
pub fn dispatch_downlink(message: &Message, timeline: &Timeline) -> ProtocolResult<()> {
    match message {
        Message::ObjectStates { tick, id, states } => timeline.incoming_object_states_changed(*tick, *id, states)?,
        Message::ExtraStates { tick, id, states, .. } => {
            timeline.incoming_object_extra_states_changed(*tick, *id, states.as_ref())?;
        }
        Message::ConfirmSnapshot {
            tick,
            realtime,
            discrete_change_count,
            reference_tick,
        } => timeline.confirm_incoming_snapshot(*tick, *realtime, *discrete_change_count, *reference_tick)?,
        Message::AcknowledgeSnapshot { .. } => return Err(ProtocolError::NotDownlink),
    }
    Ok(())
}

/// Forwards a decoded acknowledgement to the sender side.
///
/// # Errors
///
/// [`ProtocolError::NotUplink`] for anything but an acknowledgement.
pub fn dispatch_uplink(message: &Message, uplink: &dyn UplinkConnector) -> ProtocolResult<()> {
    match message {
        Message::AcknowledgeSnapshot { tick } => {
            uplink.acknowledge_snapshot(*tick);
            Ok(())
        }
        _ => Err(ProtocolError::NotUplink),
    }
}
