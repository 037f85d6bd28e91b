//! Message types and their byte layout.

use tideline_shared::{ObjectId, TickNumber};
use tideline_state::{
    BundleKind, BundleRegistry, DynStateBundle, ObjectStates, SerializationPurpose, StateBundle, StateReader,
    StateWriter,
};

use crate::error::{ProtocolError, ProtocolResult};

/// Bytes before every payload: type and tick.
pub const MESSAGE_HEADER_SIZE: usize = 5;

/// First byte of every packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Sender -> receiver: basic states of one object.
    ObjectStates = 0,
    /// Sender -> receiver: extra states of one object.
    ExtraStates = 1,
    /// Sender -> receiver: closes a tick.
    ConfirmSnapshot = 2,
    /// Receiver -> sender: a tick was committed.
    AcknowledgeSnapshot = 3,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::ObjectStates),
            1 => Ok(Self::ExtraStates),
            2 => Ok(Self::ConfirmSnapshot),
            3 => Ok(Self::AcknowledgeSnapshot),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

/// One decoded message.
#[derive(Clone, Debug)]
pub enum Message {
    /// Basic state changes.
    ObjectStates {
        /// Tick the changes belong to.
        tick: TickNumber,
        /// Changed object.
        id: ObjectId,
        /// Changed values.
        states: ObjectStates,
    },
    /// Extra state changes.
    ExtraStates {
        /// Tick the changes belong to.
        tick: TickNumber,
        /// Changed object.
        id: ObjectId,
        /// Wire id of the bundle schema.
        kind: BundleKind,
        /// Changed values.
        states: Box<dyn DynStateBundle>,
    },
    /// End of a tick.
    ConfirmSnapshot {
        /// Closed tick.
        tick: TickNumber,
        /// Sender's realtime at commit.
        realtime: f64,
        /// Values the sender emitted for the tick.
        discrete_change_count: u32,
        /// Delta reference, or [`INVALID_TICK`](tideline_shared::INVALID_TICK).
        reference_tick: TickNumber,
    },
    /// Acknowledgement of a committed tick.
    AcknowledgeSnapshot {
        /// Committed tick.
        tick: TickNumber,
    },
}

impl Message {
    /// Type byte of this message.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::ObjectStates { .. } => MessageType::ObjectStates,
            Self::ExtraStates { .. } => MessageType::ExtraStates,
            Self::ConfirmSnapshot { .. } => MessageType::ConfirmSnapshot,
            Self::AcknowledgeSnapshot { .. } => MessageType::AcknowledgeSnapshot,
        }
    }

    /// Tick the message refers to.
    #[must_use]
    pub const fn tick(&self) -> TickNumber {
        match self {
            Self::ObjectStates { tick, .. }
            | Self::ExtraStates { tick, .. }
            | Self::ConfirmSnapshot { tick, .. }
            | Self::AcknowledgeSnapshot { tick } => *tick,
        }
    }
}

fn write_header(writer: &mut StateWriter, message_type: MessageType, tick: TickNumber) {
    writer.write_u8(message_type as u8);
    writer.write_u32(tick);
}

pub(crate) fn write_object_states(writer: &mut StateWriter, tick: TickNumber, id: ObjectId, states: &ObjectStates) {
    write_header(writer, MessageType::ObjectStates, tick);
    writer.write_u32(id.0);
    states.serialize(writer, SerializationPurpose::Network);
}

pub(crate) fn write_extra_states(
    writer: &mut StateWriter,
    tick: TickNumber,
    id: ObjectId,
    kind: BundleKind,
    states: &dyn DynStateBundle,
) {
    write_header(writer, MessageType::ExtraStates, tick);
    writer.write_u32(id.0);
    writer.write_u16(kind.0);
    states.dyn_serialize(writer, SerializationPurpose::Network);
}

pub(crate) fn write_confirmation(
    writer: &mut StateWriter,
    tick: TickNumber,
    realtime: f64,
    discrete_change_count: u32,
    reference_tick: TickNumber,
) {
    write_header(writer, MessageType::ConfirmSnapshot, tick);
    writer.write_f64(realtime);
    writer.write_u32(discrete_change_count);
    writer.write_u32(reference_tick);
}

pub(crate) fn write_acknowledgement(writer: &mut StateWriter, tick: TickNumber) {
    write_header(writer, MessageType::AcknowledgeSnapshot, tick);
}

/// Appends one packet for `message` to `writer`.
pub fn encode_message(message: &Message, writer: &mut StateWriter) {
    match message {
        Message::ObjectStates { tick, id, states } => write_object_states(writer, *tick, *id, states),
        Message::ExtraStates { tick, id, kind, states } => {
            write_extra_states(writer, *tick, *id, *kind, states.as_ref());
        }
        Message::ConfirmSnapshot {
            tick,
            realtime,
            discrete_change_count,
            reference_tick,
        } => write_confirmation(writer, *tick, *realtime, *discrete_change_count, *reference_tick),
        Message::AcknowledgeSnapshot { tick } => write_acknowledgement(writer, *tick),
    }
}

/// Parses one packet.
///
/// # Errors
///
/// Fails on an unknown type byte, an unregistered bundle kind, truncated
/// input or bytes left over after the message.
pub fn decode_message(bytes: &[u8], bundles: &BundleRegistry) -> ProtocolResult<Message> {
    let mut reader = StateReader::new(bytes);
    let message_type = MessageType::try_from(reader.read_u8()?)?;
    let tick = reader.read_u32()?;

    let message = match message_type {
        MessageType::ObjectStates => {
            let id = ObjectId(reader.read_u32()?);
            let states = ObjectStates::deserialize(&mut reader, SerializationPurpose::Network)?;
            Message::ObjectStates { tick, id, states }
        }
        MessageType::ExtraStates => {
            let id = ObjectId(reader.read_u32()?);
            let kind = BundleKind(reader.read_u16()?);
            let states = bundles.deserialize(kind, &mut reader, SerializationPurpose::Network)?;
            Message::ExtraStates { tick, id, kind, states }
        }
        MessageType::ConfirmSnapshot => Message::ConfirmSnapshot {
            tick,
            realtime: reader.read_f64()?,
            discrete_change_count: reader.read_u32()?,
            reference_tick: reader.read_u32()?,
        },
        MessageType::AcknowledgeSnapshot => Message::AcknowledgeSnapshot { tick },
    };

    match reader.remaining() {
        0 => Ok(message),
        trailing => Err(ProtocolError::TrailingBytes(trailing)),
    }
}
