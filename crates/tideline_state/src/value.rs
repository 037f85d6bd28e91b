//! # Versioned Values
//!
//! [`State<T>`] is the smallest unit of synchronized data: an optional value,
//! a flag set and a revision counter.
//!
//! ```text
//!   State<Vec3>
//!   ┌──────────────┬────────────────────────────┬──────────┐
//!   │ value: Vec3  │ flags: SAVED|NETWORKED|... │ rev: u16 │
//!   └──────────────┴────────────────────────────┴──────────┘
//!        ▲                   ▲                        ▲
//!     assign()          HAS_VALUE/JUMP           +1 per assign
//! ```
//!
//! Two states are equal only if both carry a value and the values match.
//! An absent value is never equal to anything, not even another absent one.

use tideline_shared::{Quaternion, Vec3};

use crate::codec::{SerializationPurpose, StateReader, StateWriter};
use crate::error::CodecError;
use crate::flags::StateFlags;

/// A type that can live inside a [`State`].
///
/// Implementors define their wire encoding and, optionally, how they blend
/// between two snapshots. The default blend steps to `rhs` once
/// `delta >= 1`.
pub trait StateValue: Copy + Default + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    /// Blends from `lhs` (delta 0) to `rhs` (delta 1).
    #[must_use]
    fn interpolate(lhs: Self, rhs: Self, delta: f32) -> Self {
        if delta < 1.0 {
            lhs
        } else {
            rhs
        }
    }

    /// Appends the value's wire form.
    fn encode(&self, writer: &mut StateWriter);

    /// Reads a value written by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Fails on truncated or malformed input.
    fn decode(reader: &mut StateReader<'_>) -> Result<Self, CodecError>;
}

impl StateValue for bool {
    fn encode(&self, writer: &mut StateWriter) {
        writer.write_u8(u8::from(*self));
    }

    fn decode(reader: &mut StateReader<'_>) -> Result<Self, CodecError> {
        match reader.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidBool(other)),
        }
    }
}

macro_rules! impl_integer_state_value {
    ($($ty:ty => $write:ident, $read:ident);+ $(;)?) => {
        $(
            impl StateValue for $ty {
                fn encode(&self, writer: &mut StateWriter) {
                    writer.$write(*self);
                }

                fn decode(reader: &mut StateReader<'_>) -> Result<Self, CodecError> {
                    reader.$read()
                }
            }
        )+
    };
}

impl_integer_state_value! {
    u8 => write_u8, read_u8;
    u16 => write_u16, read_u16;
    u32 => write_u32, read_u32;
}

impl StateValue for i32 {
    fn encode(&self, writer: &mut StateWriter) {
        writer.write_bytes(&self.to_le_bytes());
    }

    fn decode(reader: &mut StateReader<'_>) -> Result<Self, CodecError> {
        reader.read_u32().map(|bits| Self::from_le_bytes(bits.to_le_bytes()))
    }
}

impl StateValue for f32 {
    fn interpolate(lhs: Self, rhs: Self, delta: f32) -> Self {
        lhs * (1.0 - delta) + rhs * delta
    }

    fn encode(&self, writer: &mut StateWriter) {
        writer.write_f32(*self);
    }

    fn decode(reader: &mut StateReader<'_>) -> Result<Self, CodecError> {
        reader.read_f32()
    }
}

impl StateValue for Vec3 {
    fn interpolate(lhs: Self, rhs: Self, delta: f32) -> Self {
        lhs.lerp(rhs, delta)
    }

    fn encode(&self, writer: &mut StateWriter) {
        writer.write_pod(self);
    }

    fn decode(reader: &mut StateReader<'_>) -> Result<Self, CodecError> {
        reader.read_pod()
    }
}

impl StateValue for Quaternion {
    fn interpolate(lhs: Self, rhs: Self, delta: f32) -> Self {
        lhs.slerp(rhs, delta)
    }

    fn encode(&self, writer: &mut StateWriter) {
        writer.write_pod(self);
    }

    fn decode(reader: &mut StateReader<'_>) -> Result<Self, CodecError> {
        reader.read_pod()
    }
}

/// An optional, flagged, revision-counted value.
#[derive(Clone, Copy, Debug)]
pub struct State<T: StateValue> {
    value: T,
    flags: StateFlags,
    revision: u16,
}

impl<T: StateValue> State<T> {
    /// Empty state with [`StateFlags::DEFAULT`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_flags(StateFlags::DEFAULT)
    }

    /// Empty state with the given schema flags.
    ///
    /// Runtime flags in `flags` are ignored.
    #[must_use]
    pub fn with_flags(flags: StateFlags) -> Self {
        Self {
            value: T::default(),
            flags: flags.schema(),
            revision: 0,
        }
    }

    /// State holding `value` with default flags and revision 0.
    #[must_use]
    pub fn from_value(value: T) -> Self {
        Self {
            value,
            flags: StateFlags::DEFAULT | StateFlags::HAS_VALUE,
            revision: 0,
        }
    }

    /// Returns true if a value is present.
    #[inline]
    #[must_use]
    pub const fn has_value(&self) -> bool {
        self.flags.contains(StateFlags::HAS_VALUE)
    }

    /// The value, or `T::default()` when none is present.
    ///
    /// Use [`try_get`](Self::try_get) where absence matters.
    #[inline]
    #[must_use]
    pub fn get(&self) -> T {
        if self.has_value() {
            self.value
        } else {
            T::default()
        }
    }

    /// The value if one is present.
    #[inline]
    #[must_use]
    pub fn try_get(&self) -> Option<T> {
        self.has_value().then_some(self.value)
    }

    /// Stores `value` and bumps the revision.
    pub fn assign(&mut self, value: T) {
        self.value = value;
        self.flags |= StateFlags::HAS_VALUE;
        self.revision = self.revision.wrapping_add(1);
    }

    /// Drops the value together with its jump marker. The revision is kept.
    pub fn clear_value(&mut self) {
        self.value = T::default();
        self.flags = self.flags.difference(StateFlags::RUNTIME);
    }

    /// Number of assignments so far, wrapping at `u16::MAX`.
    #[inline]
    #[must_use]
    pub const fn revision(&self) -> u16 {
        self.revision
    }

    /// Full flag set, runtime flags included.
    #[inline]
    #[must_use]
    pub const fn flags(&self) -> StateFlags {
        self.flags
    }

    /// True if the last change was a discontinuity.
    #[inline]
    #[must_use]
    pub const fn is_jump(&self) -> bool {
        self.flags.contains(StateFlags::JUMP)
    }

    /// Marks or unmarks the current value as a discontinuity.
    pub fn set_jump(&mut self, jump: bool) {
        self.flags.set(StateFlags::JUMP, jump);
    }

    /// True if the value is driven by local prediction.
    #[inline]
    #[must_use]
    pub const fn is_predicted(&self) -> bool {
        self.flags.contains(StateFlags::PREDICTED)
    }

    /// Hands the value to (or takes it from) local prediction.
    pub fn set_predicted(&mut self, predicted: bool) {
        self.flags.set(StateFlags::PREDICTED, predicted);
    }

    /// True if the value takes part in network snapshots.
    #[inline]
    #[must_use]
    pub const fn is_networked(&self) -> bool {
        self.flags.contains(StateFlags::NETWORKED)
    }

    /// Includes or excludes the value from network snapshots.
    pub fn set_networked(&mut self, networked: bool) {
        self.flags.set(StateFlags::NETWORKED, networked);
    }

    /// True if the value takes part in savegames.
    #[inline]
    #[must_use]
    pub const fn is_saved(&self) -> bool {
        self.flags.contains(StateFlags::SAVED)
    }

    /// Includes or excludes the value from savegames.
    pub fn set_saved(&mut self, saved: bool) {
        self.flags.set(StateFlags::SAVED, saved);
    }

    /// True if the value is interpolated between snapshots.
    #[inline]
    #[must_use]
    pub const fn is_lerped(&self) -> bool {
        self.flags.contains(StateFlags::LERPED)
    }

    /// True if the flags allow serializing for `purpose`, regardless of value.
    #[must_use]
    pub const fn eligible_for(&self, purpose: SerializationPurpose) -> bool {
        match purpose {
            SerializationPurpose::Network => self.is_networked(),
            SerializationPurpose::Savegame => self.is_saved(),
        }
    }

    /// True if the state is written when serializing for `purpose`.
    #[must_use]
    pub const fn is_included(&self, purpose: SerializationPurpose) -> bool {
        self.has_value() && self.eligible_for(purpose)
    }

    /// Structural equality: both absent, or both present with equal values.
    ///
    /// Bundles compare field by field with this, so a bundle equals itself
    /// even when some fields are empty.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self.try_get(), other.try_get()) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            (None, None) => true,
            _ => false,
        }
    }

    /// `rhs` if it carries a value, otherwise `lhs`.
    #[must_use]
    pub fn merged(lhs: &Self, rhs: &Self) -> Self {
        if rhs.has_value() {
            *rhs
        } else {
            *lhs
        }
    }

    /// Blend of `lhs` and `rhs` at `delta`.
    ///
    /// Only `LERPED` fields with both values present, where `rhs` is not a
    /// jump, are blended. Everything else resolves like [`merged`](Self::merged).
    #[must_use]
    pub fn lerped(lhs: &Self, rhs: &Self, delta: f32) -> Self {
        match (lhs.try_get(), rhs.try_get()) {
            (Some(from), Some(to)) if lhs.is_lerped() && !rhs.is_jump() => {
                let mut blended = Self::with_flags(lhs.flags);
                blended.assign(T::interpolate(from, to, delta));
                blended
            }
            _ => Self::merged(lhs, rhs),
        }
    }

    /// `self` with its value dropped unless the flags allow `purpose`.
    #[must_use]
    pub fn filtered(&self, purpose: SerializationPurpose) -> Self {
        if self.eligible_for(purpose) {
            *self
        } else {
            Self::with_flags(self.flags)
        }
    }

    /// `to_encode` with its value dropped when `reference` already carries it.
    #[must_use]
    pub fn delta_encoded(reference: &Self, to_encode: &Self) -> Self {
        if *reference == *to_encode {
            Self::with_flags(to_encode.flags)
        } else {
            *to_encode
        }
    }

    /// Appends the value's wire form.
    pub fn encode_value(&self, writer: &mut StateWriter) {
        self.value.encode(writer);
    }

    /// Reads a value from the wire and assigns it if the flags allow
    /// `purpose`.
    ///
    /// A value the schema would never have written is consumed, logged and
    /// ignored.
    ///
    /// # Errors
    ///
    /// Fails on truncated or malformed input.
    pub fn decode_value(
        &mut self,
        reader: &mut StateReader<'_>,
        purpose: SerializationPurpose,
        bundle: &'static str,
        field: &'static str,
    ) -> Result<(), CodecError> {
        let value = T::decode(reader)?;
        if self.eligible_for(purpose) {
            self.assign(value);
        } else {
            tracing::warn!(bundle, field, ?purpose, "ignoring state the schema does not include");
        }
        Ok(())
    }
}

impl<T: StateValue> Default for State<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: StateValue> PartialEq for State<T> {
    fn eq(&self, other: &Self) -> bool {
        self.has_value() && other.has_value() && self.value == other.value
    }
}

impl<T: StateValue> From<T> for State<T> {
    fn from(value: T) -> Self {
        Self::from_value(value)
    }
}
