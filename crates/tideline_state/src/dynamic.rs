//! Runtime-typed bundles.
//!
//! Objects can carry one bundle of a class-specific schema next to their
//! [`ObjectStates`](crate::ObjectStates). Its concrete type is only known at
//! runtime, so the timeline handles it through [`DynStateBundle`]. Combining
//! two different schemas is reported as [`StateError::SchemaMismatch`].

use std::any::Any;
use std::fmt;

use crate::bundle::StateBundle;
use crate::codec::{SerializationPurpose, StateReader, StateWriter};
use crate::error::{StateError, StateResult};

/// Object-safe view of a [`StateBundle`].
///
/// Implemented for every `StateBundle`; there is no need to implement it by
/// hand.
pub trait DynStateBundle: Any + Send + Sync + fmt::Debug {
    /// Schema name of the concrete bundle.
    fn bundle_name(&self) -> &'static str;

    /// Upcast for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// See [`StateBundle::count_states_with_value`].
    fn dyn_count_states_with_value(&self) -> usize;

    /// See [`StateBundle::clear`].
    fn dyn_clear(&mut self);

    /// Overwrites `self` with a copy of `other`.
    ///
    /// # Errors
    ///
    /// Fails if `other` has a different schema.
    fn dyn_assign(&mut self, other: &dyn DynStateBundle) -> StateResult<()>;

    /// `merge(self, rhs)`.
    ///
    /// # Errors
    ///
    /// Fails if `rhs` has a different schema.
    fn dyn_merge(&self, rhs: &dyn DynStateBundle) -> StateResult<Box<dyn DynStateBundle>>;

    /// `lerp(self, rhs, delta)`.
    ///
    /// # Errors
    ///
    /// Fails if `rhs` has a different schema.
    fn dyn_lerp(&self, rhs: &dyn DynStateBundle, delta: f32) -> StateResult<Box<dyn DynStateBundle>>;

    /// `delta_encode(self, to_encode)`, with `self` as the reference.
    ///
    /// # Errors
    ///
    /// Fails if `to_encode` has a different schema.
    fn dyn_delta_encode(&self, to_encode: &dyn DynStateBundle) -> StateResult<Box<dyn DynStateBundle>>;

    /// See [`StateBundle::filtered`].
    fn dyn_filtered(&self, purpose: SerializationPurpose) -> Box<dyn DynStateBundle>;

    /// Structural equality; different schemas are never equal.
    fn dyn_eq(&self, other: &dyn DynStateBundle) -> bool;

    /// See [`StateBundle::serialize`].
    fn dyn_serialize(&self, writer: &mut StateWriter, purpose: SerializationPurpose);

    /// Replaces `self` with a bundle read from `reader`.
    ///
    /// # Errors
    ///
    /// Fails on truncated or malformed input.
    fn dyn_deserialize(&mut self, reader: &mut StateReader<'_>, purpose: SerializationPurpose) -> StateResult<()>;

    /// Boxed copy.
    fn clone_box(&self) -> Box<dyn DynStateBundle>;
}

fn same_schema<'a, B: StateBundle>(other: &'a dyn DynStateBundle) -> StateResult<&'a B> {
    other
        .as_any()
        .downcast_ref::<B>()
        .ok_or(StateError::SchemaMismatch {
            expected: B::NAME,
            found: other.bundle_name(),
        })
}

impl<B: StateBundle> DynStateBundle for B {
    fn bundle_name(&self) -> &'static str {
        B::NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn dyn_count_states_with_value(&self) -> usize {
        StateBundle::count_states_with_value(self)
    }

    fn dyn_clear(&mut self) {
        StateBundle::clear(self);
    }

    fn dyn_assign(&mut self, other: &dyn DynStateBundle) -> StateResult<()> {
        self.clone_from(same_schema::<B>(other)?);
        Ok(())
    }

    fn dyn_merge(&self, rhs: &dyn DynStateBundle) -> StateResult<Box<dyn DynStateBundle>> {
        Ok(Box::new(B::merge(self, same_schema::<B>(rhs)?)))
    }

    fn dyn_lerp(&self, rhs: &dyn DynStateBundle, delta: f32) -> StateResult<Box<dyn DynStateBundle>> {
        Ok(Box::new(B::lerp(self, same_schema::<B>(rhs)?, delta)))
    }

    fn dyn_delta_encode(&self, to_encode: &dyn DynStateBundle) -> StateResult<Box<dyn DynStateBundle>> {
        Ok(Box::new(B::delta_encode(self, same_schema::<B>(to_encode)?)))
    }

    fn dyn_filtered(&self, purpose: SerializationPurpose) -> Box<dyn DynStateBundle> {
        Box::new(B::filtered(self, purpose))
    }

    fn dyn_eq(&self, other: &dyn DynStateBundle) -> bool {
        same_schema::<B>(other).is_ok_and(|other| self == other)
    }

    fn dyn_serialize(&self, writer: &mut StateWriter, purpose: SerializationPurpose) {
        StateBundle::serialize(self, writer, purpose);
    }

    fn dyn_deserialize(&mut self, reader: &mut StateReader<'_>, purpose: SerializationPurpose) -> StateResult<()> {
        *self = B::deserialize(reader, purpose)?;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn DynStateBundle> {
        Box::new(self.clone())
    }
}

impl dyn DynStateBundle {
    /// Returns the concrete bundle if it is a `B`.
    #[must_use]
    pub fn downcast_ref<B: StateBundle>(&self) -> Option<&B> {
        self.as_any().downcast_ref()
    }

    /// Returns the concrete bundle mutably if it is a `B`.
    #[must_use]
    pub fn downcast_mut<B: StateBundle>(&mut self) -> Option<&mut B> {
        self.as_any_mut().downcast_mut()
    }
}

impl Clone for Box<dyn DynStateBundle> {
    fn clone(&self) -> Self {
        (**self).clone_box()
    }
}

impl PartialEq for dyn DynStateBundle {
    fn eq(&self, other: &Self) -> bool {
        self.dyn_eq(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ObjectStates;

    crate::state_bundle! {
        struct Lamp {
            brightness: f32,
        }
    }

    fn lamp(brightness: f32) -> Box<dyn DynStateBundle> {
        let mut lamp = Lamp::default();
        lamp.brightness.assign(brightness);
        Box::new(lamp)
    }

    #[test]
    fn test_dyn_merge() {
        let merged = lamp(1.0).dyn_merge(lamp(2.0).as_ref()).unwrap();
        assert_eq!(merged.downcast_ref::<Lamp>().unwrap().brightness.get(), 2.0);
    }

    #[test]
    fn test_schema_mismatch() {
        let other: Box<dyn DynStateBundle> = Box::new(ObjectStates::default());
        let err = lamp(1.0).dyn_merge(other.as_ref()).unwrap_err();
        assert_eq!(
            err,
            StateError::SchemaMismatch {
                expected: "Lamp",
                found: "ObjectStates"
            }
        );
        assert!(!lamp(1.0).dyn_eq(other.as_ref()));
    }

    #[test]
    fn test_clone_box_and_eq() {
        let original = lamp(3.0);
        let copy = original.clone();
        assert!(*original == *copy);
        assert!(*original != *lamp(4.0));
    }

    #[test]
    fn test_dyn_assign_and_clear() {
        let mut target = lamp(1.0);
        target.dyn_assign(lamp(5.0).as_ref()).unwrap();
        assert_eq!(target.downcast_ref::<Lamp>().unwrap().brightness.get(), 5.0);
        target.dyn_clear();
        assert_eq!(target.dyn_count_states_with_value(), 0);
    }

    #[test]
    fn test_dyn_serialize_roundtrip() {
        let mut writer = StateWriter::new();
        lamp(0.5).dyn_serialize(&mut writer, SerializationPurpose::Network);

        let mut decoded: Box<dyn DynStateBundle> = Box::new(Lamp::default());
        let mut reader = StateReader::new(writer.as_slice());
        decoded.dyn_deserialize(&mut reader, SerializationPurpose::Network).unwrap();
        assert!(*decoded == *lamp(0.5));
    }
}
