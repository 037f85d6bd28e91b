//! # State Bundles
//!
//! A bundle is a fixed, ordered set of named [`State`](crate::State) fields.
//! Every operation works field by field in declaration order:
//!
//! ```text
//!   merge(a, b)         field = b.field if present, else a.field
//!   lerp(a, b, t)       field = blend for LERPED fields, merge otherwise
//!   delta_encode(r, x)  field = x.field unless r.field holds the same value
//!   serialize           [presence mask][values of included fields]
//! ```
//!
//! Bundles are declared with [`state_bundle!`](crate::state_bundle), which
//! generates the struct and all of the above.

use std::fmt;

use crate::codec::{PresenceMask, SerializationPurpose, StateReader, StateWriter};
use crate::error::CodecError;

/// Schema-declared aggregate of versioned values.
pub trait StateBundle: Clone + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Schema name, used in logs and errors.
    const NAME: &'static str;

    /// Field names in declaration order.
    const FIELD_NAMES: &'static [&'static str];

    /// Number of fields in the schema.
    const FIELD_COUNT: usize = Self::FIELD_NAMES.len();

    /// Number of fields carrying a value.
    fn count_states_with_value(&self) -> usize;

    /// True if no field carries a value.
    fn is_empty(&self) -> bool {
        self.count_states_with_value() == 0
    }

    /// Resets every field to its declared, value-less state.
    fn clear(&mut self) {
        *self = Self::default();
    }

    /// Field-wise: `rhs` where it has a value, `lhs` elsewhere.
    #[must_use]
    fn merge(lhs: &Self, rhs: &Self) -> Self;

    /// Field-wise blend at `delta`.
    #[must_use]
    fn lerp(lhs: &Self, rhs: &Self, delta: f32) -> Self;

    /// `to_encode` without the values `reference` already holds.
    #[must_use]
    fn delta_encode(reference: &Self, to_encode: &Self) -> Self;

    /// Copy keeping only the values eligible for `purpose`.
    #[must_use]
    fn filtered(&self, purpose: SerializationPurpose) -> Self;

    /// Fields that would be written for `purpose`.
    fn presence(&self, purpose: SerializationPurpose) -> PresenceMask;

    /// Writes the presence mask followed by the included values.
    fn serialize(&self, writer: &mut StateWriter, purpose: SerializationPurpose);

    /// Reads a bundle written by [`serialize`](Self::serialize).
    ///
    /// # Errors
    ///
    /// Fails on truncated or malformed input.
    fn deserialize(reader: &mut StateReader<'_>, purpose: SerializationPurpose) -> Result<Self, CodecError>;
}

#[doc(hidden)]
#[macro_export]
macro_rules! __state_bundle_flags {
    () => {
        $crate::StateFlags::DEFAULT
    };
    ($flags:expr) => {
        $flags
    };
}

/// Declares a [`StateBundle`].
///
/// Each field is a [`State`](crate::State) of the given value type. Flags
/// follow `=>`; fields without them get [`StateFlags::DEFAULT`](crate::StateFlags::DEFAULT).
///
/// ```
/// use tideline_state::{state_bundle, StateBundle, StateFlags};
///
/// state_bundle! {
///     /// Door state.
///     pub struct DoorStates {
///         /// Opening angle.
///         pub angle: f32 => StateFlags::DEFAULT | StateFlags::LERPED,
///         /// Locked doors ignore players.
///         pub locked: bool,
///     }
/// }
///
/// let mut door = DoorStates::default();
/// door.angle.assign(90.0);
/// assert_eq!(door.count_states_with_value(), 1);
/// assert_eq!(DoorStates::FIELD_NAMES, &["angle", "locked"]);
/// ```
#[macro_export]
macro_rules! state_bundle {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty $(=> $flags:expr)?
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $crate::State<$ty>,
            )+
        }

        impl ::core::default::Default for $name {
            fn default() -> Self {
                Self {
                    $(
                        $field: $crate::State::with_flags($crate::__state_bundle_flags!($($flags)?)),
                    )+
                }
            }
        }

        impl ::core::cmp::PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                true $(&& self.$field.same_as(&other.$field))+
            }
        }

        const _: () = assert!(
            <$name as $crate::StateBundle>::FIELD_COUNT <= $crate::PresenceMask::MAX_FIELDS,
            "state bundles are limited to 64 fields",
        );

        impl $crate::StateBundle for $name {
            const NAME: &'static str = ::core::stringify!($name);
            const FIELD_NAMES: &'static [&'static str] = &[$(::core::stringify!($field)),+];

            fn count_states_with_value(&self) -> usize {
                0 $(+ usize::from(self.$field.has_value()))+
            }

            fn merge(lhs: &Self, rhs: &Self) -> Self {
                Self {
                    $($field: $crate::State::merged(&lhs.$field, &rhs.$field),)+
                }
            }

            fn lerp(lhs: &Self, rhs: &Self, delta: f32) -> Self {
                Self {
                    $($field: $crate::State::lerped(&lhs.$field, &rhs.$field, delta),)+
                }
            }

            fn delta_encode(reference: &Self, to_encode: &Self) -> Self {
                Self {
                    $($field: $crate::State::delta_encoded(&reference.$field, &to_encode.$field),)+
                }
            }

            fn filtered(&self, purpose: $crate::SerializationPurpose) -> Self {
                Self {
                    $($field: self.$field.filtered(purpose),)+
                }
            }

            #[allow(unused_assignments)]
            fn presence(&self, purpose: $crate::SerializationPurpose) -> $crate::PresenceMask {
                let mut mask = $crate::PresenceMask::EMPTY;
                let mut index = 0usize;
                $(
                    if self.$field.is_included(purpose) {
                        mask.insert(index);
                    }
                    index += 1;
                )+
                mask
            }

            fn serialize(&self, writer: &mut $crate::StateWriter, purpose: $crate::SerializationPurpose) {
                let mask = <Self as $crate::StateBundle>::presence(self, purpose);
                mask.write(writer, <Self as $crate::StateBundle>::FIELD_COUNT);
                $(
                    if self.$field.is_included(purpose) {
                        self.$field.encode_value(writer);
                    }
                )+
            }

            #[allow(unused_assignments)]
            fn deserialize(
                reader: &mut $crate::StateReader<'_>,
                purpose: $crate::SerializationPurpose,
            ) -> ::core::result::Result<Self, $crate::CodecError> {
                let mask = $crate::PresenceMask::read(reader, <Self as $crate::StateBundle>::FIELD_COUNT)?;
                let mut bundle = <Self as ::core::default::Default>::default();
                let mut index = 0usize;
                $(
                    if mask.contains(index) {
                        bundle.$field.decode_value(
                            reader,
                            purpose,
                            ::core::stringify!($name),
                            ::core::stringify!($field),
                        )?;
                    }
                    index += 1;
                )+
                Ok(bundle)
            }
        }
    };
}
