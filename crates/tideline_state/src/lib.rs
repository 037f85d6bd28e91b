//! # Tideline State
//!
//! Versioned values and the bundles built from them.
//!
//! ## Layers
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │ ObjectRecord   ObjectStates + optional extra bundle    │
//! ├───────────────────────────────────────────────────────┤
//! │ StateBundle    state_bundle! schemas, DynStateBundle   │
//! ├───────────────────────────────────────────────────────┤
//! │ State<T>       value + flags + revision                │
//! ├───────────────────────────────────────────────────────┤
//! │ codec          presence mask + little-endian values    │
//! └───────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod bundle;
pub mod codec;
pub mod dynamic;
pub mod error;
pub mod flags;
pub mod object_states;
pub mod record;
pub mod registry;
pub mod value;

pub use bundle::StateBundle;
pub use codec::{PresenceMask, SerializationPurpose, StateReader, StateWriter};
pub use dynamic::DynStateBundle;
pub use error::{CodecError, StateError, StateResult};
pub use flags::StateFlags;
pub use object_states::ObjectStates;
pub use record::ObjectRecord;
pub use registry::{BundleKind, BundleRegistry};
pub use value::{State, StateValue};

pub use tideline_shared::{Quaternion, Vec3};
