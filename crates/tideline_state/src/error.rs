//! # State Error Types
//!
//! All errors that can occur while encoding, decoding or combining bundles.

use thiserror::Error;

/// Errors produced by [`StateReader`](crate::StateReader) while decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer ended before the value was complete.
    #[error("unexpected end of data: needed {needed} bytes at offset {offset}, {remaining} left")]
    UnexpectedEnd {
        /// Read position when the value started.
        offset: usize,
        /// Bytes the value needs.
        needed: usize,
        /// Bytes that were left.
        remaining: usize,
    },

    /// A boolean was encoded as something other than 0 or 1.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    /// The presence mask flags fields the schema does not have.
    #[error("presence mask {mask:#x} names fields beyond the schema's {field_count}")]
    MaskOverflow {
        /// The decoded mask.
        mask: u64,
        /// Field count of the schema it was decoded for.
        field_count: usize,
    },
}

/// Errors that can occur when combining or resolving state bundles.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Two different bundle schemas were combined.
    ///
    /// This is a programming error; no recovery is attempted.
    #[error("bundle schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch {
        /// Schema of the receiving side.
        expected: &'static str,
        /// Schema that was passed in.
        found: &'static str,
    },

    /// No bundle is registered under this wire kind.
    #[error("bundle kind {0} is not registered")]
    UnknownBundleKind(u16),

    /// The bundle's concrete type was never registered.
    #[error("bundle type {0} is not registered")]
    UnregisteredBundleType(&'static str),

    /// A kind or a type was registered twice.
    #[error("bundle kind {kind} is already registered for {existing}")]
    DuplicateRegistration {
        /// The contested kind.
        kind: u16,
        /// Name of the bundle already holding it.
        existing: &'static str,
    },

    /// Decoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Result type for bundle operations.
pub type StateResult<T> = Result<T, StateError>;
