//! # Error Types
//!
//! Errors for the timeline, the message codec, configuration and savegames.
//!
//! Errors for which [`TimelineError::requires_resync`] is true mean the
//! receiving timeline can no longer be reconstructed from what it has seen.
//! The connection owner is expected to `reset()` it and request a full
//! snapshot.

use std::path::PathBuf;

use thiserror::Error;
use tideline_shared::{ClientId, TickNumber};
use tideline_state::{CodecError, StateError};

/// Errors raised by [`Timeline`](crate::Timeline) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimelineError {
    /// The requested tick is not (or no longer) committed.
    #[error("snapshot {0} is not in the timeline")]
    SnapshotNotFound(TickNumber),

    /// A staged snapshot references a tick that has already been evicted.
    #[error("snapshot {tick} references snapshot {reference}, which is no longer retained")]
    ReferenceEvicted {
        /// Staged tick.
        tick: TickNumber,
        /// Missing reference.
        reference: TickNumber,
    },

    /// A committed tick was confirmed again with different data.
    #[error("snapshot {0} is already committed")]
    AlreadyCommitted(TickNumber),

    /// A lag-compensation rollback is in progress.
    #[error("a lag-compensation rollback is active")]
    RollbackActive,

    /// The server has no session for this client.
    #[error("{0} is not connected")]
    UnknownClient(ClientId),

    /// A tick carries more values than a confirmation can announce.
    #[error("{0} changed values do not fit in one confirmation")]
    TooManyChanges(usize),

    /// Combining records failed.
    #[error(transparent)]
    State(#[from] StateError),
}

impl TimelineError {
    /// True if the timeline must be reset and resynchronized.
    #[must_use]
    pub const fn requires_resync(&self) -> bool {
        matches!(self, Self::ReferenceEvicted { .. } | Self::AlreadyCommitted(_))
    }
}

/// Result type for timeline operations.
pub type TimelineResult<T> = Result<T, TimelineError>;

/// Errors raised while decoding or dispatching messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The type byte names no known message.
    #[error("unknown message type {0:#04x}")]
    UnknownMessageType(u8),

    /// Bytes were left over after the message.
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    /// An uplink message was handed to the downlink dispatcher.
    #[error("acknowledgements are not downlink messages")]
    NotDownlink,

    /// A downlink message was handed to the uplink dispatcher.
    #[error("only acknowledgements travel on the uplink")]
    NotUplink,

    /// Malformed payload.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Unknown bundle kind or schema error.
    #[error(transparent)]
    State(#[from] StateError),

    /// The receiving timeline rejected the message.
    #[error(transparent)]
    Timeline(#[from] TimelineError),
}

impl ProtocolError {
    /// True if the underlying timeline error requires a resync.
    #[must_use]
    pub const fn requires_resync(&self) -> bool {
        match self {
            Self::Timeline(error) => error.requires_resync(),
            _ => false,
        }
    }
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The TOML did not parse.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config value {field}: {reason}")]
    Invalid {
        /// Offending key.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Errors raised while writing or reading savegames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SavegameError {
    /// The data does not start with the savegame magic.
    #[error("not a savegame (magic {0:#010x})")]
    BadMagic(u32),

    /// There is nothing committed to save.
    #[error("timeline is empty")]
    EmptyTimeline,

    /// The savegame names a tick that cannot be committed.
    #[error("savegame tick {0} is invalid")]
    InvalidTick(TickNumber),

    /// More objects than the object count field can hold.
    #[error("{0} objects do not fit in one savegame")]
    TooManyObjects(usize),

    /// Bytes were left over after the last object.
    #[error("{0} trailing bytes after savegame")]
    TrailingBytes(usize),

    /// Malformed data.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Unknown extra bundle kind or schema error.
    #[error(transparent)]
    State(#[from] StateError),
}

/// Result type for savegame operations.
pub type SavegameResult<T> = Result<T, SavegameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resync_classification() {
        assert!(TimelineError::AlreadyCommitted(3).requires_resync());
        assert!(TimelineError::ReferenceEvicted { tick: 5, reference: 1 }.requires_resync());
        assert!(!TimelineError::SnapshotNotFound(3).requires_resync());
        assert!(!TimelineError::RollbackActive.requires_resync());
        assert!(!TimelineError::TooManyChanges(0).requires_resync());

        let wrapped = ProtocolError::from(TimelineError::AlreadyCommitted(3));
        assert!(wrapped.requires_resync());
        assert!(!ProtocolError::NotDownlink.requires_resync());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            TimelineError::ReferenceEvicted { tick: 9, reference: 2 }.to_string(),
            "snapshot 9 references snapshot 2, which is no longer retained"
        );
        assert_eq!(ProtocolError::UnknownMessageType(7).to_string(), "unknown message type 0x07");
        assert_eq!(
            TimelineError::TooManyChanges(1 << 33).to_string(),
            "8589934592 changed values do not fit in one confirmation"
        );
        assert_eq!(SavegameError::TrailingBytes(2).to_string(), "2 trailing bytes after savegame");
    }
}
