//! Identifiers shared by every layer of the synchronization stack.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete simulation step counter.
///
/// Committed ticks are strictly increasing but need not be contiguous.
pub type TickNumber = u32;

/// Marker for "no tick", e.g. a full (non-delta) snapshot's reference.
pub const INVALID_TICK: TickNumber = 0;

/// The tick assigned to the first snapshot a fresh timeline commits.
pub const FIRST_TICK: TickNumber = 1;

/// Identifier of a live object in the simulated level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// Identifier the server assigns to a connected client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(pub u32);

impl ClientId {
    /// Invalid/null client ID.
    pub const NULL: Self = Self(0);

    /// Returns true if this is the null ID.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}
