//! Per-value flag set.
//!
//! Schema flags (`SAVED`, `NETWORKED`, `LERPED`, `PREDICTED`) are fixed when a
//! bundle is declared. Runtime flags (`HAS_VALUE`, `JUMP`) change as the value
//! is assigned or marked.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bit set describing how a [`State`](crate::State) is treated.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StateFlags(u16);

impl StateFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Included in savegames.
    pub const SAVED: Self = Self(1 << 0);
    /// Included in network snapshots.
    pub const NETWORKED: Self = Self(1 << 1);
    /// Interpolated rather than stepped between snapshots.
    pub const LERPED: Self = Self(1 << 2);
    /// Driven by local prediction on the owning client.
    pub const PREDICTED: Self = Self(1 << 3);
    /// A value is present.
    pub const HAS_VALUE: Self = Self(1 << 13);
    /// The value changed discontinuously and must not be interpolated into.
    pub const JUMP: Self = Self(1 << 14);

    /// Flags a field gets when its declaration names none.
    pub const DEFAULT: Self = Self::SAVED.union(Self::NETWORKED);

    /// Flags that only exist at runtime.
    pub const RUNTIME: Self = Self::HAS_VALUE.union(Self::JUMP);

    const NAMES: [(Self, &'static str); 6] = [
        (Self::SAVED, "SAVED"),
        (Self::NETWORKED, "NETWORKED"),
        (Self::LERPED, "LERPED"),
        (Self::PREDICTED, "PREDICTED"),
        (Self::HAS_VALUE, "HAS_VALUE"),
        (Self::JUMP, "JUMP"),
    ];

    /// Raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Union of two flag sets.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// `self` without any flag of `other`.
    #[inline]
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Returns true if every flag of `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets or clears the flags of `other`.
    #[inline]
    pub fn set(&mut self, other: Self, enabled: bool) {
        if enabled {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }

    /// The declaration-time part of the set.
    #[inline]
    #[must_use]
    pub const fn schema(self) -> Self {
        self.difference(Self::RUNTIME)
    }
}

impl BitOr for StateFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for StateFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for StateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("NONE");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}
