//! Wire identifiers for extra bundle schemas.
//!
//! Extra bundles travel with a [`BundleKind`] so the receiver knows which
//! schema to decode. Both ends must register the same kinds.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use crate::bundle::StateBundle;
use crate::codec::{SerializationPurpose, StateReader};
use crate::dynamic::DynStateBundle;
use crate::error::{StateError, StateResult};

/// Wire identifier of a registered bundle schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleKind(pub u16);

impl fmt::Display for BundleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kind#{}", self.0)
    }
}

struct Entry {
    name: &'static str,
    create: fn() -> Box<dyn DynStateBundle>,
}

fn create_default<B: StateBundle>() -> Box<dyn DynStateBundle> {
    Box::<B>::default()
}

/// Maps bundle kinds to schemas and back.
#[derive(Default)]
pub struct BundleRegistry {
    by_kind: HashMap<BundleKind, Entry>,
    by_type: HashMap<TypeId, BundleKind>,
}

impl BundleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `B` under `kind`.
    ///
    /// # Errors
    ///
    /// Fails if `kind` is taken or `B` is already registered.
    pub fn register<B: StateBundle>(&mut self, kind: BundleKind) -> StateResult<()> {
        if let Some(existing) = self.by_kind.get(&kind) {
            return Err(StateError::DuplicateRegistration {
                kind: kind.0,
                existing: existing.name,
            });
        }
        if let Some(existing) = self.by_type.get(&TypeId::of::<B>()) {
            return Err(StateError::DuplicateRegistration {
                kind: existing.0,
                existing: B::NAME,
            });
        }

        self.by_kind.insert(
            kind,
            Entry {
                name: B::NAME,
                create: create_default::<B>,
            },
        );
        self.by_type.insert(TypeId::of::<B>(), kind);
        tracing::debug!(%kind, bundle = B::NAME, "registered bundle kind");
        Ok(())
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    /// True if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }

    /// Schema name registered under `kind`.
    #[must_use]
    pub fn name_of(&self, kind: BundleKind) -> Option<&'static str> {
        self.by_kind.get(&kind).map(|entry| entry.name)
    }

    /// Kind the bundle's concrete type is registered under.
    ///
    /// # Errors
    ///
    /// Fails if the type was never registered.
    pub fn kind_of(&self, bundle: &dyn DynStateBundle) -> StateResult<BundleKind> {
        self.by_type
            .get(&bundle.as_any().type_id())
            .copied()
            .ok_or(StateError::UnregisteredBundleType(bundle.bundle_name()))
    }

    /// A fresh, empty bundle of `kind`.
    ///
    /// # Errors
    ///
    /// Fails if `kind` is not registered.
    pub fn create(&self, kind: BundleKind) -> StateResult<Box<dyn DynStateBundle>> {
        self.by_kind
            .get(&kind)
            .map(|entry| (entry.create)())
            .ok_or(StateError::UnknownBundleKind(kind.0))
    }

    /// Decodes a bundle of `kind`.
    ///
    /// # Errors
    ///
    /// Fails if `kind` is not registered or the input is malformed.
    pub fn deserialize(
        &self,
        kind: BundleKind,
        reader: &mut StateReader<'_>,
        purpose: SerializationPurpose,
    ) -> StateResult<Box<dyn DynStateBundle>> {
        let mut bundle = self.create(kind)?;
        bundle.dyn_deserialize(reader, purpose)?;
        Ok(bundle)
    }
}

impl fmt::Debug for BundleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.by_kind.iter().map(|(kind, entry)| (kind.0, entry.name)).collect();
        kinds.sort_unstable();
        f.debug_struct("BundleRegistry").field("kinds", &kinds).finish()
    }
}
