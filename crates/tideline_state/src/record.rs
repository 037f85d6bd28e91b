//! Everything the timeline stores for one object in one tick.

use crate::bundle::StateBundle;
use crate::codec::SerializationPurpose;
use crate::dynamic::DynStateBundle;
use crate::error::StateResult;
use crate::object_states::ObjectStates;

type Extra = Option<Box<dyn DynStateBundle>>;

/// Basic states plus an optional extra bundle.
#[derive(Clone, Debug, Default)]
pub struct ObjectRecord {
    /// Transform and lifecycle.
    pub states: ObjectStates,
    /// Class-specific bundle, if the object has one.
    pub extra: Extra,
}

impl ObjectRecord {
    /// Record with only basic states.
    #[must_use]
    pub fn new(states: ObjectStates) -> Self {
        Self { states, extra: None }
    }

    /// Attaches an extra bundle.
    #[must_use]
    pub fn with_extra(mut self, extra: Box<dyn DynStateBundle>) -> Self {
        self.extra = Some(extra);
        self
    }

    /// Values carried by the basic states and the extra bundle together.
    #[must_use]
    pub fn count_states_with_value(&self) -> usize {
        self.states.count_states_with_value()
            + self.extra.as_deref().map_or(0, |extra| extra.dyn_count_states_with_value())
    }

    /// True if the record carries no value at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count_states_with_value() == 0
    }

    /// Merges `rhs` over `lhs`, extra bundles included.
    ///
    /// # Errors
    ///
    /// Fails if both carry extra bundles of different schemas.
    pub fn merge(lhs: &Self, rhs: &Self) -> StateResult<Self> {
        let extra = match (lhs.extra.as_deref(), rhs.extra.as_deref()) {
            (Some(lhs), Some(rhs)) => Some(lhs.dyn_merge(rhs)?),
            (Some(only), None) | (None, Some(only)) => Some(only.clone_box()),
            (None, None) => None,
        };
        Ok(Self {
            states: ObjectStates::merge(&lhs.states, &rhs.states),
            extra,
        })
    }

    /// Merges `rhs` into `self`.
    ///
    /// # Errors
    ///
    /// Fails if both carry extra bundles of different schemas.
    pub fn merge_from(&mut self, rhs: &Self) -> StateResult<()> {
        *self = Self::merge(self, rhs)?;
        Ok(())
    }

    /// Merges basic states into `self`.
    pub fn merge_states(&mut self, states: &ObjectStates) {
        self.states = ObjectStates::merge(&self.states, states);
    }

    /// Merges an extra bundle into `self`.
    ///
    /// # Errors
    ///
    /// Fails if `self` already holds an extra bundle of another schema.
    pub fn merge_extra(&mut self, extra: &dyn DynStateBundle) -> StateResult<()> {
        self.extra = Some(match self.extra.as_deref() {
            Some(current) => current.dyn_merge(extra)?,
            None => extra.clone_box(),
        });
        Ok(())
    }

    /// Blend of two records at `delta`.
    ///
    /// # Errors
    ///
    /// Fails if both carry extra bundles of different schemas.
    pub fn lerp(lhs: &Self, rhs: &Self, delta: f32) -> StateResult<Self> {
        let extra = match (lhs.extra.as_deref(), rhs.extra.as_deref()) {
            (Some(lhs), Some(rhs)) => Some(lhs.dyn_lerp(rhs, delta)?),
            (Some(only), None) | (None, Some(only)) => Some(only.clone_box()),
            (None, None) => None,
        };
        Ok(Self {
            states: ObjectStates::lerp(&lhs.states, &rhs.states, delta),
            extra,
        })
    }

    /// Copy keeping only the values eligible for `purpose`.
    ///
    /// An extra bundle left without values is dropped.
    #[must_use]
    pub fn filtered(&self, purpose: SerializationPurpose) -> Self {
        Self {
            states: self.states.filtered(purpose),
            extra: self
                .extra
                .as_deref()
                .map(|extra| extra.dyn_filtered(purpose))
                .filter(|extra| extra.dyn_count_states_with_value() > 0),
        }
    }

    /// `to_encode` without what `reference` already holds.
    ///
    /// An extra bundle that delta-encodes to nothing is dropped.
    ///
    /// # Errors
    ///
    /// Fails if both carry extra bundles of different schemas.
    pub fn delta_encode(reference: &Self, to_encode: &Self) -> StateResult<Self> {
        let extra = match (reference.extra.as_deref(), to_encode.extra.as_deref()) {
            (Some(reference), Some(to_encode)) => {
                Some(reference.dyn_delta_encode(to_encode)?).filter(|delta| delta.dyn_count_states_with_value() > 0)
            }
            (None, Some(to_encode)) => Some(to_encode.clone_box()),
            (_, None) => None,
        };
        Ok(Self {
            states: ObjectStates::delta_encode(&reference.states, &to_encode.states),
            extra,
        })
    }
}

impl From<ObjectStates> for ObjectRecord {
    fn from(states: ObjectStates) -> Self {
        Self::new(states)
    }
}

impl PartialEq for ObjectRecord {
    fn eq(&self, other: &Self) -> bool {
        self.states == other.states
            && match (self.extra.as_deref(), other.extra.as_deref()) {
                (Some(lhs), Some(rhs)) => lhs.dyn_eq(rhs),
                (None, None) => true,
                _ => false,
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tideline_shared::Vec3;

    crate::state_bundle! {
        struct Turret {
            heat: f32,
            ammo: u16,
        }
    }

    fn turret(heat: Option<f32>, ammo: Option<u16>) -> Box<dyn DynStateBundle> {
        let mut turret = Turret::default();
        if let Some(heat) = heat {
            turret.heat.assign(heat);
        }
        if let Some(ammo) = ammo {
            turret.ammo.assign(ammo);
        }
        Box::new(turret)
    }

    #[test]
    fn test_count_includes_extra() {
        let record = ObjectRecord::new(ObjectStates::spawned(Vec3::ZERO)).with_extra(turret(Some(1.0), None));
        assert_eq!(record.count_states_with_value(), 6);
        assert!(ObjectRecord::default().is_empty());
    }

    #[test]
    fn test_merge_keeps_extra_from_either_side() {
        let lhs = ObjectRecord::default().with_extra(turret(Some(1.0), Some(10)));
        let rhs = ObjectRecord::new(ObjectStates::spawned(Vec3::ONE));

        let merged = ObjectRecord::merge(&lhs, &rhs).unwrap();
        assert_eq!(merged.states.position.get(), Vec3::ONE);
        assert!(merged.extra.as_deref().unwrap().dyn_eq(turret(Some(1.0), Some(10)).as_ref()));
    }

    #[test]
    fn test_merge_extra_in_place() {
        let mut record = ObjectRecord::default().with_extra(turret(Some(1.0), Some(10)));
        record.merge_extra(turret(None, Some(9)).as_ref()).unwrap();
        assert!(record.extra.as_deref().unwrap().dyn_eq(turret(Some(1.0), Some(9)).as_ref()));
    }

    #[test]
    fn test_delta_encode_drops_unchanged_extra() {
        let reference = ObjectRecord::new(ObjectStates::spawned(Vec3::ZERO)).with_extra(turret(Some(1.0), Some(10)));
        let unchanged = reference.clone();

        let delta = ObjectRecord::delta_encode(&reference, &unchanged).unwrap();
        assert!(delta.is_empty());
        assert!(delta.extra.is_none());

        let mut moved = reference.clone();
        moved.states.position.assign(Vec3::ONE);
        let delta = ObjectRecord::delta_encode(&reference, &moved).unwrap();
        assert_eq!(delta.count_states_with_value(), 1);
        assert_eq!(ObjectRecord::merge(&reference, &delta).unwrap(), moved);
    }

    #[test]
    fn test_filtered_drops_empty_extra() {
        let mut record = ObjectRecord::new(ObjectStates::spawned(Vec3::ZERO)).with_extra(turret(Some(1.0), None));
        record.states.running.set_networked(false);

        let network = record.filtered(SerializationPurpose::Network);
        assert_eq!(network.count_states_with_value(), 5);

        let mut unsaved = turret(Some(1.0), None);
        unsaved.downcast_mut::<Turret>().unwrap().heat.set_saved(false);
        let record = ObjectRecord::default().with_extra(unsaved);
        assert!(record.filtered(SerializationPurpose::Savegame).extra.is_none());
    }

    #[test]
    fn test_extra_schema_mismatch_is_error() {
        let lhs = ObjectRecord::default().with_extra(turret(Some(1.0), None));
        let rhs = ObjectRecord::default().with_extra(Box::new(ObjectStates::default()));
        assert!(ObjectRecord::merge(&lhs, &rhs).is_err());
        assert!(ObjectRecord::lerp(&lhs, &rhs, 0.5).is_err());
    }
}
