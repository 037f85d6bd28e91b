//! Basic states every level object carries.

use tideline_shared::{Quaternion, Vec3};

use crate::flags::StateFlags;

const LERPED: StateFlags = StateFlags::DEFAULT.union(StateFlags::LERPED);

crate::state_bundle! {
    /// Transform and lifecycle of a level object.
    ///
    /// The transform is interpolated on clients; visibility and the running
    /// flag step.
    pub struct ObjectStates {
        /// World position.
        pub position: Vec3 => LERPED,
        /// World orientation.
        pub rotation: Quaternion => LERPED,
        /// Per-axis scale.
        pub scale: Vec3 => LERPED,
        /// Rendered or hidden.
        pub visibility: bool,
        /// Simulation active.
        pub running: bool,
    }
}

impl ObjectStates {
    /// States with every field assigned, as an object has when spawned.
    #[must_use]
    pub fn spawned(position: Vec3) -> Self {
        let mut states = Self::default();
        states.position.assign(position);
        states.rotation.assign(Quaternion::IDENTITY);
        states.scale.assign(Vec3::ONE);
        states.visibility.assign(true);
        states.running.assign(true);
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{SerializationPurpose, StateReader, StateWriter};
    use crate::StateBundle;

    #[test]
    fn test_declared_flags() {
        let states = ObjectStates::default();
        assert!(states.position.is_lerped());
        assert!(states.rotation.is_lerped());
        assert!(!states.visibility.is_lerped());
        assert!(states.running.is_networked() && states.running.is_saved());
        assert_eq!(ObjectStates::FIELD_COUNT, 5);
    }

    #[test]
    fn test_lerp_position_and_step_visibility() {
        let a = ObjectStates::spawned(Vec3::ZERO);
        let mut b = ObjectStates::spawned(Vec3::new(10.0, 0.0, 0.0));
        b.visibility.assign(false);

        let mid = ObjectStates::lerp(&a, &b, 0.5);
        assert_eq!(mid.position.get(), Vec3::new(5.0, 0.0, 0.0));
        assert!(!mid.visibility.get());
    }

    #[test]
    fn test_teleport_is_not_interpolated() {
        let a = ObjectStates::spawned(Vec3::ZERO);
        let mut b = ObjectStates::default();
        b.position.assign(Vec3::new(100.0, 0.0, 0.0));
        b.position.set_jump(true);

        let mid = ObjectStates::lerp(&a, &b, 0.1);
        assert_eq!(mid.position.get(), Vec3::new(100.0, 0.0, 0.0));
        // Fields only lhs has survive.
        assert_eq!(mid.scale.get(), Vec3::ONE);
    }

    #[test]
    fn test_wire_size() {
        let mut states = ObjectStates::default();
        states.position.assign(Vec3::new(1.0, 2.0, 3.0));
        states.running.assign(false);

        let mut writer = StateWriter::new();
        states.serialize(&mut writer, SerializationPurpose::Network);
        // 1 mask byte + 12 bytes position + 1 byte bool
        assert_eq!(writer.len(), 14);
        assert_eq!(writer.as_slice()[0], 0b0001_0001);

        let mut reader = StateReader::new(writer.as_slice());
        let decoded = ObjectStates::deserialize(&mut reader, SerializationPurpose::Network).unwrap();
        assert_eq!(decoded, states);
    }
}
