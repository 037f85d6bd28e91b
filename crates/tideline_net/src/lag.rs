//! # Lag Compensation
//!
//! Server-side gameplay checks (hit scans, pickups) must see the world the
//! way the acting client saw it when it acted:
//!
//! ```text
//!   server time ──────────────────────────────────▶ now
//!                        ▲
//!                        │ now - (rtt / 2 + view interpolation)
//!   begin_rollback ──────┘  live objects rewound
//!   ...gameplay queries through guard.registry()...
//!   drop(guard)             live objects restored
//! ```
//!
//! While the guard is alive the timeline refuses to commit.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

use tideline_shared::ObjectId;
use tideline_state::ObjectRecord;

use crate::error::{TimelineError, TimelineResult};
use crate::objects::ObjectRegistry;
use crate::timeline::Timeline;

/// Live objects rewound to a past time until dropped.
pub struct LagCompensationGuard<'a, R: ObjectRegistry + ?Sized> {
    timeline: &'a Timeline,
    registry: &'a mut R,
    saved: BTreeMap<ObjectId, ObjectRecord>,
    rollback_time: f64,
}

impl<R: ObjectRegistry + ?Sized> LagCompensationGuard<'_, R> {
    /// Time the objects were rewound to, after clamping.
    #[must_use]
    pub fn rollback_time(&self) -> f64 {
        self.rollback_time
    }

    /// Rewound objects, for gameplay queries.
    #[must_use]
    pub fn registry(&self) -> &R {
        self.registry
    }

    /// Rewound objects, mutably.
    ///
    /// Writes made here are overwritten on drop for every rewound object.
    pub fn registry_mut(&mut self) -> &mut R {
        self.registry
    }

    /// Objects whose present state is restored on drop.
    pub fn rolled_back_objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.saved.keys().copied()
    }
}

impl<R: ObjectRegistry + ?Sized> Drop for LagCompensationGuard<'_, R> {
    fn drop(&mut self) {
        let restored = self.timeline.write_untracked(&mut *self.registry, &self.saved);
        self.timeline.rollback_active.store(false, Ordering::Release);
        tracing::debug!(restored, "ended lag-compensation rollback");
    }
}

impl Timeline {
    /// Rewinds live objects to `target_time`.
    ///
    /// The target is clamped to the oldest retained snapshot. Every object
    /// the historical state touches has its present record captured first
    /// and written back when the guard drops. Writes are untracked in both
    /// directions.
    ///
    /// # Errors
    ///
    /// [`TimelineError::RollbackActive`] if a guard is already alive, or a
    /// reconstruction error.
    pub fn begin_rollback<'a, R: ObjectRegistry + ?Sized>(
        &'a self,
        target_time: f64,
        registry: &'a mut R,
    ) -> TimelineResult<LagCompensationGuard<'a, R>> {
        if self
            .rollback_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TimelineError::RollbackActive);
        }

        let rollback_time = self
            .oldest_realtime()
            .map_or(target_time, |oldest| target_time.max(oldest));
        let historical = match self.reconstruct(rollback_time) {
            Ok(records) => records,
            Err(error) => {
                self.rollback_active.store(false, Ordering::Release);
                return Err(error);
            }
        };

        let saved: BTreeMap<ObjectId, ObjectRecord> = historical
            .keys()
            .filter_map(|&id| registry.object_record(id).map(|record| (id, record)))
            .collect();
        let rewound = self.write_untracked(registry, &historical);
        tracing::debug!(target_time, rollback_time, rewound, "began lag-compensation rollback");

        Ok(LagCompensationGuard {
            timeline: self,
            registry,
            saved,
            rollback_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::objects::ObjectTable;
    use tideline_shared::Vec3;
    use tideline_state::ObjectStates;

    fn moved(x: f32) -> ObjectStates {
        let mut states = ObjectStates::default();
        states.position.assign(Vec3::new(x, 0.0, 0.0));
        states
    }

    fn world() -> (Arc<Timeline>, ObjectTable) {
        let timeline = Arc::new(Timeline::new());
        let mut table = ObjectTable::tracked_by(Arc::clone(&timeline));
        table.spawn(ObjectId(1), ObjectStates::spawned(Vec3::ZERO));
        timeline.commit(0.0).unwrap();
        table.set_states(ObjectId(1), &moved(10.0));
        timeline.commit(1.0).unwrap();
        table.set_states(ObjectId(1), &moved(20.0));
        timeline.commit(2.0).unwrap();
        (timeline, table)
    }

    #[test]
    fn test_rollback_and_restore() {
        let (timeline, mut table) = world();
        {
            let guard = timeline.begin_rollback(0.5, &mut table).unwrap();
            let position = guard.registry().states(ObjectId(1)).unwrap().position.get();
            assert!((position.x - 5.0).abs() < 1e-5);
            assert_eq!(guard.rolled_back_objects().collect::<Vec<_>>(), vec![ObjectId(1)]);
            assert!(timeline.is_rollback_active());
        }
        assert!(!timeline.is_rollback_active());
        assert_eq!(table.states(ObjectId(1)).unwrap().position.get(), Vec3::new(20.0, 0.0, 0.0));

        // Neither the rewind nor the restore was reported as a change.
        let tick = timeline.commit(3.0).unwrap();
        assert!(timeline.snapshot(tick).unwrap().is_empty());
    }

    #[test]
    fn test_target_clamped_to_oldest() {
        let (timeline, mut table) = world();
        let guard = timeline.begin_rollback(-10.0, &mut table).unwrap();
        assert_eq!(guard.rollback_time(), 0.0);
        assert_eq!(guard.registry().states(ObjectId(1)).unwrap().position.get(), Vec3::ZERO);
    }

    #[test]
    fn test_nested_rollback_and_commit_rejected() {
        let (timeline, mut table) = world();
        let mut other = ObjectTable::new();
        let guard = timeline.begin_rollback(1.0, &mut table).unwrap();

        assert_eq!(
            timeline.begin_rollback(1.0, &mut other).err(),
            Some(TimelineError::RollbackActive)
        );
        assert_eq!(timeline.commit(3.0).unwrap_err(), TimelineError::RollbackActive);

        drop(guard);
        assert!(timeline.commit(3.0).is_ok());
    }
}
