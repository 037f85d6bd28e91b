//! Interpolated apply.
//!
//! ```text
//!   realtime    0.0        1.0        2.0
//!   snapshots   [#1]───────[#2]───────[#3]
//!                             ▲ t = 1.25
//!                             └── lerp(#2, #3, 0.25)
//! ```
//!
//! At or past the newest snapshot its records are used as they are; there
//! is no extrapolation. Before the oldest, the oldest is used.

use std::collections::BTreeMap;

use tideline_shared::ObjectId;
use tideline_state::ObjectRecord;

use super::{Timeline, TimelineInner};
use crate::error::TimelineResult;
use crate::objects::ObjectRegistry;

impl TimelineInner {
    #[allow(clippy::cast_possible_truncation)]
    fn reconstruct(&self, realtime: f64) -> TimelineResult<BTreeMap<ObjectId, ObjectRecord>> {
        let Some(latest) = self.committed.back() else {
            return Ok(BTreeMap::new());
        };
        if realtime >= latest.realtime {
            return Ok(latest.records.clone());
        }
        let upper = self.committed.partition_point(|snapshot| snapshot.realtime <= realtime);
        if upper == 0 {
            return Ok(self.committed[0].records.clone());
        }

        let from = &self.committed[upper - 1];
        let to = &self.committed[upper];
        let delta = ((realtime - from.realtime) / (to.realtime - from.realtime)) as f32;

        let mut records = BTreeMap::new();
        for (&id, record) in &from.records {
            let blended = match to.record(id) {
                Some(next) => ObjectRecord::lerp(record, next, delta)?,
                None => record.clone(),
            };
            records.insert(id, blended);
        }
        Ok(records)
    }
}

impl Timeline {
    /// Object records as seen at `realtime`, without touching live objects.
    ///
    /// # Errors
    ///
    /// Fails if an object carries extra bundles of different schemas in the
    /// bracketing snapshots.
    pub fn reconstruct(&self, realtime: f64) -> TimelineResult<BTreeMap<ObjectId, ObjectRecord>> {
        self.inner.lock().reconstruct(realtime)
    }

    /// Writes the state at `realtime` onto live objects.
    ///
    /// Objects the registry does not know are skipped. Returns the number
    /// of objects written.
    ///
    /// # Errors
    ///
    /// As [`reconstruct`](Self::reconstruct).
    pub fn apply<R: ObjectRegistry + ?Sized>(&self, realtime: f64, registry: &mut R) -> TimelineResult<usize> {
        let records = self.reconstruct(realtime)?;
        Ok(self.write_untracked(registry, &records))
    }

    /// Writes `records` with change tracking suppressed.
    pub(crate) fn write_untracked<R: ObjectRegistry + ?Sized>(
        &self,
        registry: &mut R,
        records: &BTreeMap<ObjectId, ObjectRecord>,
    ) -> usize {
        let _untracked = self.suppress_tracking();
        let mut written = 0;
        for (&id, record) in records {
            if registry.apply_record(id, record) {
                written += 1;
            }
        }
        written
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

    fn two_ticks() -> Timeline {
        let timeline = Timeline::new();
        timeline.object_states_changed(ObjectId(1), &ObjectStates::spawned(Vec3::ZERO));
        timeline.commit(0.0).unwrap();
        timeline.object_states_changed(ObjectId(1), &moved(10.0));
        timeline.commit(1.0).unwrap();
        timeline
    }

    #[test]
    fn test_empty_timeline_writes_nothing() {
        let mut table = ObjectTable::new();
        table.spawn(ObjectId(1), ObjectStates::spawned(Vec3::ONE));
        assert_eq!(Timeline::new().apply(1.0, &mut table).unwrap(), 0);
        assert_eq!(table.states(ObjectId(1)).unwrap().position.get(), Vec3::ONE);
    }

    #[test]
    fn test_midpoint_interpolation() {
        let records = two_ticks().reconstruct(0.5).unwrap();
        let position = records[&ObjectId(1)].states.position.get();
        assert!((position.x - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_clamps_to_ends() {
        let timeline = two_ticks();
        let late = timeline.reconstruct(7.0).unwrap();
        assert_eq!(late[&ObjectId(1)].states.position.get(), Vec3::new(10.0, 0.0, 0.0));

        let early = timeline.reconstruct(-1.0).unwrap();
        assert_eq!(early[&ObjectId(1)].states.position.get(), Vec3::ZERO);
        assert!(early[&ObjectId(1)].states.visibility.get());
    }

    #[test]
    fn test_object_missing_in_later_snapshot_is_held() {
        let timeline = two_ticks();
        timeline.object_states_changed(ObjectId(2), &moved(3.0));
        timeline.commit(2.0).unwrap();
        timeline.commit(3.0).unwrap();

        let records = timeline.reconstruct(2.5).unwrap();
        assert_eq!(records[&ObjectId(2)].states.position.get(), Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_apply_does_not_echo_into_accumulator() {
        let timeline = Arc::new(two_ticks());
        let mut table = ObjectTable::tracked_by(Arc::clone(&timeline));
        {
            let _untracked = timeline.suppress_tracking();
            table.spawn(ObjectId(1), ObjectStates::spawned(Vec3::ONE));
        }

        assert_eq!(timeline.apply(0.5, &mut table).unwrap(), 1);
        let position = table.states(ObjectId(1)).unwrap().position.get();
        assert!((position.x - 5.0).abs() < 1e-5);

        let tick = timeline.commit(2.0).unwrap();
        assert!(timeline.snapshot(tick).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_objects_are_skipped() {
        let mut table = ObjectTable::new();
        assert_eq!(two_ticks().apply(0.5, &mut table).unwrap(), 0);
    }
}
