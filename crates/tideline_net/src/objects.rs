//! # Live Objects
//!
//! The timeline never owns live objects. It reads and writes them through
//! an [`ObjectRegistry`] supplied by the surrounding simulation.
//!
//! [`ObjectTable`] is a plain in-memory registry. Its writes report to an
//! attached timeline the way a scene's objects do; the timeline ignores its
//! own echoes while applying.

use std::collections::BTreeMap;
use std::sync::Arc;

use tideline_shared::ObjectId;
use tideline_state::{DynStateBundle, ObjectRecord, ObjectStates, StateResult};

use crate::timeline::Timeline;

/// Lookup and mutation of live objects.
pub trait ObjectRegistry {
    /// Current record of a live object, `None` if it does not exist.
    fn object_record(&self, id: ObjectId) -> Option<ObjectRecord>;

    /// Writes the values present in `record` onto the live object.
    ///
    /// Returns false if the object does not exist.
    fn apply_record(&mut self, id: ObjectId, record: &ObjectRecord) -> bool;
}

/// In-memory object store.
#[derive(Debug, Default)]
pub struct ObjectTable {
    objects: BTreeMap<ObjectId, ObjectRecord>,
    timeline: Option<Arc<Timeline>>,
}

impl ObjectTable {
    /// Creates an empty, unobserved table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table whose changes are reported to `timeline`.
    #[must_use]
    pub fn tracked_by(timeline: Arc<Timeline>) -> Self {
        Self {
            objects: BTreeMap::new(),
            timeline: Some(timeline),
        }
    }

    /// Adds an object with the given states and reports them.
    pub fn spawn(&mut self, id: ObjectId, states: ObjectStates) {
        self.objects.insert(id, ObjectRecord::new(ObjectStates::default()));
        self.set_states(id, &states);
    }

    /// Removes an object. Returns its last record.
    pub fn despawn(&mut self, id: ObjectId) -> Option<ObjectRecord> {
        self.objects.remove(&id)
    }

    /// Basic states of an object.
    #[must_use]
    pub fn states(&self, id: ObjectId) -> Option<&ObjectStates> {
        self.objects.get(&id).map(|record| &record.states)
    }

    /// Extra bundle of an object.
    #[must_use]
    pub fn extra(&self, id: ObjectId) -> Option<&dyn DynStateBundle> {
        self.objects.get(&id).and_then(|record| record.extra.as_deref())
    }

    /// Number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if there are no live objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Merges `states` into an object and reports the change.
    ///
    /// Returns false if the object does not exist.
    pub fn set_states(&mut self, id: ObjectId, states: &ObjectStates) -> bool {
        let Some(record) = self.objects.get_mut(&id) else {
            return false;
        };
        record.merge_states(states);
        if let Some(timeline) = &self.timeline {
            timeline.object_states_changed(id, states);
        }
        true
    }

    /// Merges an extra bundle into an object and reports the change.
    ///
    /// Returns `Ok(false)` if the object does not exist.
    ///
    /// # Errors
    ///
    /// Fails if the object already carries an extra bundle of another schema.
    pub fn set_extra_states(&mut self, id: ObjectId, extra: &dyn DynStateBundle) -> StateResult<bool> {
        let Some(record) = self.objects.get_mut(&id) else {
            return Ok(false);
        };
        record.merge_extra(extra)?;
        if let Some(timeline) = &self.timeline {
            timeline.object_extra_states_changed(id, extra)?;
        }
        Ok(true)
    }
}

impl ObjectRegistry for ObjectTable {
    fn object_record(&self, id: ObjectId) -> Option<ObjectRecord> {
        self.objects.get(&id).cloned()
    }

    fn apply_record(&mut self, id: ObjectId, record: &ObjectRecord) -> bool {
        if !self.set_states(id, &record.states) {
            return false;
        }
        if let Some(extra) = record.extra.as_deref() {
            if let Err(error) = self.set_extra_states(id, extra) {
                tracing::warn!(%id, %error, "extra states not applied");
            }
        }
        true
    }
}
