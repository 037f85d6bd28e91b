//! # Snapshots
//!
//! One tick's worth of object records.
//!
//! ```text
//!   Snapshot #42  realtime 0.700
//!   ┌────────────┬──────────────────────────────┐
//!   │ object#1   │ ObjectStates (+ extra)       │
//!   │ object#7   │ ObjectStates                 │
//!   │ ...        │                              │
//!   └────────────┴──────────────────────────────┘
//!   receiver only: Confirmation { realtime, change count, reference }
//! ```
//!
//! On the sender a snapshot holds the changes of its tick. On the receiver
//! it is staged until its confirmation has arrived and the number of staged
//! values matches the announced count.

use std::collections::BTreeMap;

use tideline_shared::{ObjectId, TickNumber, INVALID_TICK};
use tideline_state::{DynStateBundle, ObjectRecord, ObjectStates, StateResult};

/// Metadata carried by a snapshot confirmation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Confirmation {
    /// Sender's realtime at commit.
    pub realtime: f64,
    /// Total values the sender emitted for this tick.
    pub discrete_change_count: u32,
    /// Tick the records are delta-encoded against, or [`INVALID_TICK`].
    pub reference_tick: TickNumber,
}

impl Confirmation {
    /// True if the records are delta-encoded.
    #[must_use]
    pub const fn has_reference(&self) -> bool {
        self.reference_tick != INVALID_TICK
    }
}

/// Object records of one tick.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    /// Tick number.
    pub tick: TickNumber,
    /// Seconds at commit.
    pub realtime: f64,
    /// Records by object.
    pub records: BTreeMap<ObjectId, ObjectRecord>,
    /// Set once the sender confirmed the tick (receiver side).
    pub confirmation: Option<Confirmation>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new(tick: TickNumber, realtime: f64) -> Self {
        Self {
            tick,
            realtime,
            records: BTreeMap::new(),
            confirmation: None,
        }
    }

    /// Creates a snapshot holding `records`.
    #[must_use]
    pub fn with_records(tick: TickNumber, realtime: f64, records: BTreeMap<ObjectId, ObjectRecord>) -> Self {
        Self {
            tick,
            realtime,
            records,
            confirmation: None,
        }
    }

    /// Record of `id`, if the tick touched it.
    #[must_use]
    pub fn record(&self, id: ObjectId) -> Option<&ObjectRecord> {
        self.records.get(&id)
    }

    /// Number of objects in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no object was touched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Values carried by all records.
    #[must_use]
    pub fn count_states_with_value(&self) -> usize {
        self.records.values().map(ObjectRecord::count_states_with_value).sum()
    }

    /// Merges basic states into the record of `id`.
    pub fn merge_object_states(&mut self, id: ObjectId, states: &ObjectStates) {
        self.records.entry(id).or_default().merge_states(states);
    }

    /// Merges an extra bundle into the record of `id`.
    ///
    /// # Errors
    ///
    /// Fails if the record already holds an extra bundle of another schema.
    pub fn merge_extra_states(&mut self, id: ObjectId, extra: &dyn DynStateBundle) -> StateResult<()> {
        self.records.entry(id).or_default().merge_extra(extra)
    }

    /// Confirmed, and every announced value has arrived.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.confirmation.is_some_and(|confirmation| {
            usize::try_from(confirmation.discrete_change_count)
                .is_ok_and(|expected| expected == self.count_states_with_value())
        })
    }
}
