//! Sender role: change accumulation, commit and delta-encoded sends.

use std::collections::BTreeMap;

use tideline_shared::{ObjectId, TickNumber, FIRST_TICK, INVALID_TICK};
use tideline_state::{DynStateBundle, ObjectRecord, ObjectStates, SerializationPurpose, StateBundle, StateResult};

use super::{Timeline, TimelineInner};
use crate::connector::DownlinkConnector;
use crate::error::{TimelineError, TimelineResult};
use crate::snapshot::Snapshot;

/// What one [`Timeline::send_snapshot_to_client`] call emitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendSummary {
    /// Tick that was sent.
    pub tick: TickNumber,
    /// Reference the records were encoded against, [`INVALID_TICK`] for a
    /// full snapshot.
    pub reference_tick: TickNumber,
    /// Messages emitted, confirmation included.
    pub messages: usize,
    /// Values emitted.
    pub discrete_change_count: u32,
}

impl SendSummary {
    /// True if the snapshot was delta-encoded.
    #[must_use]
    pub const fn is_delta(&self) -> bool {
        self.reference_tick != INVALID_TICK
    }
}

impl TimelineInner {
    /// Changes of every retained tick in `(reference, tick]`, or up to `tick`
    /// when there is no reference.
    fn changes_since(
        &self,
        reference: Option<usize>,
        index: usize,
        full_state: bool,
    ) -> StateResult<BTreeMap<ObjectId, ObjectRecord>> {
        if full_state {
            return Ok(self.committed[index].records.clone());
        }
        let start = reference.map_or(0, |reference| reference + 1);
        let mut changes: BTreeMap<ObjectId, ObjectRecord> = BTreeMap::new();
        for snapshot in self.committed.range(start..=index) {
            for (&id, record) in &snapshot.records {
                changes.entry(id).or_default().merge_from(record)?;
            }
        }
        Ok(changes)
    }
}

impl Timeline {
    /// Reports basic state changes of a live object for the current tick.
    ///
    /// Ignored while tracking is suppressed on this thread.
    pub fn object_states_changed(&self, id: ObjectId, states: &ObjectStates) {
        if self.is_tracking_suppressed() {
            return;
        }
        self.inner.lock().accumulator.entry(id).or_default().merge_states(states);
    }

    /// Reports extra state changes of a live object for the current tick.
    ///
    /// Ignored while tracking is suppressed on this thread.
    ///
    /// # Errors
    ///
    /// Fails if the object already reported an extra bundle of another
    /// schema this tick.
    pub fn object_extra_states_changed(&self, id: ObjectId, extra: &dyn DynStateBundle) -> StateResult<()> {
        if self.is_tracking_suppressed() {
            return Ok(());
        }
        self.inner.lock().accumulator.entry(id).or_default().merge_extra(extra)
    }

    /// Freezes the reported changes into a new snapshot.
    ///
    /// The first tick is [`FIRST_TICK`]; every later one follows the newest
    /// committed tick. The oldest snapshot is evicted at capacity.
    ///
    /// # Errors
    ///
    /// [`TimelineError::RollbackActive`] while a lag-compensation guard is
    /// alive.
    pub fn commit(&self, realtime: f64) -> TimelineResult<TickNumber> {
        if self.is_rollback_active() {
            return Err(TimelineError::RollbackActive);
        }
        let mut inner = self.inner.lock();
        let tick = inner.committed.back().map_or(FIRST_TICK, |latest| latest.tick + 1);
        let records = if self.config.accumulate_full_state {
            inner.accumulator.clone()
        } else {
            std::mem::take(&mut inner.accumulator)
        };
        let objects = records.len();
        inner.insert_committed(Snapshot::with_records(tick, realtime, records), self.config.capacity);
        tracing::trace!(tick, realtime, objects, "committed snapshot");
        Ok(tick)
    }

    /// Streams a committed tick to one receiver.
    ///
    /// With a retained `reference_tick` older than `tick`, only values that
    /// changed since the reference are sent; otherwise the full retained
    /// state is. Values not flagged NETWORKED are never sent. One message
    /// goes out per non-empty bundle, then the confirmation.
    ///
    /// # Errors
    ///
    /// [`TimelineError::SnapshotNotFound`] if `tick` is not committed.
    /// Fails before emitting anything if the connector cannot carry one of
    /// the extra bundles, or if the tick holds more values than a
    /// confirmation can announce.
    pub fn send_snapshot_to_client(
        &self,
        tick: TickNumber,
        connector: &dyn DownlinkConnector,
        reference_tick: TickNumber,
    ) -> TimelineResult<SendSummary> {
        let (realtime, reference_tick, records) = {
            let inner = self.inner.lock();
            let index = inner.committed_index(tick).ok_or(TimelineError::SnapshotNotFound(tick))?;
            let reference = if reference_tick == INVALID_TICK || reference_tick >= tick {
                None
            } else {
                inner.committed_index(reference_tick)
            };
            if reference.is_none() && reference_tick != INVALID_TICK {
                tracing::debug!(tick, reference_tick, "reference unavailable, sending full snapshot");
            }

            let changes = inner.changes_since(reference, index, self.config.accumulate_full_state)?;
            let reference = reference.map(|reference| &inner.committed[reference]);
            let mut records = Vec::with_capacity(changes.len());
            for (id, record) in changes {
                let encoded = match reference.and_then(|reference| reference.record(id)) {
                    Some(previous) => ObjectRecord::delta_encode(previous, &record)?,
                    None => record,
                };
                let encoded = encoded.filtered(SerializationPurpose::Network);
                if !encoded.is_empty() {
                    records.push((id, encoded));
                }
            }
            (
                inner.committed[index].realtime,
                reference.map_or(INVALID_TICK, |reference| reference.tick),
                records,
            )
        };

        let mut change_count = 0usize;
        for (_, record) in &records {
            change_count += record.count_states_with_value();
            if let Some(extra) = record.extra.as_deref() {
                connector.check_extra_states(extra)?;
            }
        }
        let discrete_change_count =
            u32::try_from(change_count).map_err(|_| TimelineError::TooManyChanges(change_count))?;

        let mut messages = 0;
        for (id, record) in &records {
            if record.states.count_states_with_value() > 0 {
                connector.object_states_changed(tick, *id, &record.states);
                messages += 1;
            }
            if let Some(extra) = record.extra.as_deref() {
                connector.object_extra_states_changed(tick, *id, extra);
                messages += 1;
            }
        }
        connector.confirm_snapshot(tick, realtime, discrete_change_count, reference_tick);
        messages += 1;

        Ok(SendSummary {
            tick,
            reference_tick,
            messages,
            discrete_change_count,
        })
    }
}
