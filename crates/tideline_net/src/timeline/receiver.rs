//! Receiver role: reassembly of incoming snapshots.
//!
//! Fragments of a tick are staged until its confirmation has arrived and
//! the staged value count matches the announced one. A delta-encoded tick
//! additionally waits for its reference; once both are there the delta is
//! merged over the reference and the result is committed and acknowledged.

use std::collections::BTreeMap;

use tideline_shared::{ObjectId, TickNumber};
use tideline_state::{DynStateBundle, ObjectRecord, ObjectStates};

use super::{Timeline, TimelineInner};
use crate::error::{TimelineError, TimelineResult};
use crate::snapshot::{Confirmation, Snapshot};

impl TimelineInner {
    fn staged_entry(&mut self, tick: TickNumber) -> &mut Snapshot {
        self.staged.entry(tick).or_insert_with(|| Snapshot::new(tick, 0.0))
    }

    /// Commits every staged snapshot that can be reconstructed, pushing
    /// the committed ticks to `acks`.
    fn commit_ready(&mut self, capacity: usize, acks: &mut Vec<TickNumber>) -> TimelineResult<()> {
        loop {
            let ready: Vec<(TickNumber, Confirmation)> = self
                .staged
                .values()
                .filter(|snapshot| snapshot.is_complete())
                .filter_map(|snapshot| snapshot.confirmation.map(|confirmation| (snapshot.tick, confirmation)))
                .collect();

            let mut progressed = false;
            for (tick, confirmation) in ready {
                let reference = confirmation.reference_tick;
                if confirmation.has_reference()
                    && self.committed_index(reference).is_none()
                    && self.staged.contains_key(&reference)
                {
                    continue;
                }
                let Some(mut snapshot) = self.staged.remove(&tick) else {
                    continue;
                };
                if confirmation.has_reference() {
                    let Some(previous) = self.committed_snapshot(reference) else {
                        return Err(TimelineError::ReferenceEvicted { tick, reference });
                    };
                    snapshot.records = undo_delta(&previous.records, &snapshot.records)?;
                }
                snapshot.realtime = confirmation.realtime;
                self.insert_committed(snapshot, capacity);
                acks.push(tick);
                progressed = true;
            }

            if !progressed {
                return Ok(());
            }
        }
    }
}

/// Every record of the reference, with the delta merged on top.
fn undo_delta(
    reference: &BTreeMap<ObjectId, ObjectRecord>,
    delta: &BTreeMap<ObjectId, ObjectRecord>,
) -> TimelineResult<BTreeMap<ObjectId, ObjectRecord>> {
    let mut records = reference.clone();
    for (&id, record) in delta {
        records.entry(id).or_default().merge_from(record)?;
    }
    Ok(records)
}

fn ignore_late_fragment(committed: &Snapshot) -> TimelineResult<()> {
    tracing::debug!(tick = committed.tick, "ignoring fragment for committed snapshot");
    Ok(())
}

impl Timeline {
    /// Stages basic state changes of one object for `tick`.
    ///
    /// Late duplicates for a tick that is already committed are ignored.
    ///
    /// # Errors
    ///
    /// Any error raised while committing the snapshots this completes.
    pub fn incoming_object_states_changed(
        &self,
        tick: TickNumber,
        id: ObjectId,
        states: &ObjectStates,
    ) -> TimelineResult<()> {
        self.receive(tick, ignore_late_fragment, |snapshot| {
            snapshot.merge_object_states(id, states);
            Ok(())
        })
    }

    /// Stages extra state changes of one object for `tick`.
    ///
    /// # Errors
    ///
    /// As [`incoming_object_states_changed`](Self::incoming_object_states_changed),
    /// plus a schema mismatch with an extra bundle already staged.
    pub fn incoming_object_extra_states_changed(
        &self,
        tick: TickNumber,
        id: ObjectId,
        extra: &dyn DynStateBundle,
    ) -> TimelineResult<()> {
        self.receive(tick, ignore_late_fragment, |snapshot| {
            Ok(snapshot.merge_extra_states(id, extra)?)
        })
    }

    /// Closes `tick`: the sender emitted `discrete_change_count` values
    /// encoded against `reference_tick`.
    ///
    /// Repeating the confirmation of a committed tick is a no-op.
    ///
    /// # Errors
    ///
    /// [`TimelineError::AlreadyCommitted`] if a committed tick is confirmed
    /// differently, [`TimelineError::ReferenceEvicted`] if the reference is
    /// gone.
    pub fn confirm_incoming_snapshot(
        &self,
        tick: TickNumber,
        realtime: f64,
        discrete_change_count: u32,
        reference_tick: TickNumber,
    ) -> TimelineResult<()> {
        let confirmation = Confirmation {
            realtime,
            discrete_change_count,
            reference_tick,
        };
        self.receive(
            tick,
            |committed| {
                if committed.confirmation == Some(confirmation) {
                    Ok(())
                } else {
                    Err(TimelineError::AlreadyCommitted(tick))
                }
            },
            |snapshot| {
                snapshot.realtime = realtime;
                snapshot.confirmation = Some(confirmation);
                Ok(())
            },
        )
    }

    fn receive(
        &self,
        tick: TickNumber,
        committed: impl FnOnce(&Snapshot) -> TimelineResult<()>,
        stage: impl FnOnce(&mut Snapshot) -> TimelineResult<()>,
    ) -> TimelineResult<()> {
        let mut acks = Vec::new();
        let result = {
            let mut inner = self.inner.lock();
            match inner.committed_index(tick) {
                Some(index) => committed(&inner.committed[index]),
                None => match stage(inner.staged_entry(tick)) {
                    Ok(()) => inner.commit_ready(self.config.capacity, &mut acks),
                    Err(error) => Err(error),
                },
            }
        };

        self.acknowledge(&acks);
        if let Err(error) = &result {
            tracing::warn!(tick, %error, resync = error.requires_resync(), "rejected incoming snapshot data");
        }
        result
    }

    fn acknowledge(&self, ticks: &[TickNumber]) {
        if ticks.is_empty() {
            return;
        }
        let uplink = self.uplink.read().clone();
        for &tick in ticks {
            tracing::debug!(tick, "committed incoming snapshot");
            if let Some(uplink) = &uplink {
                uplink.acknowledge_snapshot(tick);
            }
        }
    }

    /// Drops all committed, staged and accumulated state.
    ///
    /// Entry point for resynchronization after an error for which
    /// [`TimelineError::requires_resync`] is true.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.committed.clear();
        inner.staged.clear();
        inner.accumulator.clear();
        tracing::debug!("timeline reset");
    }

    /// Drops a staged snapshot. Returns false if `tick` was not staged.
    pub fn discard_staged(&self, tick: TickNumber) -> bool {
        self.inner.lock().staged.remove(&tick).is_some()
    }

    /// Ticks currently being reassembled.
    #[must_use]
    pub fn staged_ticks(&self) -> Vec<TickNumber> {
        self.inner.lock().staged.keys().copied().collect()
    }
}
