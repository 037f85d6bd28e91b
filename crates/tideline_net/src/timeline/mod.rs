//! # Timeline
//!
//! A bounded, tick-ordered ring of committed [`Snapshot`]s.
//!
//! ```text
//!            oldest                                  latest
//!   committed [#31][#32][#33] ... [#45][#46]  ◀── commit() / reassembly
//!                 ▲                   ▲
//!                 └── apply(t) ───────┘  interpolates the bracketing pair
//!
//!   sender:   accumulator ──commit()──▶ committed ──send_snapshot_to_client()──▶ DownlinkConnector
//!   receiver: incoming_* ──▶ staged ──complete──▶ committed ──ack──▶ UplinkConnector
//! ```
//!
//! The same type plays both roles. A server's timeline accumulates changes
//! reported by live objects and commits them once per tick. A client's
//! timeline reassembles what the server sends and commits a tick once every
//! announced value has arrived.
//!
//! All bookkeeping sits behind one mutex. Live objects are never written
//! while it is held.

mod apply;
mod receiver;
mod sender;

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tideline_shared::{ObjectId, TickNumber};
use tideline_state::{ObjectRecord, StateResult};

use crate::config::TimelineConfig;
use crate::connector::UplinkConnector;
use crate::snapshot::Snapshot;

pub use sender::SendSummary;

thread_local! {
    /// Timelines whose change tracking is suppressed on this thread.
    static SUPPRESSED: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Snapshot history with sender and receiver roles.
pub struct Timeline {
    config: TimelineConfig,
    inner: Mutex<TimelineInner>,
    pub(crate) rollback_active: AtomicBool,
    uplink: RwLock<Option<Arc<dyn UplinkConnector>>>,
}

#[derive(Default)]
struct TimelineInner {
    committed: VecDeque<Snapshot>,
    /// Changes reported since the last commit (sender).
    accumulator: BTreeMap<ObjectId, ObjectRecord>,
    /// Partially received snapshots (receiver).
    staged: BTreeMap<TickNumber, Snapshot>,
}

impl TimelineInner {
    fn committed_index(&self, tick: TickNumber) -> Option<usize> {
        self.committed.binary_search_by_key(&tick, |snapshot| snapshot.tick).ok()
    }

    fn committed_snapshot(&self, tick: TickNumber) -> Option<&Snapshot> {
        self.committed_index(tick).map(|index| &self.committed[index])
    }

    /// Inserts at the tick-ordered position and evicts down to `capacity`.
    fn insert_committed(&mut self, snapshot: Snapshot, capacity: usize) {
        let position = self.committed.partition_point(|existing| existing.tick < snapshot.tick);
        self.committed.insert(position, snapshot);
        while self.committed.len() > capacity {
            if let Some(evicted) = self.committed.pop_front() {
                tracing::trace!(tick = evicted.tick, "evicted snapshot");
            }
        }
    }
}

impl Timeline {
    /// Creates a timeline with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TimelineConfig::default())
    }

    /// Creates a timeline with explicit tunables.
    ///
    /// A capacity below two is raised to two so that interpolation always
    /// has a pair to work with.
    #[must_use]
    pub fn with_config(mut config: TimelineConfig) -> Self {
        config.capacity = config.capacity.max(2);
        Self {
            config,
            inner: Mutex::new(TimelineInner::default()),
            rollback_active: AtomicBool::new(false),
            uplink: RwLock::new(None),
        }
    }

    /// Tunables in effect.
    #[must_use]
    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Maximum number of committed snapshots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Sets where acknowledgements of committed incoming snapshots go.
    pub fn set_uplink_connector(&self, uplink: Option<Arc<dyn UplinkConnector>>) {
        *self.uplink.write() = uplink;
    }

    /// Number of committed snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().committed.len()
    }

    /// True if nothing is committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().committed.is_empty()
    }

    /// Newest committed tick.
    #[must_use]
    pub fn latest_tick(&self) -> Option<TickNumber> {
        self.inner.lock().committed.back().map(|snapshot| snapshot.tick)
    }

    /// Oldest committed tick.
    #[must_use]
    pub fn oldest_tick(&self) -> Option<TickNumber> {
        self.inner.lock().committed.front().map(|snapshot| snapshot.tick)
    }

    /// Realtime of the newest committed snapshot.
    #[must_use]
    pub fn latest_realtime(&self) -> Option<f64> {
        self.inner.lock().committed.back().map(|snapshot| snapshot.realtime)
    }

    /// Realtime of the oldest committed snapshot.
    #[must_use]
    pub fn oldest_realtime(&self) -> Option<f64> {
        self.inner.lock().committed.front().map(|snapshot| snapshot.realtime)
    }

    /// Committed ticks, oldest first.
    #[must_use]
    pub fn committed_ticks(&self) -> Vec<TickNumber> {
        self.inner.lock().committed.iter().map(|snapshot| snapshot.tick).collect()
    }

    /// Copy of a committed snapshot.
    #[must_use]
    pub fn snapshot(&self, tick: TickNumber) -> Option<Snapshot> {
        self.inner.lock().committed_snapshot(tick).cloned()
    }

    /// True while a [`LagCompensationGuard`](crate::LagCompensationGuard) is alive.
    #[must_use]
    pub fn is_rollback_active(&self) -> bool {
        self.rollback_active.load(Ordering::Acquire)
    }

    /// Ignores change reports for this timeline on the current thread until
    /// the returned guard is dropped.
    ///
    /// Used while the timeline itself writes live objects, whose setters
    /// report back.
    #[must_use]
    pub fn suppress_tracking(&self) -> TrackingSuppression<'_> {
        SUPPRESSED.with(|keys| keys.borrow_mut().push(self.key()));
        TrackingSuppression {
            timeline: self,
            _not_send: PhantomData,
        }
    }

    /// True if change reports are currently ignored on this thread.
    #[must_use]
    pub fn is_tracking_suppressed(&self) -> bool {
        let key = self.key();
        SUPPRESSED.with(|keys| keys.borrow().contains(&key))
    }

    fn key(&self) -> usize {
        (self as *const Self) as usize
    }

    /// Records of every retained snapshot merged oldest to newest, stamped
    /// with the newest tick.
    pub(crate) fn folded_state(&self) -> StateResult<Option<Snapshot>> {
        let inner = self.inner.lock();
        let Some(latest) = inner.committed.back() else {
            return Ok(None);
        };
        let mut records: BTreeMap<ObjectId, ObjectRecord> = BTreeMap::new();
        for snapshot in &inner.committed {
            for (&id, record) in &snapshot.records {
                records.entry(id).or_default().merge_from(record)?;
            }
        }
        Ok(Some(Snapshot::with_records(latest.tick, latest.realtime, records)))
    }

    /// Drops all history and installs `snapshot` as the only committed one.
    pub(crate) fn restore(&self, snapshot: Snapshot) {
        let mut inner = self.inner.lock();
        inner.committed.clear();
        inner.staged.clear();
        inner.accumulator.clear();
        inner.committed.push_back(snapshot);
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Timeline")
            .field("capacity", &self.config.capacity)
            .field("committed", &inner.committed.iter().map(|s| s.tick).collect::<Vec<_>>())
            .field("staged", &inner.staged.keys().collect::<Vec<_>>())
            .field("pending_objects", &inner.accumulator.len())
            .field("rollback_active", &self.is_rollback_active())
            .finish_non_exhaustive()
    }
}

/// Scope in which a timeline ignores change reports on this thread.
///
/// Not `Send`: it must be dropped on the thread that created it.
#[derive(Debug)]
pub struct TrackingSuppression<'a> {
    timeline: &'a Timeline,
    _not_send: PhantomData<*const ()>,
}

impl Drop for TrackingSuppression<'_> {
    fn drop(&mut self) {
        let key = self.timeline.key();
        SUPPRESSED.with(|keys| {
            let mut keys = keys.borrow_mut();
            if let Some(position) = keys.iter().rposition(|&k| k == key) {
                keys.remove(position);
            }
        });
    }
}
