//! # Sync Server
//!
//! Session glue on the authoritative side.
//!
//! ```text
//!   end_tick(dt)
//!     ├─ drain acks ─────────── last_acknowledged_tick = max(acks)
//!     ├─ timeline.commit(server_time)
//!     └─ every N ticks, per client:
//!          send_snapshot_to_client(latest, downlink, last_acknowledged_tick)
//! ```
//!
//! Clients only ever receive deltas against a tick they acknowledged, so a
//! lost message costs at most one full round trip of bandwidth.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tideline_shared::{ClientId, TickNumber, INVALID_TICK};

use crate::config::{ServerSyncConfig, SyncConfig};
use crate::connector::{DownlinkConnector, QueuedUplinkConnector, UplinkConnector};
use crate::error::{TimelineError, TimelineResult};
use crate::lag::LagCompensationGuard;
use crate::objects::ObjectRegistry;
use crate::timeline::Timeline;

/// Per-client bookkeeping.
pub struct ClientSession {
    downlink: Option<Box<dyn DownlinkConnector + Send>>,
    uplink: QueuedUplinkConnector,
    last_acknowledged_tick: TickNumber,
    last_sent_tick: TickNumber,
    round_trip_time: f64,
    view_interpolation_time: f64,
}

impl ClientSession {
    fn new(view_interpolation_time: f64) -> Self {
        Self {
            downlink: None,
            uplink: QueuedUplinkConnector::new(),
            last_acknowledged_tick: INVALID_TICK,
            last_sent_tick: INVALID_TICK,
            round_trip_time: 0.0,
            view_interpolation_time,
        }
    }

    /// Newest tick the client committed.
    #[must_use]
    pub const fn last_acknowledged_tick(&self) -> TickNumber {
        self.last_acknowledged_tick
    }

    /// Newest tick sent to the client.
    #[must_use]
    pub const fn last_sent_tick(&self) -> TickNumber {
        self.last_sent_tick
    }

    /// Measured round trip time, seconds.
    #[must_use]
    pub const fn round_trip_time(&self) -> f64 {
        self.round_trip_time
    }

    /// How far behind the client renders, seconds.
    #[must_use]
    pub const fn view_interpolation_time(&self) -> f64 {
        self.view_interpolation_time
    }

    /// How far in the past the client sees the world, seconds.
    #[must_use]
    pub fn perceived_lag(&self) -> f64 {
        self.round_trip_time / 2.0 + self.view_interpolation_time
    }

    /// True once a downlink is attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.downlink.is_some()
    }

    fn drain_acknowledgements(&mut self) {
        if let Some(newest) = self.uplink.drain().max() {
            self.last_acknowledged_tick = self.last_acknowledged_tick.max(newest);
        }
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("connected", &self.is_connected())
            .field("last_acknowledged_tick", &self.last_acknowledged_tick)
            .field("last_sent_tick", &self.last_sent_tick)
            .field("round_trip_time", &self.round_trip_time)
            .field("view_interpolation_time", &self.view_interpolation_time)
            .finish_non_exhaustive()
    }
}

/// Authoritative timeline plus client sessions.
#[derive(Debug)]
pub struct SyncServer {
    config: ServerSyncConfig,
    default_view_interpolation_time: f64,
    timeline: Arc<Timeline>,
    clients: BTreeMap<ClientId, ClientSession>,
    next_client_id: u32,
    server_time: f64,
    ticks_since_send: u32,
}

impl SyncServer {
    /// Server with its own timeline.
    #[must_use]
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            config: config.server.clone(),
            default_view_interpolation_time: config.client.view_interpolation_time,
            timeline: Arc::new(Timeline::with_config(config.timeline.clone())),
            clients: BTreeMap::new(),
            next_client_id: 1,
            server_time: 0.0,
            ticks_since_send: 0,
        }
    }

    /// The authoritative timeline. Live objects report their changes here.
    #[must_use]
    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }

    /// Seconds simulated so far.
    #[must_use]
    pub const fn server_time(&self) -> f64 {
        self.server_time
    }

    /// Server tunables.
    #[must_use]
    pub const fn config(&self) -> &ServerSyncConfig {
        &self.config
    }

    /// Opens a session. The client receives nothing until a downlink is set.
    pub fn add_client(&mut self) -> ClientId {
        let id = ClientId(self.next_client_id);
        self.next_client_id += 1;
        self.clients
            .insert(id, ClientSession::new(self.default_view_interpolation_time));
        tracing::debug!(client = %id, "client added");
        id
    }

    /// Closes a session. Returns false if it did not exist.
    pub fn remove_client(&mut self, id: ClientId) -> bool {
        let removed = self.clients.remove(&id).is_some();
        if removed {
            tracing::debug!(client = %id, "client removed");
        }
        removed
    }

    /// Session of a client.
    #[must_use]
    pub fn client(&self, id: ClientId) -> Option<&ClientSession> {
        self.clients.get(&id)
    }

    /// Connected client ids.
    pub fn client_ids(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.clients.keys().copied()
    }

    /// Attaches where snapshots for `id` go.
    ///
    /// # Errors
    ///
    /// [`TimelineError::UnknownClient`] if there is no session.
    pub fn set_client_downlink(
        &mut self,
        id: ClientId,
        downlink: Box<dyn DownlinkConnector + Send>,
    ) -> TimelineResult<()> {
        let session = self.clients.get_mut(&id).ok_or(TimelineError::UnknownClient(id))?;
        session.downlink = Some(downlink);
        Ok(())
    }

    /// Where acknowledgements from `id` should be delivered.
    #[must_use]
    pub fn uplink_for_client(&self, id: ClientId) -> Option<Arc<dyn UplinkConnector>> {
        self.clients
            .get(&id)
            .map(|session| Arc::new(session.uplink.clone()) as Arc<dyn UplinkConnector>)
    }

    /// Records latency figures reported for `id`.
    ///
    /// # Errors
    ///
    /// [`TimelineError::UnknownClient`] if there is no session.
    pub fn update_client_latency(
        &mut self,
        id: ClientId,
        round_trip_time: f64,
        view_interpolation_time: f64,
    ) -> TimelineResult<()> {
        let session = self.clients.get_mut(&id).ok_or(TimelineError::UnknownClient(id))?;
        session.round_trip_time = round_trip_time.max(0.0);
        session.view_interpolation_time = view_interpolation_time.max(0.0);
        Ok(())
    }

    /// Closes the current tick after `dt` seconds of simulation.
    ///
    /// Takes `&mut self`, so no [`LagCompensationGuard`] obtained from this
    /// server can be alive here.
    ///
    /// # Errors
    ///
    /// Fails if the commit or a send fails.
    pub fn end_tick(&mut self, dt: f64) -> TimelineResult<TickNumber> {
        self.server_time += dt;
        for session in self.clients.values_mut() {
            session.drain_acknowledgements();
        }

        let tick = self.timeline.commit(self.server_time)?;
        self.ticks_since_send += 1;
        if self.ticks_since_send >= self.config.send_interval_ticks {
            self.ticks_since_send = 0;
            self.send_to_clients(tick)?;
        }
        Ok(tick)
    }

    /// Closes the current tick after one fixed step of
    /// [`ServerSyncConfig::tick_interval`] seconds.
    ///
    /// # Errors
    ///
    /// As [`end_tick`](Self::end_tick).
    pub fn step(&mut self) -> TimelineResult<TickNumber> {
        self.end_tick(self.config.tick_interval())
    }

    fn send_to_clients(&mut self, tick: TickNumber) -> TimelineResult<()> {
        for (id, session) in &mut self.clients {
            let Some(downlink) = session.downlink.as_deref() else {
                continue;
            };
            let summary = self
                .timeline
                .send_snapshot_to_client(tick, downlink, session.last_acknowledged_tick)?;
            session.last_sent_tick = tick;
            tracing::trace!(
                client = %id,
                tick,
                reference = summary.reference_tick,
                changes = summary.discrete_change_count,
                "sent snapshot"
            );
        }
        Ok(())
    }

    /// Rewinds `registry` to what `id` saw when acting now.
    ///
    /// The target is `server_time - (rtt / 2 + view_interpolation_time)`.
    ///
    /// # Errors
    ///
    /// [`TimelineError::UnknownClient`] if there is no session, or any error
    /// of [`Timeline::begin_rollback`].
    pub fn begin_rollback_for_client<'a, R: ObjectRegistry + ?Sized>(
        &'a self,
        id: ClientId,
        registry: &'a mut R,
    ) -> TimelineResult<LagCompensationGuard<'a, R>> {
        let session = self.clients.get(&id).ok_or(TimelineError::UnknownClient(id))?;
        self.timeline
            .begin_rollback(self.server_time - session.perceived_lag(), registry)
    }
}
