//! # Sync Client
//!
//! Drives interpolated apply on the receiving side.
//!
//! The render clock runs `view_interpolation_time` behind the newest
//! snapshot so that there is usually a pair to interpolate between. It
//! advances with the frame time and is snapped back into the retained
//! window whenever it leaves it.
//!
//! ```text
//!   oldest                         latest
//!     [#]──[#]──[#]──[#]──[#]──[#]──[#]
//!                           ▲        │
//!                 render ───┘◀───────┘ view_interpolation_time
//! ```

use std::sync::Arc;

use crate::config::{ClientSyncConfig, SyncConfig};
use crate::error::TimelineResult;
use crate::objects::ObjectRegistry;
use crate::timeline::Timeline;

/// Receiving timeline plus render clock.
#[derive(Debug)]
pub struct SyncClient {
    config: ClientSyncConfig,
    timeline: Arc<Timeline>,
    render_time: Option<f64>,
}

impl SyncClient {
    /// Client with its own timeline.
    #[must_use]
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            config: config.client.clone(),
            timeline: Arc::new(Timeline::with_config(config.timeline.clone())),
            render_time: None,
        }
    }

    /// The receiving timeline. Incoming messages are dispatched into it.
    #[must_use]
    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }

    /// Current render time, once the first snapshot has been applied.
    #[must_use]
    pub const fn render_time(&self) -> Option<f64> {
        self.render_time
    }

    /// Render delay, seconds.
    #[must_use]
    pub const fn view_interpolation_time(&self) -> f64 {
        self.config.view_interpolation_time
    }

    /// Changes the render delay. Takes effect at the next clock reset.
    pub fn set_view_interpolation_time(&mut self, seconds: f64) {
        self.config.view_interpolation_time = seconds.max(0.0);
    }

    /// Forgets the render clock, e.g. after the timeline was reset.
    pub fn reset_clock(&mut self) {
        self.render_time = None;
    }

    /// Advances the render clock by `dt` and applies the state at it.
    ///
    /// Returns the number of objects written; zero while nothing has been
    /// received.
    ///
    /// # Errors
    ///
    /// Fails if the timeline cannot reconstruct the render time.
    pub fn update<R: ObjectRegistry + ?Sized>(&mut self, dt: f64, registry: &mut R) -> TimelineResult<usize> {
        let (Some(oldest), Some(latest)) = (self.timeline.oldest_realtime(), self.timeline.latest_realtime()) else {
            return Ok(0);
        };

        let time = match self.render_time.map(|time| time + dt) {
            Some(time) if (oldest..=latest).contains(&time) => time,
            previous => {
                let reset = (latest - self.config.view_interpolation_time).max(oldest);
                tracing::debug!(?previous, reset, oldest, latest, "render clock reset");
                reset
            }
        };
        self.render_time = Some(time);
        self.timeline.apply(time, registry)
    }
}
