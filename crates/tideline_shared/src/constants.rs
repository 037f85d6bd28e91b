//! # Protocol Constants
//!
//! Defaults both ends of a connection are built against. Most of them can be
//! overridden at startup through the configuration layer.

/// Number of committed snapshots a timeline retains by default.
///
/// This bounds both rollback depth and the window a delta-encoding
/// reference has to stay alive in.
pub const TICK_CAPACITY: usize = 16;

/// Simulation rate (ticks per second) used by the default server config.
pub const DEFAULT_TICK_RATE: u32 = 60;

/// The server sends a snapshot to each client every this many ticks.
pub const DEFAULT_SEND_INTERVAL_TICKS: u32 = 3;

/// How far behind the newest snapshot a client renders, in seconds.
pub const DEFAULT_VIEW_INTERPOLATION_TIME: f64 = 0.1;
