//! # Tideline Shared
//!
//! Common types used by both the authoritative server and its clients.
//!
//! ## Contents
//!
//! - [`math`]: `Vec3` and `Quaternion`, the value types carried by object states
//! - [`ids`]: tick numbers, object and client identifiers
//! - [`constants`]: protocol-wide constants both sides must agree on

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod ids;
pub mod math;

pub use constants::{
    DEFAULT_SEND_INTERVAL_TICKS, DEFAULT_TICK_RATE, DEFAULT_VIEW_INTERPOLATION_TIME, TICK_CAPACITY,
};
pub use ids::{ClientId, ObjectId, TickNumber, FIRST_TICK, INVALID_TICK};
pub use math::{Quaternion, Vec3};
