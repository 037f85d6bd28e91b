//! # Tideline Net
//!
//! Tick-indexed state synchronization between an authoritative server and
//! its clients.
//!
//! ## Architecture
//!
//! ```text
//! SERVER                                             CLIENT
//!   live objects                                       live objects
//!     │ object_states_changed                             ▲ apply(render time)
//!     ▼                                                   │
//!   Timeline ──commit()──▶ [#40][#41][#42]         [#38][#39][#40] Timeline
//!     │                                                   ▲
//!     └─ send_snapshot_to_client(#42, ref #39) ──────────┘ incoming_* / confirm
//!           one message per changed object,                 reassembled, merged
//!           then one confirmation                           over #39, acked
//! ```
//!
//! - [`Timeline`]: bounded snapshot history in both roles
//! - [`LagCompensationGuard`]: live objects rewound to what a client saw
//! - [`protocol`]: byte codec for the per-tick messages
//! - [`SyncServer`] / [`SyncClient`]: send cadence, acks and render clock
//! - [`savegame`]: complete snapshots gated by the SAVED flag
//!
//! The crate owns no transport and no live objects. Bytes leave and enter
//! through connectors; objects are reached through an [`ObjectRegistry`].

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod connector;
pub mod error;
pub mod lag;
pub mod objects;
pub mod protocol;
pub mod savegame;
pub mod server;
pub mod snapshot;
pub mod timeline;

pub use client::SyncClient;
pub use config::{ClientSyncConfig, ServerSyncConfig, SyncConfig, TimelineConfig};
pub use connector::{DownlinkConnector, LocalDownlink, QueuedUplinkConnector, UplinkConnector};
pub use error::{
    ConfigError, ProtocolError, ProtocolResult, SavegameError, SavegameResult, TimelineError, TimelineResult,
};
pub use lag::LagCompensationGuard;
pub use objects::{ObjectRegistry, ObjectTable};
pub use protocol::{decode_message, dispatch_downlink, dispatch_uplink, encode_message, Message, MessageType};
pub use savegame::{read_savegame, write_savegame};
pub use server::{ClientSession, SyncServer};
pub use snapshot::{Confirmation, Snapshot};
pub use timeline::{SendSummary, Timeline, TrackingSuppression};
