//! # Synchronization Config
//!
//! Tunables for timelines, the server's send cadence and the client's
//! render delay. Loaded once at startup from TOML; every key is optional.
//!
//! ```toml
//! [timeline]
//! capacity = 16
//! accumulate_full_state = false
//!
//! [server]
//! tick_rate = 60
//! send_interval_ticks = 3
//!
//! [client]
//! view_interpolation_time = 0.1
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tideline_shared::{DEFAULT_SEND_INTERVAL_TICKS, DEFAULT_TICK_RATE, DEFAULT_VIEW_INTERPOLATION_TIME, TICK_CAPACITY};

use crate::error::ConfigError;

/// Timeline tunables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Committed snapshots retained before the oldest is evicted.
    pub capacity: usize,
    /// Keep accumulated changes across commits so every snapshot is a full
    /// world state instead of the changes of one tick.
    pub accumulate_full_state: bool,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            capacity: TICK_CAPACITY,
            accumulate_full_state: false,
        }
    }
}

/// Server tunables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSyncConfig {
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// A snapshot goes out every this many ticks.
    pub send_interval_ticks: u32,
}

impl ServerSyncConfig {
    /// Seconds per tick.
    #[must_use]
    pub fn tick_interval(&self) -> f64 {
        1.0 / f64::from(self.tick_rate)
    }
}

impl Default for ServerSyncConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            send_interval_ticks: DEFAULT_SEND_INTERVAL_TICKS,
        }
    }
}

/// Client tunables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSyncConfig {
    /// How far behind the newest snapshot the client renders, in seconds.
    pub view_interpolation_time: f64,
}

impl Default for ClientSyncConfig {
    fn default() -> Self {
        Self {
            view_interpolation_time: DEFAULT_VIEW_INTERPOLATION_TIME,
        }
    }
}

/// Complete synchronization config.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Timeline section.
    pub timeline: TimelineConfig,
    /// Server section.
    pub server: ServerSyncConfig,
    /// Client section.
    pub client: ClientSyncConfig,
}

impl SyncConfig {
    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Fails on malformed TOML or out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or its content is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), ?config, "loaded sync config");
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Names the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeline.capacity < 2 {
            return Err(ConfigError::Invalid {
                field: "timeline.capacity",
                reason: "interpolation needs at least two snapshots",
            });
        }
        if self.server.tick_rate == 0 {
            return Err(ConfigError::Invalid {
                field: "server.tick_rate",
                reason: "must be positive",
            });
        }
        if self.server.send_interval_ticks == 0 {
            return Err(ConfigError::Invalid {
                field: "server.send_interval_ticks",
                reason: "must be positive",
            });
        }
        if !(self.client.view_interpolation_time >= 0.0 && self.client.view_interpolation_time.is_finite()) {
            return Err(ConfigError::Invalid {
                field: "client.view_interpolation_time",
                reason: "must be a non-negative number of seconds",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.timeline.capacity, 16);
        assert!(!config.timeline.accumulate_full_state);
        assert_eq!(config.server.send_interval_ticks, 3);
        assert_eq!(config.server.tick_rate, 60);
        assert!((config.client.view_interpolation_time - 0.1).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SyncConfig::from_toml_str(
            r"
            [timeline]
            capacity = 32

            [client]
            view_interpolation_time = 0.25
            ",
        )
        .unwrap();

        assert_eq!(config.timeline.capacity, 32);
        assert_eq!(config.server, ServerSyncConfig::default());
        assert!((config.client.view_interpolation_time - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_toml() {
        assert_eq!(SyncConfig::from_toml_str("").unwrap(), SyncConfig::default());
    }

    #[test]
    fn test_rejects_out_of_range() {
        let err = SyncConfig::from_toml_str("[timeline]\ncapacity = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "timeline.capacity", .. }));

        let err = SyncConfig::from_toml_str("[server]\nsend_interval_ticks = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "server.send_interval_ticks", .. }));

        let err = SyncConfig::from_toml_str("[client]\nview_interpolation_time = -1.0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "client.view_interpolation_time", .. }));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(
            SyncConfig::from_toml_str("[timeline\ncapacity = 4"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = SyncConfig::load("/nonexistent/tideline.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_tick_interval() {
        let server = ServerSyncConfig {
            tick_rate: 50,
            ..ServerSyncConfig::default()
        };
        assert!((server.tick_interval() - 0.02).abs() < 1e-12);
    }
}
