//! Registry configuration.
//!
//! Rate limits, initial container capacities and pool sizing. Values can be
//! built in code or loaded from TOML:
//!
//! ```toml
//! max_clones_per_tick = 32
//! max_callbacks_per_tick = 128
//! immediate_delay_ms = 10
//!
//! [capacity]
//! surfaces = 8
//! tiles_per_surface = 256
//! bucket = 16
//! pool_retain = 64
//! ```
//!
//! A rate limit of `0` means unbounded. Capacity changes only take effect on
//! the next full rescan, because resizing rebuilds every index.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::error::ConfigError;


/// Initial sizes for indices and pooled containers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    /// Expected number of occupied surfaces.
    pub surfaces: usize,
    /// Initial capacity of each surface's position map.
    pub tiles_per_surface: usize,
    /// Initial capacity of tag, type and capability buckets.
    pub bucket: usize,
    /// Maximum number of released values each pool keeps.
    pub pool_retain: usize,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            surfaces: 8,
            tiles_per_surface: 256,
            bucket: 16,
            pool_retain: 64,
        }
    }
}

/// Registry configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Clone requests processed per tick while running; `0` is unbounded.
    pub max_clones_per_tick: usize,
    /// Deferred callbacks processed per tick while running; `0` is unbounded.
    pub max_callbacks_per_tick: usize,
    /// Delays shorter than this many milliseconds skip the timer and run on
    /// the next tick.
    pub immediate_delay_ms: u64,
    /// Container sizing.
    pub capacity: CapacityConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_clones_per_tick: 32,
            max_callbacks_per_tick: 128,
            immediate_delay_ms: 10,
            capacity: CapacityConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Parses a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }

    /// Effective clone limit, `None` meaning unbounded.
    pub fn clone_limit(&self) -> Option<usize> {
        coerce_limit(self.max_clones_per_tick)
    }

    /// Effective callback limit, `None` meaning unbounded.
    pub fn callback_limit(&self) -> Option<usize> {
        coerce_limit(self.max_callbacks_per_tick)
    }

    /// Threshold below which delayed callbacks go straight to the queue.
    pub fn immediate_delay(&self) -> Duration {
        Duration::from_millis(self.immediate_delay_ms)
    }
}

#[inline]
fn coerce_limit(limit: usize) -> Option<usize> {
    if limit == 0 { None } else { Some(limit) }
}
