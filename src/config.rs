//! Configuration for maps and the anchor service
//!
//! Configuration types follow the same conventions everywhere: a `Default` that
//! is safe for typical workloads, presets for common shapes, `validate()` for
//! explicit checking, and `from_env()` initialization under the `GEOPIN_` prefix.

use crate::error::{GeopinError, Result};

/// Environment variable prefix used by [`MapConfig::from_env`] and
/// [`ServiceConfig::from_env`].
pub const ENV_PREFIX: &str = "GEOPIN_";

/// Configuration for [`StableHashMap`](crate::hash_map::StableHashMap)
#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Initial capacity in entries (bucket count is derived; 0 defers allocation
    /// to the first insert)
    pub initial_capacity: usize,
    /// Load factor in (0.0, 1.0); out-of-range values are clamped to the default
    pub load_factor: f32,
}

/// Default load factor, matching the occupancy the chained layout is tuned for
pub const DEFAULT_LOAD_FACTOR: f32 = 0.7;

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 16,
            load_factor: DEFAULT_LOAD_FACTOR,
        }
    }
}

impl MapConfig {
    /// Config for small maps (a handful of in-flight requests)
    pub fn small() -> Self {
        Self {
            initial_capacity: 8,
            load_factor: DEFAULT_LOAD_FACTOR,
        }
    }

    /// Config for high-churn workloads (frequent insert/remove); the lower load
    /// factor keeps collision chains short while slots recycle
    pub fn high_churn() -> Self {
        Self {
            initial_capacity: 64,
            load_factor: 0.6,
        }
    }

    /// Return the load factor, substituting the default when the configured
    /// value is outside (0.0, 1.0) or not finite
    pub fn effective_load_factor(&self) -> f32 {
        if self.load_factor > 0.0 && self.load_factor < 1.0 && self.load_factor.is_finite() {
            self.load_factor
        } else {
            DEFAULT_LOAD_FACTOR
        }
    }

    /// Validate the configuration without clamping
    pub fn validate(&self) -> Result<()> {
        if !(self.load_factor > 0.0 && self.load_factor < 1.0) || !self.load_factor.is_finite() {
            return Err(GeopinError::configuration(format!(
                "load_factor {} must be in (0.0, 1.0)",
                self.load_factor
            )));
        }
        Ok(())
    }

    /// Initialize from `GEOPIN_MAP_INITIAL_CAPACITY` and `GEOPIN_MAP_LOAD_FACTOR`,
    /// falling back to defaults for unset variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(cap) = env_parse::<usize>("MAP_INITIAL_CAPACITY")? {
            config.initial_capacity = cap;
        }
        if let Some(lf) = env_parse::<f32>("MAP_LOAD_FACTOR")? {
            config.load_factor = lf;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Configuration for [`AnchorService`](crate::anchor::AnchorService)
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Capacity of the command channel between clients and the service loop
    pub queue_capacity: usize,
    /// Configuration for the pending-request tables
    pub map: MapConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            map: MapConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(GeopinError::configuration("queue_capacity must be nonzero"));
        }
        self.map.validate()
    }

    /// Initialize from `GEOPIN_QUEUE_CAPACITY` plus the [`MapConfig`] variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self {
            queue_capacity: 64,
            map: MapConfig::from_env()?,
        };
        if let Some(cap) = env_parse::<usize>("QUEUE_CAPACITY")? {
            config.queue_capacity = cap;
        }
        config.validate()?;
        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    let var = format!("{}{}", ENV_PREFIX, name);
    match std::env::var(&var) {
        Ok(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            GeopinError::configuration(format!("{} has unparseable value {:?}", var, raw))
        }),
        Err(_) => Ok(None),
    }
}
