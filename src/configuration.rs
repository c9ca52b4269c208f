//! Configuration types holding the sizing parameters of a per-destination pool.
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use std::time::Duration;

/// The sweep period used when `check_interval_millis` is left unspecified.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5);
/// The idle threshold used when `idle_timeout_millis` is left unspecified.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
/// Sizing and maintenance parameters shared by every destination of a
/// [`Manager`](crate::manager::Manager).
///
/// Each destination gets its own pool, and each pool gets its own copy of these settings.
///
/// The counts must satisfy `init_count <= min_count <= max_count` and `max_count > 0`.
/// Pools do not check this themselves: call [`PoolSettings::validate`] (or build the manager
/// through [`Manager::builder`](crate::manager::Manager::builder), which does it for you).
pub struct PoolSettings {
    /// Connections dialed eagerly when the pool for a destination is created.
    #[serde(default, deserialize_with = "deserialize_number_from_string")]
    pub init_count: usize,
    /// The floor the maintenance loop tries to keep open.
    #[serde(default, deserialize_with = "deserialize_number_from_string")]
    pub min_count: usize,
    /// Hard ceiling on open connections to a single destination.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_count: usize,
    /// Period of the maintenance sweep, in milliseconds.
    pub check_interval_millis: Option<u64>,
    /// How long a released connection may sit unused before it is considered stale,
    /// in milliseconds.
    pub idle_timeout_millis: Option<u64>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            init_count: 0,
            min_count: 0,
            max_count: 10,
            check_interval_millis: None,
            idle_timeout_millis: None,
        }
    }
}

impl PoolSettings {
    /// Retrieve the period of the maintenance sweep.
    /// Zero or unspecified falls back to [`DEFAULT_CHECK_INTERVAL`].
    pub fn check_interval(&self) -> Duration {
        self.check_interval_millis
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CHECK_INTERVAL)
    }

    /// Retrieve the idle threshold.
    /// Zero or unspecified falls back to [`DEFAULT_IDLE_TIMEOUT`].
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout_millis
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_IDLE_TIMEOUT)
    }

    /// Check the ordering constraints between the counts.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_count == 0 {
            return Err(ConfigurationError::ZeroMaxCount);
        }
        if self.init_count > self.min_count {
            return Err(ConfigurationError::InitAboveMin {
                init_count: self.init_count,
                min_count: self.min_count,
            });
        }
        if self.min_count > self.max_count {
            return Err(ConfigurationError::MinAboveMax {
                min_count: self.min_count,
                max_count: self.max_count,
            });
        }
        Ok(())
    }
}

/// Returned by [`PoolSettings::validate`] when the counts are inconsistent.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("max_count must be greater than zero")]
    ZeroMaxCount,
    #[error("init_count ({init_count}) must not exceed min_count ({min_count})")]
    InitAboveMin { init_count: usize, min_count: usize },
    #[error("min_count ({min_count}) must not exceed max_count ({max_count})")]
    MinAboveMax { min_count: usize, max_count: usize },
}
