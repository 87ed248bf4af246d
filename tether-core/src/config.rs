//! Runtime configuration
//!
//! Sizes and timings for the loader and scheduler plus the identity sent in
//! the connect banner. With the `serde` feature the configuration can be
//! stored as postcard binary data.

use heapless::String;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use tether_protocol::buffer::{DEFAULT_INITIAL_SIZE, DEFAULT_MAX_SIZE};
use tether_protocol::FramedBuffer;

use crate::scheduler::DEFAULT_IDLE_SLEEP_MS;

/// Current binary layout version
pub const CONFIG_FORMAT: u8 = 1;

/// Maximum length of the banner name and version
pub const MAX_IDENT_LEN: usize = 16;

/// Suggested sleep while the link is idle (ms)
pub const DEFAULT_POLL_SLEEP_MS: u32 = 50;

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Serialization failed (buffer too small)
    Serialize,
    /// Deserialization failed
    Deserialize,
    /// Stored layout version does not match
    VersionMismatch,
    /// Loader sizes are inconsistent
    InvalidLoader,
}

/// Command loader sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LoaderConfig {
    /// Upper bound on one command, raw blocks included (bytes)
    pub max_size: u32,
    /// Initial buffer allocation (bytes)
    pub initial_size: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE as u32,
            initial_size: DEFAULT_INITIAL_SIZE as u32,
        }
    }
}

impl LoaderConfig {
    /// Growable buffer sized by this configuration
    pub fn buffer(&self) -> FramedBuffer {
        FramedBuffer::growable(self.initial_size as usize, self.max_size as usize)
    }
}

/// Scheduler timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SchedulerConfig {
    /// Sleep suggested by a tick when nothing is scheduled (ms)
    pub idle_sleep_ms: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_sleep_ms: DEFAULT_IDLE_SLEEP_MS,
        }
    }
}

/// Complete runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RuntimeConfig {
    /// Layout version
    pub format: u8,
    pub loader: LoaderConfig,
    pub scheduler: SchedulerConfig,
    /// Sleep suggested by the service loop when no input arrived (ms)
    pub poll_sleep_ms: u32,
    /// Name sent in the connect banner
    pub name: String<MAX_IDENT_LEN>,
    /// Version sent in the connect banner
    pub version: String<MAX_IDENT_LEN>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let mut name = String::new();
        let _ = name.push_str("tether");
        let mut version = String::new();
        let _ = version.push_str(env!("CARGO_PKG_VERSION"));
        Self {
            format: CONFIG_FORMAT,
            loader: LoaderConfig::default(),
            scheduler: SchedulerConfig::default(),
            poll_sleep_ms: DEFAULT_POLL_SLEEP_MS,
            name,
            version,
        }
    }
}

impl RuntimeConfig {
    /// Check internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.format != CONFIG_FORMAT {
            return Err(ConfigError::VersionMismatch);
        }
        if self.loader.max_size == 0 || self.loader.initial_size > self.loader.max_size {
            return Err(ConfigError::InvalidLoader);
        }
        Ok(())
    }

    /// Serialize into `buf`, returning the used prefix
    #[cfg(feature = "serde")]
    pub fn to_slice<'b>(&self, buf: &'b mut [u8]) -> Result<&'b mut [u8], ConfigError> {
        postcard::to_slice(self, buf).map_err(|_| ConfigError::Serialize)
    }

    /// Deserialize and validate
    #[cfg(feature = "serde")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Deserialize)?;
        config.validate()?;
        Ok(config)
    }
}
