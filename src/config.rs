//! Memory configuration
//!
//! Loaded from an optional TOML file, overridden by `PHOTONMEM_*`
//! environment variables.
//!
//! ```toml
//! slab_buffer_size = 4096
//! chain_increment = 8
//! max_chain_length = 1048568
//! byte_order = "little"
//! ```

use crate::error::{Error, Result};
use crate::memory::address::CHAIN_LENGTH_BOUND;
use crate::memory::primitive::ByteOrder;
use crate::memory::size_class::{DEFAULT_CHAIN_INCREMENT, DEFAULT_SLAB_BUFFER_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of environment overrides, e.g. `PHOTONMEM_CHAIN_INCREMENT`
pub const ENV_PREFIX: &str = "PHOTONMEM";

const MIN_SLAB_BUFFER_SIZE: usize = 1024;
const MAX_SLAB_BUFFER_SIZE: usize = 65536;
const MAX_CHAIN_INCREMENT: usize = 1024;

/// Allocator tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Target slab size that slot counts are derived from
    pub slab_buffer_size: usize,
    /// Chain positions added when every slab of a size class is full
    pub chain_increment: usize,
    /// Chain length at which growth fails
    pub max_chain_length: usize,
    /// Byte order of typed accessors
    pub byte_order: ByteOrder,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            slab_buffer_size: DEFAULT_SLAB_BUFFER_SIZE,
            chain_increment: DEFAULT_CHAIN_INCREMENT,
            max_chain_length: CHAIN_LENGTH_BOUND,
            byte_order: ByteOrder::NATIVE,
        }
    }
}

impl MemoryConfig {
    /// Load configuration from an optional file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| Error::Config(format!("Failed to load configuration: {}", e)))?;

        let config: MemoryConfig = settings
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml(source: &str) -> Result<Self> {
        let config: MemoryConfig = toml::from_str(source)
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize configuration: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_SLAB_BUFFER_SIZE..=MAX_SLAB_BUFFER_SIZE).contains(&self.slab_buffer_size) {
            return Err(Error::Config(format!(
                "slab_buffer_size must be within {}..={}, got {}",
                MIN_SLAB_BUFFER_SIZE, MAX_SLAB_BUFFER_SIZE, self.slab_buffer_size
            )));
        }

        if !(1..=MAX_CHAIN_INCREMENT).contains(&self.chain_increment) {
            return Err(Error::Config(format!(
                "chain_increment must be within 1..={}, got {}",
                MAX_CHAIN_INCREMENT, self.chain_increment
            )));
        }

        if !(self.chain_increment..=CHAIN_LENGTH_BOUND).contains(&self.max_chain_length) {
            return Err(Error::Config(format!(
                "max_chain_length must be within {}..={}, got {}",
                self.chain_increment, CHAIN_LENGTH_BOUND, self.max_chain_length
            )));
        }

        Ok(())
    }
}
