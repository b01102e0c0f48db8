use std::env;

use crate::{error::Error, freelist::{MAX_BIG_SIZE, SMALL_UNIT}, region::DEFAULT_REGION_SIZE};

/// Environment variable overriding [`Config::region_size`], in bytes.
pub const REGION_SIZE_VAR: &str = "NATIVEMEM_REGION_SIZE";

/// Allocator tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Size of every raw region requested from the platform.
    pub region_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self { region_size: DEFAULT_REGION_SIZE }
    }
}

impl Config {
    /// Default config with [`REGION_SIZE_VAR`] applied on top. Values that are not
    /// plain decimal numbers are ignored.
    pub fn from_env() -> Self {
        Self::from_region_size_var(env::var(REGION_SIZE_VAR).ok().as_deref())
    }

    /// Default config with the raw value of [`REGION_SIZE_VAR`], if set, applied on top.
    fn from_region_size_var(value: Option<&str>) -> Self {
        let mut config = Self::default();

        if let Some(size) = value.and_then(|val| val.trim().parse().ok()) {
            config.region_size = size;
        }

        config
    }

    /// A region has to fit the biggest in-regime chunk and keep every chunk
    /// carved from it 8 byte aligned.
    pub fn validate(&self) -> Result<(), Error> {
        if self.region_size < MAX_BIG_SIZE || self.region_size % SMALL_UNIT != 0 {
            return Err(Error::InvalidRegionSize { size: self.region_size });
        }

        Ok(())
    }
}
