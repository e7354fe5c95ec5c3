//! Runtime configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use strand_runtime::RuntimeConfig;
//!
//! // Defaults with env overrides
//! let config = RuntimeConfig::from_env();
//!
//! // Or customize programmatically
//! let config = RuntimeConfig::from_env()
//!     .stack_size(256 * 1024)
//!     .max_strands(4096);
//! ```

use strand_core::constants;
use strand_core::env::{env_get, env_get_bool};

/// Page size the slab layout is validated against
pub const PAGE_SIZE: usize = 4096;

/// Runtime configuration with builder pattern
///
/// Use `from_env()` to start from compile-time defaults and apply any
/// environment variable overrides.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Usable stack bytes per strand
    pub stack_size: usize,
    /// Guard bytes following each usable area
    pub guard_size: usize,
    /// Maximum number of stacks the slab can hand out
    pub max_stacks: usize,
    /// Maximum number of live strand records
    pub max_strands: usize,
    /// Per-context stack cache watermark
    pub stack_cache: usize,
    /// Idle spin rounds before the scheduler starts sleeping
    pub idle_spins: u32,
    /// Enable debug logging in the scheduler hot paths
    pub debug_logging: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Compile-time defaults with environment overrides
    ///
    /// Environment variables (all optional):
    /// - `STRAND_STACK_SIZE` - usable stack bytes per strand
    /// - `STRAND_GUARD_SIZE` - guard bytes per stack
    /// - `STRAND_MAX_STACKS` - stack slab capacity
    /// - `STRAND_MAX_STRANDS` - strand record capacity
    /// - `STRAND_STACK_CACHE` - per-context cache watermark
    /// - `STRAND_IDLE_SPINS` - idle spins before sleeping
    /// - `STRAND_DEBUG` - scheduler debug logging (0/1)
    pub fn from_env() -> Self {
        Self {
            stack_size: env_get("STRAND_STACK_SIZE", constants::STACK_SIZE),
            guard_size: env_get("STRAND_GUARD_SIZE", constants::GUARD_SIZE),
            max_stacks: env_get("STRAND_MAX_STACKS", constants::MAX_STRANDS),
            max_strands: env_get("STRAND_MAX_STRANDS", constants::MAX_STRANDS),
            stack_cache: env_get("STRAND_STACK_CACHE", constants::STACK_CACHE),
            idle_spins: env_get("STRAND_IDLE_SPINS", 10u32),
            debug_logging: env_get_bool("STRAND_DEBUG", false),
        }
    }

    /// Explicit defaults, no env override. Useful for tests.
    pub fn new() -> Self {
        Self {
            stack_size: constants::STACK_SIZE,
            guard_size: constants::GUARD_SIZE,
            max_stacks: constants::MAX_STRANDS,
            max_strands: constants::MAX_STRANDS,
            stack_cache: constants::STACK_CACHE,
            idle_spins: 10,
            debug_logging: false,
        }
    }

    // Builder methods

    pub fn stack_size(mut self, n: usize) -> Self {
        self.stack_size = n;
        self
    }

    pub fn guard_size(mut self, n: usize) -> Self {
        self.guard_size = n;
        self
    }

    pub fn max_stacks(mut self, n: usize) -> Self {
        self.max_stacks = n;
        self
    }

    pub fn max_strands(mut self, n: usize) -> Self {
        self.max_strands = n;
        self
    }

    pub fn stack_cache(mut self, n: usize) -> Self {
        self.stack_cache = n;
        self
    }

    pub fn idle_spins(mut self, n: u32) -> Self {
        self.idle_spins = n;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stack_size == 0 || self.stack_size % PAGE_SIZE != 0 {
            return Err(ConfigError::InvalidValue(
                "stack_size must be a non-zero page multiple",
            ));
        }
        if self.guard_size == 0 || self.guard_size % PAGE_SIZE != 0 {
            return Err(ConfigError::InvalidValue(
                "guard_size must be a non-zero page multiple",
            ));
        }
        if self.max_stacks == 0 {
            return Err(ConfigError::InvalidValue("max_stacks must be > 0"));
        }
        if self.max_strands == 0 {
            return Err(ConfigError::InvalidValue("max_strands must be > 0"));
        }
        if self.max_strands > strand_core::constants::STRAND_NONE as usize {
            return Err(ConfigError::InvalidValue(
                "max_strands must fit below the id sentinel",
            ));
        }
        if self.stack_cache == 0 {
            return Err(ConfigError::InvalidValue("stack_cache must be > 0"));
        }
        Ok(())
    }
}

/// Configuration error
#[derive(Debug, Clone)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let config = RuntimeConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.stack_size, 128 * 1024);
        assert_eq!(config.guard_size, 128 * 1024);
    }

    #[test]
    fn test_builder() {
        let config = RuntimeConfig::new()
            .stack_size(64 * 1024)
            .max_strands(128)
            .debug_logging(true);

        assert_eq!(config.stack_size, 64 * 1024);
        assert_eq!(config.max_strands, 128);
        assert!(config.debug_logging);
    }

    #[test]
    fn test_validation() {
        let config = RuntimeConfig::new().stack_size(1000);
        assert!(config.validate().is_err());

        let config = RuntimeConfig::new().guard_size(0);
        assert!(config.validate().is_err());

        let config = RuntimeConfig::new().max_strands(0);
        assert!(config.validate().is_err());
    }
}
