//! Configuration Module - Transactional Heap Tuning Parameters
//!
//! Manages the address-space reservations, growth granularity and the
//! promotion page size of the transactional heap.

use crate::object::address::{nursery_window_start, MAX_SHARED_RESERVE};

/// Main configuration for the transactional heap
///
/// # Examples
///
/// ```rust
/// use stmgc::StmConfig;
///
/// // Use default configuration
/// let config = StmConfig::default();
/// assert!(config.validate().is_ok());
///
/// // Promote objects back to back, without page rounding
/// let config = StmConfig {
///     promotion_page_size: 1,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct StmConfig {
    /// Address space reserved for the shared heap
    ///
    /// Default: 64GB
    pub shared_reserve: usize,

    /// Address space reserved for each worker's nursery
    ///
    /// Every transaction of a worker reuses the same window.
    /// Default: 4GB
    pub nursery_reserve: usize,

    /// Growth granularity of arena backing memory
    ///
    /// Must be a power of two.
    /// Default: 64KB
    pub arena_chunk_size: usize,

    /// Granularity of shared-heap chunks taken by a commit
    ///
    /// Promoted twins are carved out of chunks of at least this size, so
    /// they tend to land on page boundaries. `1` packs twins back to back.
    ///
    /// Default: system page size
    pub promotion_page_size: usize,

    /// Maximum number of concurrently attached worker threads
    ///
    /// Default: 1024
    pub max_workers: u32,

    /// Emit a structured event for every transaction boundary
    ///
    /// Default: false
    pub verbose: bool,

    /// Enable statistics collection
    ///
    /// Default: true
    pub stats_enabled: bool,
}

impl Default for StmConfig {
    fn default() -> Self {
        StmConfig {
            // Address space
            shared_reserve: 64 * GB,
            nursery_reserve: 4 * GB,
            arena_chunk_size: 64 * KB,

            // Commit
            promotion_page_size: page_size::get(),

            // Threading
            max_workers: 1024,

            // Debug
            verbose: false,
            stats_enabled: true,
        }
    }
}

impl StmConfig {
    /// Validate configuration
    ///
    /// Checks that every reservation fits the address-space layout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shared_reserve == 0 {
            return Err(ConfigError::InvalidReserve(
                "shared_reserve must be > 0".to_string(),
            ));
        }

        if self.shared_reserve > MAX_SHARED_RESERVE {
            return Err(ConfigError::InvalidReserve(format!(
                "shared_reserve must be <= {:#x}",
                MAX_SHARED_RESERVE
            )));
        }

        if self.nursery_reserve == 0 {
            return Err(ConfigError::InvalidReserve(
                "nursery_reserve must be > 0".to_string(),
            ));
        }

        if self.arena_chunk_size == 0 || !self.arena_chunk_size.is_power_of_two() {
            return Err(ConfigError::InvalidChunkSize(format!(
                "arena_chunk_size ({}) must be a power of two",
                self.arena_chunk_size
            )));
        }

        if self.promotion_page_size == 0 {
            return Err(ConfigError::InvalidPageSize(
                "promotion_page_size must be >= 1".to_string(),
            ));
        }

        if self.max_workers == 0 {
            return Err(ConfigError::InvalidWorkers(
                "max_workers must be > 0".to_string(),
            ));
        }

        if nursery_window_start(self.max_workers, self.nursery_reserve).is_none() {
            return Err(ConfigError::InvalidWorkers(format!(
                "{} nurseries of {:#x} bytes do not fit the address space",
                self.max_workers, self.nursery_reserve
            )));
        }

        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - STMGC_PROMOTION_PAGE
    /// - STMGC_NURSERY_RESERVE
    /// - STMGC_MAX_WORKERS
    /// - STMGC_VERBOSE
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("STMGC_PROMOTION_PAGE") {
            if let Ok(size) = val.parse::<usize>() {
                config.promotion_page_size = size;
            }
        }

        if let Ok(val) = std::env::var("STMGC_NURSERY_RESERVE") {
            if let Ok(size) = val.parse::<usize>() {
                config.nursery_reserve = size;
            }
        }

        if let Ok(val) = std::env::var("STMGC_MAX_WORKERS") {
            if let Ok(workers) = val.parse::<u32>() {
                config.max_workers = workers;
            }
        }

        if let Ok(val) = std::env::var("STMGC_VERBOSE") {
            config.verbose = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid reserve: {0}")]
    InvalidReserve(String),

    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(String),

    #[error("Invalid page size: {0}")]
    InvalidPageSize(String),

    #[error("Invalid worker count: {0}")]
    InvalidWorkers(String),
}

const KB: usize = 1024;
const GB: usize = 1024 * 1024 * 1024;
