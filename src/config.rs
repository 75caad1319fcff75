//! Engine configuration for HeapDB
//!
//! Everything tunable at runtime lives in [`DbConfig`]. The page size and the
//! fixed string width are compile-time constants because the on-disk format
//! depends on them.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::eviction::EvictionKind;

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Maximum number of bytes stored for a STRING field
pub const STRING_LEN: usize = 128;

/// Default number of pages cached by the buffer pool
pub const DEFAULT_POOL_PAGES: usize = 50;

/// Default number of left rows buffered per hash-join block
pub const DEFAULT_JOIN_BLOCK_ROWS: usize = 20_000;

/// Default number of histogram buckets per column
pub const DEFAULT_HISTOGRAM_BUCKETS: usize = 100;

/// Default cost charged for reading one page
pub const DEFAULT_IO_COST_PER_PAGE: f64 = 1000.0;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Maximum number of pages held by the buffer pool
    pub buffer_pool_pages: usize,
    /// Victim selection policy used when the pool is full
    pub eviction: EvictionKind,
    /// Left rows buffered per hash-join block
    pub join_block_rows: usize,
    /// Buckets per column histogram
    pub histogram_buckets: usize,
    /// Cost of a single page read, consumed by scan cost estimates
    pub io_cost_per_page: f64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            buffer_pool_pages: DEFAULT_POOL_PAGES,
            eviction: EvictionKind::Lru,
            join_block_rows: DEFAULT_JOIN_BLOCK_ROWS,
            histogram_buckets: DEFAULT_HISTOGRAM_BUCKETS,
            io_cost_per_page: DEFAULT_IO_COST_PER_PAGE,
        }
    }
}

impl DbConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the buffer pool capacity in pages
    pub fn buffer_pool_pages(mut self, pages: usize) -> Self {
        self.buffer_pool_pages = pages;
        self
    }

    /// Set the eviction policy
    pub fn eviction(mut self, eviction: EvictionKind) -> Self {
        self.eviction = eviction;
        self
    }

    /// Set the hash-join block size
    pub fn join_block_rows(mut self, rows: usize) -> Self {
        self.join_block_rows = rows;
        self
    }

    /// Set the number of histogram buckets
    pub fn histogram_buckets(mut self, buckets: usize) -> Self {
        self.histogram_buckets = buckets;
        self
    }

    /// Set the per-page I/O cost
    pub fn io_cost_per_page(mut self, cost: f64) -> Self {
        self.io_cost_per_page = cost;
        self
    }

    /// Parse a config from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: DbConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.buffer_pool_pages == 0 {
            return Err(Error::InvalidArgument(
                "buffer_pool_pages must be > 0".to_string(),
            ));
        }
        if self.join_block_rows == 0 {
            return Err(Error::InvalidArgument(
                "join_block_rows must be > 0".to_string(),
            ));
        }
        if self.histogram_buckets == 0 {
            return Err(Error::InvalidArgument(
                "histogram_buckets must be > 0".to_string(),
            ));
        }
        if !(self.io_cost_per_page >= 0.0) {
            return Err(Error::InvalidArgument(
                "io_cost_per_page must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}
