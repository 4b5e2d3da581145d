//! Configuration for CellDB
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Main configuration for a CellDB store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Backing file. Relative paths resolve against the working directory.
    pub path: PathBuf,

    /// How the file is pre-sized when a record is created
    pub growth: GrowthPolicy,

    // -------------------------------------------------------------------------
    // Free List Configuration
    // -------------------------------------------------------------------------
    /// Try the free list before extending the file when creating records
    pub reuse_freed: bool,

    // -------------------------------------------------------------------------
    // Flush Configuration
    // -------------------------------------------------------------------------
    /// Worker threads used to write dirty pages back in parallel
    pub flush_workers: usize,
}

/// File growth policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthPolicy {
    /// The file grows only as far as pages are actually written
    Exact,

    /// Record creation pre-sizes the file to the next power of two
    PowerOfTwo,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./celldb.dat"),
            growth: GrowthPolicy::Exact,
            reuse_freed: true,
            flush_workers: 4,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the backing file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set the growth policy
    pub fn growth(mut self, growth: GrowthPolicy) -> Self {
        self.config.growth = growth;
        self
    }

    /// Enable or disable free list reuse on record creation
    pub fn reuse_freed(mut self, reuse: bool) -> Self {
        self.config.reuse_freed = reuse;
        self
    }

    /// Set the number of flush worker threads (at least one is used)
    pub fn flush_workers(mut self, workers: usize) -> Self {
        self.config.flush_workers = workers;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
