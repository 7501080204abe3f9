//! # Cache Configuration
//!
//! The five options the cache core consumes. Loading them from files,
//! environment, or CLI flags belongs to the embedding system; this type is
//! the boundary.
//!
//! | option           | effect                                             |
//! |------------------|----------------------------------------------------|
//! | `cache_location` | path to the data region file                       |
//! | `cache_size`     | bytes to map for the data region                   |
//! | `index_location` | path to the index region file                      |
//! | `index_size`     | bytes to map for the index region                  |
//! | `enabled`        | if false, every lookup misses and nothing is mapped|

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub cache_location: PathBuf,
    pub cache_size: u64,
    pub index_location: PathBuf,
    pub index_size: u64,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_location: PathBuf::new(),
            cache_size: 0,
            index_location: PathBuf::new(),
            index_size: 0,
            enabled: true,
        }
    }
}
