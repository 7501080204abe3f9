//! # Storage Module
//!
//! The storage layer wraps the two memory-mapped region files the cache is
//! built on. Unlike a pager, there is no page granularity here: the index
//! and data regions are flat byte images addressed by absolute offsets, so
//! the layer exposes exactly the primitives the lookup path needs, namely
//! bounded random-access reads of fixed-width integers and byte ranges.
//!
//! ## Region Lifecycle
//!
//! ```text
//! offline writer          reader process
//! --------------          --------------
//! build index image  -->  MappedRegion::open(index.location, index.size)
//! build data image   -->  MappedRegion::open(cache.location, cache.size)
//! publish (swap)     -->  re-attach to the fresh pair
//! ```
//!
//! Between publications both regions are immutable; readers never write
//! through the mapping. See `cache::reader` for the re-attach handle.

mod mmap;

pub use mmap::{MappedRegion, RegionError};
