//! # Columnlet Cache
//!
//! The cache answers point lookups of columnlets, the bytes of one column
//! within one row group of one file, against two memory-mapped regions
//! produced by an offline writer:
//!
//! - the **index region**: a 40-byte global header followed by a compressed
//!   radix tree keyed by the 12-byte `(block_id, rg_id, col_id)` encoding,
//! - the **data region**: an opaque blob of columnlet bytes addressed by the
//!   `(offset, length)` payloads stored at the tree's key nodes.
//!
//! ```text
//! caller
//!   └─ CacheReader::get(block_id, rg_id, col_id)
//!        ├─ CacheKey::encode           12-byte big-endian search key
//!        ├─ RadixIndex::search         descend mapped index bytes
//!        │    └─ CacheIdx              leaf payload (offset, length)
//!        └─ MappedRegion::get_bytes    copy columnlet out of data region
//! ```
//!
//! Between publications both regions are immutable, so the whole read path
//! is lock-free; any number of threads share one reader. Lookup faults
//! never propagate: the reader logs them and reports a miss, and the layer
//! above falls back to storage.
//!
//! ## Module Organization
//!
//! - `key`: the cache key and its fixed binary encoding
//! - `header`: the global index region header
//! - `node`: bit-packed radix node header and child entries
//! - `idx`: the 12-byte leaf payload
//! - `radix`: the descent algorithm
//! - `reader`: the consumer-facing facade and republication handle
//! - `stats`: counters beside the lookup path

mod header;
mod idx;
mod key;
mod node;
mod radix;
mod reader;
mod stats;

pub use header::{IndexHeader, INDEX_MAGIC, INDEX_VERSION, RADIX_OFFSET};
pub use idx::{CacheIdx, IDX_SIZE};
pub use key::CacheKey;
pub use node::{ChildEntry, NodeHeader, CHILD_ENTRY_SIZE, MAX_CHILDREN, NODE_HEADER_SIZE};
pub use radix::{RadixIndex, SearchError, MAX_DEPTH};
pub use reader::{Builder, CacheReader, SharedCacheReader};
pub use stats::{CacheStats, CacheStatsSnapshot, SearchTrace};
