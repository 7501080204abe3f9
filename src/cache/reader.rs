//! # Cache Reader
//!
//! `CacheReader` composes the radix index with the mapped data region and is
//! the only surface query workers touch: encode the key, search the index,
//! copy the addressed bytes out of the data region.
//!
//! ## Failure Policy
//!
//! The cache is an optimisation. Construction errors (missing files, bad
//! header) propagate to the caller, but once attached no lookup fault ever
//! does: out-of-bounds reads and structural corruption are logged, counted
//! as error misses, and surfaced as a plain `None` so the layer above falls
//! back to storage. A faulty cache must not fail queries.
//!
//! ## Concurrency
//!
//! `get` takes `&self`, holds no locks, and keeps all scratch state on the
//! call stack; one reader serves any number of threads. `close` takes
//! `&mut self`, so the borrow checker enforces the teardown contract: all
//! reader threads must have been joined before the regions can be released.
//!
//! ## Republication
//!
//! The writer publishes a fresh (index, data) pair per generation. A
//! process re-attaches without restarting through [`SharedCacheReader`],
//! which swaps a whole reader in one pointer-width store; in-flight lookups
//! keep the generation they loaded until they return.
//!
//! ## Batched Lookups
//!
//! `batch_get` answers many keys against one pass over the data region:
//! hits are sorted by data offset, adjacent or overlapping ranges coalesce
//! into chunks, each chunk is copied once, and per-key slices come out of
//! the chunk copies. Result order always matches input order.

use std::sync::Arc;

use arc_swap::ArcSwap;
use eyre::{Result, WrapErr};
use tracing::{debug, info, warn};

use crate::cache::idx::CacheIdx;
use crate::cache::key::CacheKey;
use crate::cache::radix::RadixIndex;
use crate::cache::stats::{CacheStats, SearchTrace};
use crate::config::CacheConfig;
use crate::storage::MappedRegion;

#[derive(Debug)]
struct Inner {
    index: RadixIndex,
    data: Arc<MappedRegion>,
}

/// Read-only columnlet cache over a mapped (index, data) region pair.
#[derive(Debug)]
pub struct CacheReader {
    enabled: bool,
    inner: Option<Inner>,
    stats: CacheStats,
}

impl CacheReader {
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Maps both regions named by `config` and attaches. With
    /// `config.enabled` false nothing is mapped and every lookup misses.
    pub fn open(config: &CacheConfig) -> Result<Self> {
        if !config.enabled {
            return Self::builder().enabled(false).build();
        }

        let index = MappedRegion::open(&config.index_location, config.index_size)
            .wrap_err("failed to map cache index region")?;
        let data = MappedRegion::open(&config.cache_location, config.cache_size)
            .wrap_err("failed to map cache data region")?;

        Self::builder()
            .index_region(Arc::new(index))
            .data_region(Arc::new(data))
            .build()
    }

    fn active(&self) -> Option<&Inner> {
        if !self.enabled {
            return None;
        }
        self.inner.as_ref()
    }

    /// Reads one columnlet; `None` on miss, on a disabled or closed reader,
    /// and on any lookup fault.
    pub fn get(&self, block_id: u64, rg_id: u16, col_id: u16) -> Option<Vec<u8>> {
        self.stats.record_get();

        let Some(inner) = self.active() else {
            self.stats.record_miss();
            return None;
        };

        let key = CacheKey::new(block_id, rg_id, col_id).encode();
        let idx = match inner.index.search(&key) {
            Ok(Some(idx)) => idx,
            Ok(None) => {
                self.stats.record_miss();
                return None;
            }
            Err(err) => {
                warn!(block_id, rg_id, col_id, error = %err, "cache lookup failed, treating as miss");
                self.stats.record_error_miss();
                return None;
            }
        };

        match self.copy_out(inner, idx) {
            Some(bytes) => {
                self.stats.record_hit(bytes.len() as u64);
                Some(bytes)
            }
            None => {
                warn!(
                    block_id,
                    rg_id,
                    col_id,
                    offset = idx.offset,
                    length = idx.length,
                    "cache hit addresses bytes outside the data region, treating as miss"
                );
                self.stats.record_error_miss();
                None
            }
        }
    }

    fn copy_out(&self, inner: &Inner, idx: CacheIdx) -> Option<Vec<u8>> {
        match idx.end() {
            Some(end) if end <= inner.data.len() as u64 => {}
            _ => return None,
        }

        let mut bytes = vec![0u8; idx.length as usize];
        inner.data.get_bytes(idx.offset, &mut bytes).ok()?;
        Some(bytes)
    }

    /// Probes the index without touching the data region. Diagnostics only.
    pub fn search(&self, block_id: u64, rg_id: u16, col_id: u16) -> Option<CacheIdx> {
        let mut trace = SearchTrace::default();
        self.search_traced(block_id, rg_id, col_id, &mut trace)
    }

    /// [`search`](Self::search) with per-lookup counters.
    pub fn search_traced(
        &self,
        block_id: u64,
        rg_id: u16,
        col_id: u16,
        trace: &mut SearchTrace,
    ) -> Option<CacheIdx> {
        let inner = self.active()?;
        let key = CacheKey::new(block_id, rg_id, col_id).encode();
        match inner.index.search_traced(&key, trace) {
            Ok(found) => found,
            Err(err) => {
                warn!(block_id, rg_id, col_id, error = %err, "cache index probe failed");
                None
            }
        }
    }

    /// Reads many columnlets with one copy per coalesced data range.
    ///
    /// `results[i]` corresponds to `keys[i]`; a faulty entry degrades to
    /// `None` exactly like [`get`](Self::get).
    pub fn batch_get(&self, keys: &[CacheKey]) -> Vec<Option<Vec<u8>>> {
        let mut results: Vec<Option<Vec<u8>>> = vec![None; keys.len()];

        let Some(inner) = self.active() else {
            for _ in keys {
                self.stats.record_get();
                self.stats.record_miss();
            }
            return results;
        };

        let mut hits: Vec<(usize, CacheIdx)> = Vec::with_capacity(keys.len());
        for (pos, key) in keys.iter().enumerate() {
            self.stats.record_get();
            match inner.index.search(&key.encode()) {
                Ok(Some(idx)) => match idx.end() {
                    Some(end) if end <= inner.data.len() as u64 => hits.push((pos, idx)),
                    _ => {
                        warn!(
                            offset = idx.offset,
                            length = idx.length,
                            "batch hit addresses bytes outside the data region, treating as miss"
                        );
                        self.stats.record_error_miss();
                    }
                },
                Ok(None) => self.stats.record_miss(),
                Err(err) => {
                    warn!(error = %err, "batch lookup failed, treating as miss");
                    self.stats.record_error_miss();
                }
            }
        }

        if hits.is_empty() {
            return results;
        }

        hits.sort_by_key(|&(_, idx)| idx.offset);

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut chunk_of: Vec<usize> = Vec::with_capacity(hits.len());
        for &(_, idx) in &hits {
            let merged = if let Some(chunk) = chunks.last_mut() {
                chunk.merge(idx.offset, idx.length)
            } else {
                false
            };
            if !merged {
                chunks.push(Chunk::new(idx.offset, idx.length));
            }
            chunk_of.push(chunks.len() - 1);
        }
        debug!(
            keys = keys.len(),
            hits = hits.len(),
            chunks = chunks.len(),
            "coalesced batch read"
        );

        let mut buffers: Vec<Option<Vec<u8>>> = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            inner.data.prefetch(chunk.offset, chunk.length as usize);
            let mut buf = vec![0u8; chunk.length as usize];
            match inner.data.get_bytes(chunk.offset, &mut buf) {
                Ok(()) => buffers.push(Some(buf)),
                Err(err) => {
                    warn!(error = %err, "batch chunk read failed, dropping its keys");
                    buffers.push(None);
                }
            }
        }

        for (slot, &(pos, idx)) in hits.iter().enumerate() {
            let chunk = &chunks[chunk_of[slot]];
            let Some(buf) = &buffers[chunk_of[slot]] else {
                self.stats.record_error_miss();
                continue;
            };
            let start = (idx.offset - chunk.offset) as usize;
            let bytes = buf[start..start + idx.length as usize].to_vec();
            self.stats.record_hit(bytes.len() as u64);
            results[pos] = Some(bytes);
        }

        results
    }

    /// Releases both region handles. Idempotent; every later lookup misses.
    ///
    /// Requires `&mut self`, so it can only be called once no other
    /// references exist; the unmap itself happens when the last `Arc` clone
    /// of each region drops.
    pub fn close(&mut self) {
        if let Some(inner) = self.inner.take() {
            info!(
                index = %inner.index.region().path().display(),
                data = %inner.data.path().display(),
                "cache reader detached"
            );
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && self.inner.is_some()
    }

    /// Writer publication number of the attached index, if any.
    pub fn generation(&self) -> Option<u64> {
        self.active().map(|inner| inner.index.generation())
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

/// Builder for [`CacheReader`] over already-mapped regions.
#[derive(Debug)]
pub struct Builder {
    index_region: Option<Arc<MappedRegion>>,
    data_region: Option<Arc<MappedRegion>>,
    enabled: bool,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            index_region: None,
            data_region: None,
            enabled: true,
        }
    }
}

impl Builder {
    pub fn index_region(mut self, region: Arc<MappedRegion>) -> Self {
        self.index_region = Some(region);
        self
    }

    pub fn data_region(mut self, region: Arc<MappedRegion>) -> Self {
        self.data_region = Some(region);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn build(self) -> Result<CacheReader> {
        if !self.enabled {
            info!("cache disabled, every lookup will miss");
            return Ok(CacheReader {
                enabled: false,
                inner: None,
                stats: CacheStats::new(),
            });
        }

        let index_region = self
            .index_region
            .ok_or_else(|| eyre::eyre!("cache reader requires an index region"))?;
        let data = self
            .data_region
            .ok_or_else(|| eyre::eyre!("cache reader requires a data region"))?;

        let index = RadixIndex::new(index_region)?;
        info!(
            generation = index.generation(),
            index_bytes = index.region().len(),
            data_bytes = data.len(),
            "cache reader attached"
        );

        Ok(CacheReader {
            enabled: true,
            inner: Some(Inner { index, data }),
            stats: CacheStats::new(),
        })
    }
}

/// A coalesced read range over the data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Chunk {
    offset: u64,
    length: u64,
}

impl Chunk {
    fn new(offset: u64, length: u32) -> Self {
        Self {
            offset,
            length: length as u64,
        }
    }

    /// Extends this chunk when `[off, off + len)` is adjacent to or overlaps
    /// its end. Callers feed ranges in ascending offset order.
    fn merge(&mut self, off: u64, len: u32) -> bool {
        let chunk_end = self.offset + self.length;
        if off > chunk_end {
            return false;
        }
        let end = off + len as u64;
        if end > chunk_end {
            self.length = end - self.offset;
        }
        true
    }
}

/// Swappable reader handle for region republication.
///
/// Readers load the current generation lock-free; the process that notices a
/// publication builds a fresh `CacheReader` against the new pair and swaps
/// it in with a single pointer-width store. The retired reader unmaps once
/// the last in-flight lookup drops its guard.
#[derive(Debug)]
pub struct SharedCacheReader {
    current: ArcSwap<CacheReader>,
}

impl SharedCacheReader {
    pub fn new(reader: CacheReader) -> Self {
        Self {
            current: ArcSwap::from_pointee(reader),
        }
    }

    /// The current reader generation.
    pub fn load(&self) -> Arc<CacheReader> {
        self.current.load_full()
    }

    /// Swaps in a freshly attached reader; returns the retired one.
    pub fn publish(&self, reader: CacheReader) -> Arc<CacheReader> {
        self.current.swap(Arc::new(reader))
    }

    /// [`CacheReader::get`] against the current generation.
    pub fn get(&self, block_id: u64, rg_id: u16, col_id: u16) -> Option<Vec<u8>> {
        self.current.load().get(block_id, rg_id, col_id)
    }
}
