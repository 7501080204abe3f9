//! # Radix Index Lookup
//!
//! This module interprets the mapped index region as a global header
//! followed by a compressed radix tree, and answers point lookups over
//! 12-byte cache keys.
//!
//! ## Tree Shape
//!
//! Edges carry multi-byte labels; each node stores a table of child entries
//! whose leader byte duplicates the first byte of the child's edge. The root
//! has an empty edge and serves only as the branch table for the first key
//! byte.
//!
//! ```text
//!                [root]                 branch on key[0]
//!               /      \
//!        [edge "0001"]  [edge "02"]     path compression
//!             |
//!        [edge "0003", is_key]  -> CacheIdx { offset, length }
//! ```
//!
//! ## Descent Algorithm
//!
//! ```text
//! 1. current = RADIX_OFFSET, matched = 0
//! 2. Root with no children and no edge: empty tree, miss
//! 3. While matched < 12:
//!    - Bulk-read the child table into a stack buffer
//!    - Linear scan for the first leader equal to key[matched]; none: miss
//!    - Jump to the child, read its header
//!    - Compare edge bytes against key[matched..]; mismatch: miss
//! 4. Accept iff matched == 12, the final edge was fully consumed, and the
//!    node is marked is_key; parse the trailing 12-byte payload
//! ```
//!
//! The linear scan takes the first matching leader; leader uniqueness within
//! a node makes that unambiguous. Worst-case cost is bounded: at most 12
//! key-byte comparisons on matching edges plus O(depth * child_count)
//! leader scans.
//!
//! ## Corruption Handling
//!
//! The tree is writer-produced and normally well-formed, but the reader must
//! survive a damaged image. Structural checks turn into
//! [`SearchError::Corrupt`]: child counts above 256, child offsets outside
//! the tree bounds, descents that exceed [`MAX_DEPTH`] jumps (a cycle cannot
//! terminate otherwise). Reads past the mapped length surface as
//! [`SearchError::OutOfBounds`]. Either way the lookup never panics and
//! never reads outside the region; the reader above degrades the fault to a
//! miss.
//!
//! ## Concurrency
//!
//! `search` takes `&self` and all scratch state (the children table) lives
//! on the call stack, so one `RadixIndex` serves any number of threads
//! without locking.

use std::sync::Arc;

use eyre::{ensure, Result, WrapErr};
use thiserror::Error;

use crate::cache::header::{IndexHeader, RADIX_OFFSET};
use crate::cache::idx::{CacheIdx, IDX_SIZE};
use crate::cache::key::CacheKey;
use crate::cache::node::{ChildEntry, NodeHeader, CHILD_ENTRY_SIZE, MAX_CHILDREN, NODE_HEADER_SIZE};
use crate::cache::stats::SearchTrace;
use crate::storage::{MappedRegion, RegionError};

/// Upper bound on jumps per descent. A well-formed tree over 12-byte keys
/// never comes close; exceeding it means the image contains a cycle.
pub const MAX_DEPTH: u32 = 64;

/// A lookup-level fault. Never propagated past the cache reader.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    OutOfBounds(#[from] RegionError),
    #[error("corrupt radix index at offset {offset}: {detail}")]
    Corrupt { detail: &'static str, offset: u64 },
}

fn corrupt(detail: &'static str, offset: u64) -> SearchError {
    SearchError::Corrupt { detail, offset }
}

/// Read-only radix tree over the mapped index region.
#[derive(Debug)]
pub struct RadixIndex {
    region: Arc<MappedRegion>,
    generation: u64,
    tree_end: u64,
    root: NodeHeader,
}

impl RadixIndex {
    /// Attaches to an index region: validates the global header, the tree
    /// bounds, and the root node.
    ///
    /// A root that advertises a non-zero edge length is rejected here, so a
    /// damaged root can never cause edge bytes to be consumed out of its
    /// own child table.
    pub fn new(region: Arc<MappedRegion>) -> Result<Self> {
        let mut header_bytes = [0u8; RADIX_OFFSET];
        region
            .get_bytes(0, &mut header_bytes)
            .wrap_err("index region too small for global header")?;
        let header = IndexHeader::from_bytes(&header_bytes)
            .wrap_err_with(|| format!("invalid index region '{}'", region.path().display()))?;

        let tree_end = (RADIX_OFFSET as u64)
            .checked_add(header.tree_size())
            .ok_or_else(|| eyre::eyre!("index header tree_size overflows"))?;
        ensure!(
            tree_end <= region.len() as u64,
            "index header claims {} tree bytes but region holds {}",
            header.tree_size(),
            region.len() - RADIX_OFFSET.min(region.len())
        );
        ensure!(
            header.tree_size() >= NODE_HEADER_SIZE as u64,
            "index tree too small for a root node: {} bytes",
            header.tree_size()
        );

        let root = NodeHeader::from_raw(region.get_u32(RADIX_OFFSET as u64)?);
        ensure!(
            root.edge_len() == 0,
            "root node advertises a non-empty edge ({} bytes)",
            root.edge_len()
        );
        ensure!(
            root.child_count() <= MAX_CHILDREN,
            "root child count {} exceeds maximum fan-out",
            root.child_count()
        );

        Ok(Self {
            region,
            generation: header.generation(),
            tree_end,
            root,
        })
    }

    /// Writer publication number from the global header.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn region(&self) -> &Arc<MappedRegion> {
        &self.region
    }

    /// Looks up an encoded key; `Ok(None)` is a miss.
    pub fn search(&self, key: &[u8; CacheKey::SIZE]) -> Result<Option<CacheIdx>, SearchError> {
        let mut trace = SearchTrace::default();
        self.search_traced(key, &mut trace)
    }

    /// [`search`](Self::search) with per-lookup counters.
    pub fn search_traced(
        &self,
        key: &[u8; CacheKey::SIZE],
        trace: &mut SearchTrace,
    ) -> Result<Option<CacheIdx>, SearchError> {
        let region = &*self.region;
        let mut current = RADIX_OFFSET as u64;
        let mut header = self.root;
        trace.record_visit();

        if header.child_count() == 0 && header.edge_len() == 0 {
            return Ok(None);
        }
        trace.record_level();

        let mut children = [0u8; MAX_CHILDREN * CHILD_ENTRY_SIZE];
        let mut matched = 0usize;
        let mut matched_in_node = 0usize;
        let mut jumps = 0u32;

        while matched < CacheKey::SIZE {
            trace.record_level();
            jumps += 1;
            if jumps > MAX_DEPTH {
                return Err(corrupt("descent exceeded maximum depth", current));
            }

            let child_count = header.child_count();
            if child_count > MAX_CHILDREN {
                return Err(corrupt("child count exceeds maximum fan-out", current));
            }

            let table = &mut children[..child_count * CHILD_ENTRY_SIZE];
            region.get_bytes(current + NODE_HEADER_SIZE as u64, table)?;
            trace.record_visit();

            let mut next = None;
            for raw in table.chunks_exact(CHILD_ENTRY_SIZE) {
                let entry = ChildEntry::from_raw(u64::from_ne_bytes(raw.try_into().unwrap()));
                if entry.leader() == key[matched] {
                    next = Some(entry.offset());
                    break;
                }
            }
            let Some(child_offset) = next else {
                return Ok(None);
            };
            if child_offset < RADIX_OFFSET as u64 || child_offset >= self.tree_end {
                return Err(corrupt("child offset outside tree bounds", current));
            }

            current = child_offset;
            header = NodeHeader::from_raw(region.get_u32(current)?);
            trace.record_visit();
            matched_in_node = 0;

            let edge_len = header.edge_len();
            if edge_len > 0 {
                let compare = edge_len.min(CacheKey::SIZE - matched);
                let edge_off =
                    current + NODE_HEADER_SIZE as u64 + (header.child_count() * CHILD_ENTRY_SIZE) as u64;
                let edge = region.slice(edge_off, compare)?;
                trace.record_visit();
                for &byte in edge {
                    if byte != key[matched] {
                        return Ok(None);
                    }
                    matched += 1;
                    matched_in_node += 1;
                }
            }
        }

        // Accept only on a full 12-byte match that consumed the final edge
        // entirely and landed on a key node.
        if matched == CacheKey::SIZE && matched_in_node == header.edge_len() && header.is_key() {
            let payload_off = current
                + NODE_HEADER_SIZE as u64
                + (header.child_count() * CHILD_ENTRY_SIZE) as u64
                + header.edge_len() as u64;
            let mut payload = [0u8; IDX_SIZE];
            region.get_bytes(payload_off, &mut payload)?;
            trace.record_visit();
            return Ok(Some(CacheIdx::from_bytes(&payload)));
        }

        Ok(None)
    }
}
