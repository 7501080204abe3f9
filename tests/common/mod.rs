//! Shared test scaffolding: builds well-formed index and data region images
//! in the on-disk format the offline writer produces, and attaches readers
//! to them through real mapped files.
//!
//! The production crate is read-only; this builder exists so the test
//! suites can exercise the reader against trees of arbitrary shape.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use tempfile::TempDir;

use colcache::cache::{
    CacheIdx, CacheKey, ChildEntry, IndexHeader, NodeHeader, RADIX_OFFSET,
};
use colcache::{CacheReader, MappedRegion};

#[derive(Debug, Default)]
struct Node {
    edge: Vec<u8>,
    children: BTreeMap<u8, Node>,
    idx: Option<CacheIdx>,
}

impl Node {
    fn size(&self) -> usize {
        4 + 8 * self.children.len() + self.edge.len() + if self.idx.is_some() { 12 } else { 0 }
    }

    fn subtree_size(&self) -> usize {
        self.size() + self.children.values().map(Node::subtree_size).sum::<usize>()
    }

    fn insert(&mut self, suffix: &[u8], idx: CacheIdx) {
        if suffix.is_empty() {
            self.idx = Some(idx);
            return;
        }

        let leader = suffix[0];
        let Some(child) = self.children.get_mut(&leader) else {
            self.children.insert(
                leader,
                Node {
                    edge: suffix.to_vec(),
                    children: BTreeMap::new(),
                    idx: Some(idx),
                },
            );
            return;
        };

        let common = child
            .edge
            .iter()
            .zip(suffix)
            .take_while(|(a, b)| a == b)
            .count();

        if common == child.edge.len() {
            child.insert(&suffix[common..], idx);
            return;
        }

        // split the child edge at the divergence point
        let lower = Node {
            edge: child.edge[common..].to_vec(),
            children: std::mem::take(&mut child.children),
            idx: child.idx.take(),
        };
        child.edge.truncate(common);
        child.children.insert(lower.edge[0], lower);

        if common == suffix.len() {
            child.idx = Some(idx);
        } else {
            child.children.insert(
                suffix[common],
                Node {
                    edge: suffix[common..].to_vec(),
                    children: BTreeMap::new(),
                    idx: Some(idx),
                },
            );
        }
    }

    fn emit(&self, my_offset: u64, out: &mut Vec<u8>) {
        let header = NodeHeader::pack(
            self.idx.is_some(),
            self.edge.len() as u32,
            self.children.len() as u32,
        );
        out.extend_from_slice(&header.to_le_bytes());

        let mut child_offset = my_offset + self.size() as u64;
        for (&leader, child) in &self.children {
            out.extend_from_slice(&ChildEntry::pack(leader, child_offset).to_ne_bytes());
            child_offset += child.subtree_size() as u64;
        }

        out.extend_from_slice(&self.edge);
        if let Some(idx) = self.idx {
            out.extend_from_slice(&idx.to_bytes());
        }

        let mut child_offset = my_offset + self.size() as u64;
        for child in self.children.values() {
            child.emit(child_offset, out);
            child_offset += child.subtree_size() as u64;
        }
    }
}

/// Builds index region images: radix construction with path compression,
/// pre-order serialization, and the 40-byte global header on top.
#[derive(Debug)]
pub struct IndexImageBuilder {
    root: Node,
    generation: u64,
}

impl Default for IndexImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexImageBuilder {
    pub fn new() -> Self {
        Self {
            root: Node::default(),
            generation: 1,
        }
    }

    pub fn generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn insert(&mut self, key: CacheKey, offset: u64, length: u32) -> &mut Self {
        self.root
            .insert(&key.encode(), CacheIdx::new(offset, length));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let tree_size = self.root.subtree_size() as u64;
        let header = IndexHeader::new(self.generation, tree_size);

        let mut out = header.to_bytes().to_vec();
        self.root.emit(RADIX_OFFSET as u64, &mut out);

        debug_assert_eq!(out.len(), RADIX_OFFSET + tree_size as usize);
        out
    }
}

/// Assembles one raw node, for images the builder cannot produce (interior
/// key-length edges, broken layouts).
pub fn raw_node(
    is_key: bool,
    edge: &[u8],
    children: &[(u8, u64)],
    idx: Option<CacheIdx>,
) -> Vec<u8> {
    let header = NodeHeader::pack(is_key, edge.len() as u32, children.len() as u32);
    let mut bytes = header.to_le_bytes().to_vec();
    for &(leader, offset) in children {
        bytes.extend_from_slice(&ChildEntry::pack(leader, offset).to_ne_bytes());
    }
    bytes.extend_from_slice(edge);
    if let Some(idx) = idx {
        bytes.extend_from_slice(&idx.to_bytes());
    }
    bytes
}

/// Wraps raw nodes in a checksummed global header.
pub fn raw_image(nodes: &[Vec<u8>]) -> Vec<u8> {
    let tree: Vec<u8> = nodes.concat();
    let mut out = IndexHeader::new(1, tree.len() as u64).to_bytes().to_vec();
    out.extend_from_slice(&tree);
    out
}

/// Writes both images under `dir` and maps them.
pub fn map_regions(
    dir: &TempDir,
    index_image: &[u8],
    data: &[u8],
) -> (Arc<MappedRegion>, Arc<MappedRegion>) {
    let index_path = dir.path().join("index.region");
    let data_path = dir.path().join("data.region");

    std::fs::write(&index_path, index_image).unwrap();
    // a region cannot be empty; pad an empty data blob with one byte
    if data.is_empty() {
        std::fs::write(&data_path, [0u8]).unwrap();
    } else {
        std::fs::write(&data_path, data).unwrap();
    }

    let index = MappedRegion::open(&index_path, index_image.len() as u64).unwrap();
    let data_len = data.len().max(1) as u64;
    let data = MappedRegion::open(&data_path, data_len).unwrap();
    (Arc::new(index), Arc::new(data))
}

/// Writes both images under `dir` and attaches a reader.
pub fn attach(dir: &TempDir, index_image: &[u8], data: &[u8]) -> CacheReader {
    let (index, data) = map_regions(dir, index_image, data);
    CacheReader::builder()
        .index_region(index)
        .data_region(data)
        .build()
        .unwrap()
}

/// Deterministic key generator for property-style tests.
pub fn generated_keys(count: usize, seed: u64) -> Vec<CacheKey> {
    let mut state = seed.wrapping_mul(2).wrapping_add(1);
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    let mut keys = Vec::with_capacity(count);
    let mut seen = std::collections::BTreeSet::new();
    while keys.len() < count {
        let key = CacheKey::new(next() % 64, (next() % 128) as u16, (next() % 32) as u16);
        if seen.insert(key) {
            keys.push(key);
        }
    }
    keys
}
