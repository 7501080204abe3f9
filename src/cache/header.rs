//! # Index Region Header
//!
//! The index region begins with a fixed 40-byte global header written by the
//! offline builder. The tree image follows immediately at [`RADIX_OFFSET`],
//! a constant shared between writer and reader.
//!
//! ## Header Layout (40 bytes)
//!
//! ```text
//! Offset  Size  Field        Description
//! ------  ----  -----------  ----------------------------------------
//! 0       8     magic        b"COLCACHE"
//! 8       4     version      Format version, currently 1
//! 12      4     flags        Reserved, zero
//! 16      8     generation   Writer publication number
//! 24      8     tree_size    Bytes of tree image starting at RADIX_OFFSET
//! 32      4     checksum     CRC-32 (iSCSI) of bytes [0, 32)
//! 36      4     reserved     Zero
//! ```
//!
//! All integer fields are little-endian. The header is validated once at
//! attach; a reader never descends a tree whose header fails the magic,
//! version, or checksum check. Outside this header and the tree the region
//! is opaque.

use crc::{Crc, CRC_32_ISCSI};
use eyre::{ensure, Result};
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Absolute offset of the radix tree root within the index region.
pub const RADIX_OFFSET: usize = 40;

pub const INDEX_MAGIC: &[u8; 8] = b"COLCACHE";
pub const INDEX_VERSION: u32 = 1;

const HEADER_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct IndexHeader {
    magic: [u8; 8],
    version: U32,
    flags: U32,
    generation: U64,
    tree_size: U64,
    checksum: U32,
    reserved: [u8; 4],
}

const _: () = assert!(std::mem::size_of::<IndexHeader>() == RADIX_OFFSET);

impl IndexHeader {
    pub fn new(generation: u64, tree_size: u64) -> Self {
        let mut header = Self {
            magic: *INDEX_MAGIC,
            version: U32::new(INDEX_VERSION),
            flags: U32::new(0),
            generation: U64::new(generation),
            tree_size: U64::new(tree_size),
            checksum: U32::new(0),
            reserved: [0u8; 4],
        };
        header.checksum = U32::new(HEADER_CRC.checksum(&header.as_bytes()[..32]));
        header
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() >= RADIX_OFFSET,
            "buffer too small for IndexHeader: {} < {}",
            bytes.len(),
            RADIX_OFFSET
        );

        let header = Self::ref_from_bytes(&bytes[..RADIX_OFFSET])
            .map_err(|e| eyre::eyre!("failed to parse IndexHeader: {:?}", e))?;

        ensure!(
            &header.magic == INDEX_MAGIC,
            "invalid magic bytes in index region"
        );

        ensure!(
            header.version.get() == INDEX_VERSION,
            "unsupported index format version: {} (expected {})",
            header.version.get(),
            INDEX_VERSION
        );

        let expected = HEADER_CRC.checksum(&bytes[..32]);
        ensure!(
            header.checksum.get() == expected,
            "index header checksum mismatch: stored {:#010x}, computed {:#010x}",
            header.checksum.get(),
            expected
        );

        Ok(*header)
    }

    /// Serialized header, as the writer lays it down at offset 0.
    pub fn to_bytes(&self) -> [u8; RADIX_OFFSET] {
        let mut buf = [0u8; RADIX_OFFSET];
        buf.copy_from_slice(self.as_bytes());
        buf
    }

    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    pub fn tree_size(&self) -> u64 {
        self.tree_size.get()
    }
}
