//! # Cache Index Entry
//!
//! The 12-byte leaf payload stored at radix nodes marked `is_key`: a byte
//! offset into the data region plus the columnlet length. A `CacheIdx` is an
//! address into an opaque byte blob and has no meaning outside the reader
//! that produced it.

use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Serialized width of a leaf payload.
pub const IDX_SIZE: usize = 12;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct IdxPayload {
    offset: U64,
    length: U32,
}

const _: () = assert!(std::mem::size_of::<IdxPayload>() == IDX_SIZE);

/// Address of one columnlet within the data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheIdx {
    pub offset: u64,
    pub length: u32,
}

impl CacheIdx {
    pub fn new(offset: u64, length: u32) -> Self {
        Self { offset, length }
    }

    /// Parses the little-endian leaf payload.
    pub fn from_bytes(bytes: &[u8; IDX_SIZE]) -> Self {
        let payload = IdxPayload::ref_from_bytes(bytes).unwrap();
        Self {
            offset: payload.offset.get(),
            length: payload.length.get(),
        }
    }

    /// Serializes to the on-disk payload form.
    pub fn to_bytes(&self) -> [u8; IDX_SIZE] {
        let payload = IdxPayload {
            offset: U64::new(self.offset),
            length: U32::new(self.length),
        };
        let mut buf = [0u8; IDX_SIZE];
        buf.copy_from_slice(payload.as_bytes());
        buf
    }

    /// End of the addressed slice, or `None` on u64 overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.length as u64)
    }
}
