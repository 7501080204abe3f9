//! # Read-Only Mapped Regions
//!
//! This module implements `MappedRegion`, the low-level building block under
//! the columnlet cache. A region is a file mapped into the process address
//! space and exposed as a bounded byte array with random-access reads of
//! fixed-width integers and byte ranges.
//!
//! ## Access Model
//!
//! The cache consists of two regions produced by an offline writer: an index
//! region (radix tree) and a data region (raw columnlet bytes). Both are
//! immutable between publications, so the region type exposes no writes at
//! all. Reads are side-effect free once the mapping is established and any
//! number of threads may read concurrently.
//!
//! ## Byte Order
//!
//! - `get_u32` reads little-endian, the order of node headers and leaf
//!   payloads in the index format.
//! - `get_u64` reads native order. Child entries are written as native
//!   `u64`s by the machine that built the file; portability across
//!   endianness-different writer/reader pairs is out of scope.
//!
//! ## Bounds Checking
//!
//! Every read verifies `offset + width <= size` and fails with
//! [`RegionError::OutOfBounds`] on overrun. The mapping call itself is the
//! single `unsafe` point; all reads go through safe slice indexing after the
//! bounds check.
//!
//! ## Teardown
//!
//! Unmapping happens when the region is dropped. The reader facade holds the
//! regions behind `Arc` and releases them in `close()`; the last clone to
//! drop performs the munmap.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use memmap2::{Mmap, MmapOptions};
use thiserror::Error;

/// A read past the end of a mapped region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegionError {
    #[error("read of {len} bytes at offset {offset} overruns region of {size} bytes")]
    OutOfBounds { offset: u64, len: usize, size: usize },
}

#[derive(Debug)]
pub struct MappedRegion {
    mmap: Mmap,
    size: usize,
    path: PathBuf,
}

impl MappedRegion {
    /// Maps exactly `size` bytes of the file at `path`, read-only.
    ///
    /// Fails if the path is absent, the file is shorter than `size`, or the
    /// mapping call fails.
    pub fn open<P: AsRef<Path>>(path: P, size: u64) -> Result<Self> {
        let path = path.as_ref();

        ensure!(size > 0, "cannot map zero bytes of '{}'", path.display());

        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open region file '{}'", path.display()))?;

        let file_size = file
            .metadata()
            .wrap_err_with(|| format!("failed to get metadata for '{}'", path.display()))?
            .len();

        ensure!(
            file_size >= size,
            "region file '{}' is {} bytes, cannot map {}",
            path.display(),
            file_size,
            size
        );

        // SAFETY: Mmap::map is unsafe because the file could be modified
        // externally while mapped. This is safe because:
        // 1. The mapping is read-only; this process never writes through it
        // 2. Published cache regions are immutable until the next publication,
        //    at which point readers re-attach to a fresh pair
        // 3. The mmap lifetime is tied to MappedRegion, preventing
        //    use-after-unmap
        // 4. All access goes through accessors that bounds-check against size
        let mmap = unsafe {
            MmapOptions::new()
                .len(size as usize)
                .map(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        Ok(Self {
            mmap,
            size: size as usize,
            path: path.to_path_buf(),
        })
    }

    /// Mapped length in bytes.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check(&self, offset: u64, len: usize) -> Result<usize, RegionError> {
        match offset.checked_add(len as u64) {
            Some(end) if end <= self.size as u64 => Ok(offset as usize),
            _ => Err(RegionError::OutOfBounds {
                offset,
                len,
                size: self.size,
            }),
        }
    }

    /// Reads 4 little-endian bytes at `offset`.
    pub fn get_u32(&self, offset: u64) -> Result<u32, RegionError> {
        let start = self.check(offset, 4)?;
        let bytes: [u8; 4] = self.mmap[start..start + 4].try_into().unwrap();
        Ok(u32::from_le_bytes(bytes))
    }

    /// Reads 8 bytes at `offset` in native byte order.
    pub fn get_u64(&self, offset: u64) -> Result<u64, RegionError> {
        let start = self.check(offset, 8)?;
        let bytes: [u8; 8] = self.mmap[start..start + 8].try_into().unwrap();
        Ok(u64::from_ne_bytes(bytes))
    }

    /// Copies `dst.len()` bytes starting at `offset` into `dst`.
    pub fn get_bytes(&self, offset: u64, dst: &mut [u8]) -> Result<(), RegionError> {
        let start = self.check(offset, dst.len())?;
        dst.copy_from_slice(&self.mmap[start..start + dst.len()]);
        Ok(())
    }

    /// Borrows `len` bytes starting at `offset` without copying.
    pub fn slice(&self, offset: u64, len: usize) -> Result<&[u8], RegionError> {
        let start = self.check(offset, len)?;
        Ok(&self.mmap[start..start + len])
    }

    /// Hints the kernel that `[offset, offset + len)` will be read soon.
    pub fn prefetch(&self, offset: u64, len: usize) {
        if self.check(offset, len).is_err() {
            return;
        }

        #[cfg(unix)]
        // SAFETY: madvise with MADV_WILLNEED is a hint and does not fault on
        // its own. The range was bounds-checked above, so ptr and len stay
        // inside the mapping.
        unsafe {
            libc::madvise(
                self.mmap.as_ptr().add(offset as usize) as *mut libc::c_void,
                len,
                libc::MADV_WILLNEED,
            );
        }

        #[cfg(not(unix))]
        let _ = (offset, len);
    }
}
