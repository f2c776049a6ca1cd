//! Positioned-read contract for pack bytes.
//!
//! The source is the caller-supplied I/O context threaded through
//! [`get_or_load`](crate::cache::BlockCache::get_or_load) down to
//! [`read_one_block`](crate::pack::PackFile::read_one_block). Keeping it a
//! trait lets tests and simulations inject short reads and failures
//! without touching OS I/O; implementations should be deterministic for
//! identical inputs.

use std::io;

use ahash::AHashMap;

use crate::errors::PackReadError;
use crate::pack::PackDescription;

/// Read-only, positioned access to the bytes of named packs.
pub trait BlockSource {
    /// Total length of the named pack in bytes.
    ///
    /// # Errors
    /// Implementations report unknown packs and I/O failures as
    /// [`PackReadError`].
    fn len(&mut self, desc: &PackDescription) -> Result<u64, PackReadError>;

    /// Reads bytes of `desc` starting at `offset` into `dst`.
    ///
    /// Returns the number of bytes read, which may be less than
    /// `dst.len()`. Implementations should return `OutOfRange` when
    /// `offset` is past the end of the pack.
    fn read_at(
        &mut self,
        desc: &PackDescription,
        offset: u64,
        dst: &mut [u8],
    ) -> Result<usize, PackReadError>;

    /// Fills `dst` completely or fails with `ShortRead`.
    ///
    /// Retries partial reads until `dst` is full; a zero-length read
    /// before that maps to a single `ShortRead` failure. An empty `dst`
    /// succeeds without calling `read_at`.
    fn read_exact_at(
        &mut self,
        desc: &PackDescription,
        offset: u64,
        dst: &mut [u8],
    ) -> Result<(), PackReadError> {
        let mut filled = 0usize;
        while filled < dst.len() {
            let got = self.read_at(desc, offset + filled as u64, &mut dst[filled..])?;
            if got == 0 {
                return Err(PackReadError::ShortRead {
                    expected: dst.len(),
                    got: filled,
                });
            }
            filled += got;
        }
        Ok(())
    }
}

/// In-memory block source keyed by pack description.
///
/// Used by tests and simulations. Counts `read_at` calls so callers can
/// assert how many physical reads a scenario performed.
#[derive(Debug, Default)]
pub struct MemoryBlockSource {
    packs: AHashMap<PackDescription, Box<[u8]>>,
    reads: u64,
}

impl MemoryBlockSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs (or replaces) the bytes backing a pack.
    pub fn insert(&mut self, desc: PackDescription, bytes: impl Into<Box<[u8]>>) {
        self.packs.insert(desc, bytes.into());
    }

    /// Number of `read_at` calls served so far.
    #[must_use]
    pub fn reads(&self) -> u64 {
        self.reads
    }

    fn bytes_of(&self, desc: &PackDescription) -> Result<&[u8], PackReadError> {
        self.packs.get(desc).map(|b| b.as_ref()).ok_or_else(|| {
            PackReadError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("unknown pack {desc}"),
            ))
        })
    }
}

impl BlockSource for MemoryBlockSource {
    fn len(&mut self, desc: &PackDescription) -> Result<u64, PackReadError> {
        Ok(self.bytes_of(desc)?.len() as u64)
    }

    fn read_at(
        &mut self,
        desc: &PackDescription,
        offset: u64,
        dst: &mut [u8],
    ) -> Result<usize, PackReadError> {
        self.reads += 1;
        let bytes = self.bytes_of(desc)?;
        let offset = offset as usize;
        if offset > bytes.len() {
            return Err(PackReadError::OutOfRange {
                offset: offset as u64,
                len: dst.len(),
            });
        }
        let available = &bytes[offset..];
        let n = available.len().min(dst.len());
        dst[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }
}
