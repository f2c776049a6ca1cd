//! Pack descriptions and the per-pack handle object.
//!
//! A description is the stable external name of a pack; the handle is
//! the live object readers carry around. The cache is the only factory
//! for handles: at most one non-invalid handle exists per description,
//! and handles are closed by the eviction pathway rather than by their
//! readers (cache pressure is the only liveness signal).

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::block::PackBlock;
use crate::errors::PackReadError;
use crate::keys::PackKey;
use crate::source::BlockSource;

/// Cache slot for the pack's primary index artifact.
pub const POS_INDEX: i64 = -1;
/// Cache slot for the pack's reverse index artifact.
pub const POS_REVERSE_INDEX: i64 = -2;
/// Cache slot for the pack's bitmap index artifact.
pub const POS_BITMAP_INDEX: i64 = -3;

/// Opaque, stable external name of a pack.
///
/// Value equality; cheap to clone. The cache never interprets the name.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct PackDescription {
    name: Arc<str>,
}

impl PackDescription {
    /// Wraps an external pack name.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    /// The external name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for PackDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Live handle for one pack.
///
/// Holds the description, the identity key, and the aligned read window
/// size. Reads delegate to the caller-supplied [`BlockSource`]; the
/// handle itself owns no OS resources, so `close` is a state transition
/// observed by collaborators, not a release of descriptors.
pub struct PackFile {
    desc: PackDescription,
    key: PackKey,
    block_size: u32,
    invalid: AtomicBool,
    closed: AtomicBool,
}

impl PackFile {
    pub(crate) fn new(desc: PackDescription, key: PackKey, block_size: u32) -> Self {
        debug_assert!(block_size.is_power_of_two());
        Self {
            desc,
            key,
            block_size,
            invalid: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// The stable external name this handle was registered under.
    #[must_use]
    pub fn description(&self) -> &PackDescription {
        &self.desc
    }

    /// Identity token for this handle's lifetime.
    #[must_use]
    pub fn key(&self) -> &PackKey {
        &self.key
    }

    /// Aligned read window in bytes.
    #[must_use]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Rounds `position` down to its block boundary.
    #[must_use]
    pub fn align_to_block(&self, position: u64) -> u64 {
        position - position % u64::from(self.block_size)
    }

    /// Returns true once the handle has been marked unusable.
    #[must_use]
    pub fn invalid(&self) -> bool {
        self.invalid.load(Ordering::Acquire)
    }

    /// Marks the handle unusable.
    ///
    /// Collaborators call this when they detect pack corruption; the
    /// registry replaces invalid handles on the next
    /// [`get_or_create_pack`](crate::cache::BlockCache::get_or_create_pack).
    pub fn mark_invalid(&self) {
        self.invalid.store(true, Ordering::Release);
    }

    /// Returns true once the handle has been closed by the cache.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(pack = %self.desc, "pack handle closed");
        }
    }

    /// Reads the single block covering `position` from `source`.
    ///
    /// The position is aligned down to its block boundary; the block is
    /// `block_size` bytes except at the pack tail, where it covers the
    /// remainder.
    ///
    /// # Errors
    /// `OutOfRange` when the aligned position is at or past the end of
    /// the pack; otherwise whatever the source reports.
    pub fn read_one_block(
        &self,
        position: u64,
        source: &mut dyn BlockSource,
    ) -> Result<PackBlock, PackReadError> {
        let aligned = self.align_to_block(position);
        let pack_len = source.len(&self.desc)?;
        if aligned >= pack_len {
            return Err(PackReadError::OutOfRange {
                offset: aligned,
                len: self.block_size as usize,
            });
        }

        let want = u64::from(self.block_size).min(pack_len - aligned) as usize;
        let mut buf = vec![0u8; want];
        source.read_exact_at(&self.desc, aligned, &mut buf)?;
        Ok(PackBlock::new(
            self.key.clone(),
            aligned,
            buf.into_boxed_slice(),
        ))
    }
}

impl fmt::Debug for PackFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackFile")
            .field("desc", &self.desc)
            .field("key", &self.key)
            .field("block_size", &self.block_size)
            .field("invalid", &self.invalid())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryBlockSource;

    fn pack(name: &str, block_size: u32) -> PackFile {
        PackFile::new(PackDescription::new(name), PackKey::new(), block_size)
    }

    #[test]
    fn align_rounds_down_to_block_boundary() {
        let pf = pack("p", 512);
        assert_eq!(pf.align_to_block(0), 0);
        assert_eq!(pf.align_to_block(100), 0);
        assert_eq!(pf.align_to_block(512), 512);
        assert_eq!(pf.align_to_block(1023), 512);
    }

    #[test]
    fn reads_a_full_block() {
        let pf = pack("p", 512);
        let mut source = MemoryBlockSource::new();
        source.insert(pf.description().clone(), vec![7u8; 2048]);

        let block = pf.read_one_block(700, &mut source).expect("block");
        assert_eq!(block.start(), 512);
        assert_eq!(block.size(), 512);
        assert!(block.contains(pf.key(), 512));
    }

    #[test]
    fn tail_block_is_short() {
        let pf = pack("p", 512);
        let mut source = MemoryBlockSource::new();
        source.insert(pf.description().clone(), vec![7u8; 700]);

        let block = pf.read_one_block(512, &mut source).expect("block");
        assert_eq!(block.start(), 512);
        assert_eq!(block.size(), 188);
        assert_eq!(block.end(), 700);
    }

    #[test]
    fn read_past_end_is_out_of_range() {
        let pf = pack("p", 512);
        let mut source = MemoryBlockSource::new();
        source.insert(pf.description().clone(), vec![7u8; 700]);

        let err = pf.read_one_block(1024, &mut source).unwrap_err();
        assert!(matches!(err, PackReadError::OutOfRange { .. }));
    }

    #[test]
    fn close_and_invalid_are_sticky() {
        let pf = pack("p", 512);
        assert!(!pf.invalid());
        assert!(!pf.is_closed());
        pf.mark_invalid();
        pf.close();
        pf.close();
        assert!(pf.invalid());
        assert!(pf.is_closed());
    }
}
