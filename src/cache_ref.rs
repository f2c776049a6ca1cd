//! Weight-carrying envelope for cached payloads.
//!
//! One cache holds two payload shapes: data blocks and opaque per-pack
//! index artifacts (reverse indices, bitmaps, offset maps) produced by
//! external collaborators. Blocks stay strongly typed; artifacts are
//! erased and downcast at read sites. The envelope records identity and
//! weight once at construction and is immutable afterwards.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::block::PackBlock;
use crate::keys::PackKey;

/// Cached payload: a data block or an erased index artifact.
#[derive(Clone)]
enum Payload {
    Block(Arc<PackBlock>),
    Index(Arc<dyn Any + Send + Sync>),
}

struct RefInner {
    pack: PackKey,
    position: i64,
    size: u32,
    payload: Payload,
}

/// Immutable cache entry envelope: identity, weight, payload.
///
/// Cheap to clone; clones share the payload.
#[derive(Clone)]
pub struct CacheRef {
    inner: Arc<RefInner>,
}

impl CacheRef {
    /// Wraps a loaded data block. Identity and weight come from the block.
    #[must_use]
    pub fn for_block(block: Arc<PackBlock>) -> Self {
        debug_assert!(block.start() <= i64::MAX as u64);
        Self {
            inner: Arc::new(RefInner {
                pack: block.pack().clone(),
                position: block.start() as i64,
                size: block.size(),
                payload: Payload::Block(block),
            }),
        }
    }

    /// Wraps an erased payload under an explicit identity and weight.
    #[must_use]
    pub fn for_value(
        pack: PackKey,
        position: i64,
        size: u32,
        value: Arc<dyn Any + Send + Sync>,
    ) -> Self {
        Self {
            inner: Arc::new(RefInner {
                pack,
                position,
                size,
                payload: Payload::Index(value),
            }),
        }
    }

    /// Identity of the owning pack.
    #[must_use]
    pub fn pack(&self) -> &PackKey {
        &self.inner.pack
    }

    /// Cached position; negative for index artifact slots.
    #[must_use]
    pub fn position(&self) -> i64 {
        self.inner.position
    }

    /// Eviction weight of the payload in bytes (excluding fixed overhead).
    #[must_use]
    pub fn size(&self) -> u32 {
        self.inner.size
    }

    /// Returns the payload as a data block, if it is one.
    ///
    /// Erased payloads that happen to hold a [`PackBlock`] resolve too;
    /// the write path used does not change what the entry is.
    #[must_use]
    pub fn block(&self) -> Option<Arc<PackBlock>> {
        match &self.inner.payload {
            Payload::Block(block) => Some(Arc::clone(block)),
            Payload::Index(value) => Arc::clone(value).downcast::<PackBlock>().ok(),
        }
    }

    /// Downcasts the payload to a concrete type.
    #[must_use]
    pub fn value<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match &self.inner.payload {
            Payload::Block(block) => {
                let erased: Arc<dyn Any + Send + Sync> = Arc::clone(block) as Arc<dyn Any + Send + Sync>;
                erased.downcast::<T>().ok()
            }
            Payload::Index(value) => Arc::clone(value).downcast::<T>().ok(),
        }
    }
}

impl fmt::Debug for CacheRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.inner.payload {
            Payload::Block(_) => "block",
            Payload::Index(_) => "index",
        };
        f.debug_struct("CacheRef")
            .field("pack", &self.inner.pack)
            .field("position", &self.inner.position)
            .field("size", &self.inner.size)
            .field("kind", &kind)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_refs_expose_the_block() {
        let block = Arc::new(PackBlock::new(
            PackKey::new(),
            512,
            vec![1u8; 16].into_boxed_slice(),
        ));
        let slot = CacheRef::for_block(Arc::clone(&block));
        assert_eq!(slot.position(), 512);
        assert_eq!(slot.size(), 16);
        assert!(Arc::ptr_eq(&slot.block().expect("block"), &block));
        assert!(slot.value::<PackBlock>().is_some());
        assert!(slot.value::<Vec<u8>>().is_none());
    }

    #[test]
    fn erased_payloads_downcast_at_read_sites() {
        let key = PackKey::new();
        let artifact: Arc<dyn Any + Send + Sync> = Arc::new(vec![0u32; 8]);
        let slot = CacheRef::for_value(key, -1, 32, artifact);
        assert_eq!(slot.position(), -1);
        let read: Arc<Vec<u32>> = slot.value().expect("downcast");
        assert_eq!(read.len(), 8);
        assert!(slot.block().is_none());
    }

    #[test]
    fn erased_blocks_still_resolve_as_blocks() {
        let block = PackBlock::new(PackKey::new(), 0, vec![2u8; 8].into_boxed_slice());
        let key = block.pack().clone();
        let slot = CacheRef::for_value(key, 0, 8, Arc::new(block));
        assert!(slot.block().is_some());
    }
}
