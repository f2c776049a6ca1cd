//! The block cache facade.
//!
//! Couples three pieces under one weight budget: the bounded weighted
//! store for blocks and index artifacts, the registry of live pack
//! handles, and the lifetime rule binding them. Every cached entry
//! carries its pack identity; the eviction hook debits the pack's
//! cached-bytes counter and, on the zero crossing (or on eviction of any
//! index artifact), drops the pack handle from the registry and closes
//! it. Readers never close packs; cache pressure is the only liveness
//! signal.
//!
//! # Invariants
//! - `key.cached_bytes` equals the summed sizes of the pack's cached
//!   blocks at quiescence (`run_pending_tasks` is the quiescent point).
//! - At most one non-invalid handle per description.
//! - A block returned by `get_or_load` satisfies
//!   `block.contains(pack.key(), aligned_position)`.

use std::any::Any;
use std::sync::Arc;

use crate::block::PackBlock;
use crate::cache_ref::CacheRef;
use crate::config::CacheConfig;
use crate::errors::{ConfigError, LoadError};
use crate::keys::{BlockKey, PackKey};
use crate::pack::{PackDescription, PackFile};
use crate::registry::PackRegistry;
use crate::source::BlockSource;
use crate::weighted::{RemovalCause, WeightedCache};

/// Total `get_or_load` attempts before a persistent ownership-check
/// failure is surfaced. Normal operation needs at most two; the third
/// absorbs one racing re-open.
const MAX_LOAD_ATTEMPTS: usize = 3;

/// Weighted block-and-artifact cache plus pack handle factory.
#[derive(Debug)]
pub struct BlockCache {
    block_size: u32,
    max_stream_through: u64,
    blocks: WeightedCache,
    registry: Arc<PackRegistry>,
}

impl BlockCache {
    /// Builds a cache from a validated configuration.
    ///
    /// # Errors
    /// [`ConfigError`] when the configuration is invalid.
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let registry = Arc::new(PackRegistry::new());
        let hook_registry = Arc::clone(&registry);
        let blocks = WeightedCache::new(
            config.max_bytes,
            move |key: &BlockKey, slot: &CacheRef, cause: RemovalCause| {
                on_evict(&hook_registry, key, slot, cause);
            },
        );

        Ok(Self {
            block_size: config.block_size,
            max_stream_through: config.max_stream_through(),
            blocks,
            registry,
        })
    }

    /// Aligned read window in bytes.
    #[must_use]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Returns true when a payload of `length` bytes should copy through
    /// the cache rather than bypass it.
    #[must_use]
    pub fn should_stream_through(&self, length: u64) -> bool {
        length <= self.max_stream_through
    }

    /// Returns the live handle for `desc`, creating and registering one
    /// if absent or invalid.
    ///
    /// `key_hint` reuses an identity for the new handle (a re-registration
    /// after [`remove`](Self::remove)); pass `None` to allocate fresh.
    pub fn get_or_create_pack(
        &self,
        desc: &PackDescription,
        key_hint: Option<PackKey>,
    ) -> Arc<PackFile> {
        self.registry.get_or_create(desc, key_hint, self.block_size)
    }

    /// Returns the cached block covering `position`, loading it from
    /// `source` on a miss.
    ///
    /// The position is aligned down to its block boundary. Concurrent
    /// callers for the same missing block wait on a single load. A hit
    /// whose block fails its ownership check (the pack identity was
    /// superseded) is invalidated and reloaded; retries are bounded.
    ///
    /// # Errors
    /// - `Read` when the source fails; nothing is cached on that path.
    /// - `StaleRetriesExhausted` when the ownership check keeps failing.
    pub fn get_or_load(
        &self,
        pack: &PackFile,
        position: u64,
        source: &mut dyn BlockSource,
    ) -> Result<Arc<PackBlock>, LoadError> {
        let aligned = pack.align_to_block(position);

        for _ in 0..MAX_LOAD_ATTEMPTS {
            let key = BlockKey::new(pack.key().clone(), aligned as i64);
            let src = &mut *source;
            let slot = self
                .blocks
                .get_or_compute(key.clone(), || {
                    let block = pack.read_one_block(aligned, src)?;
                    pack.key().add_cached_bytes(i64::from(block.size()));
                    Ok(CacheRef::for_block(Arc::new(block)))
                })
                .map_err(LoadError::Read)?;

            if let Some(block) = slot.block() {
                if block.contains(pack.key(), aligned) {
                    return Ok(block);
                }
            }

            // Entry belongs to a superseded identity (or is not a block
            // at all): drop it and retry against the current identity.
            self.blocks.invalidate(&key);
        }

        Err(LoadError::StaleRetriesExhausted {
            position: aligned,
            attempts: MAX_LOAD_ATTEMPTS,
        })
    }

    /// Inserts a block, coalescing with an existing entry at the same
    /// position.
    ///
    /// Returns the entry that ended up cached, which is the existing one
    /// when the position was already present.
    pub fn put_block(&self, block: PackBlock) -> CacheRef {
        let block = Arc::new(block);
        let pack = block.pack().clone();
        let position = block.start() as i64;
        let size = block.size();
        let payload = Arc::clone(&block);

        self.blocks
            .get_or_insert_with(BlockKey::new(pack.clone(), position), move || {
                pack.add_cached_bytes(i64::from(size));
                CacheRef::for_block(payload)
            })
    }

    /// Inserts an arbitrary payload under `(key, position)`, coalescing
    /// with an existing entry.
    ///
    /// Negative positions are index artifact slots and do not count
    /// toward the pack's cached-bytes total; non-negative positions do.
    /// `size` is the payload's eviction weight in bytes.
    pub fn put<T: Any + Send + Sync>(
        &self,
        key: &PackKey,
        position: i64,
        size: u32,
        value: T,
    ) -> CacheRef {
        let pack = key.clone();
        let value: Arc<dyn Any + Send + Sync> = Arc::new(value);

        self.blocks
            .get_or_insert_with(BlockKey::new(key.clone(), position), move || {
                if position >= 0 {
                    pack.add_cached_bytes(i64::from(size));
                }
                CacheRef::for_value(pack.clone(), position, size, value)
            })
    }

    /// Returns the payload cached under `(key, position)`, downcast to
    /// `T`. `None` on absence or type mismatch.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, key: &PackKey, position: i64) -> Option<Arc<T>> {
        self.blocks
            .get_if_present(&BlockKey::new(key.clone(), position))?
            .value::<T>()
    }

    /// Returns true when `(key, position)` is cached.
    #[must_use]
    pub fn contains(&self, key: &PackKey, position: i64) -> bool {
        self.blocks
            .get_if_present(&BlockKey::new(key.clone(), position))
            .is_some()
    }

    /// Removes one cached entry. The eviction hook observes the removal.
    pub fn invalidate(&self, key: &PackKey, position: i64) {
        self.blocks.invalidate(&BlockKey::new(key.clone(), position));
    }

    /// Unregisters and closes a pack handle.
    ///
    /// Idempotent. The handle's cached entries are not proactively
    /// invalidated; they drain under cache pressure, and their eviction
    /// hooks observe an already-unregistered key and do nothing. A newer
    /// handle registered for the same description is unaffected.
    pub fn remove(&self, pack: &PackFile) {
        self.registry.drop_by_key(pack.key());
        pack.key().reset_cached_bytes();
        pack.close();
    }

    /// Clears everything: every cached entry, every registered handle.
    ///
    /// Handles are closed and their counters zeroed. Bulk invalidation
    /// bypasses the per-entry hook, so pending single-entry removals are
    /// flushed first and the registry reset does the rest.
    pub fn clean_up(&self) {
        self.blocks.invalidate_all();
        self.blocks.run_pending_tasks();
        self.registry.clear();
    }

    /// Flushes deferred evictions and hook delivery; the quiescent point
    /// for counter and weight assertions.
    pub fn run_pending_tasks(&self) {
        self.blocks.run_pending_tasks();
    }

    /// Approximate total weight of cached entries in bytes.
    #[must_use]
    pub fn weighted_size(&self) -> u64 {
        self.blocks.weighted_size()
    }

    /// Approximate number of cached entries.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.blocks.entry_count()
    }

    /// Number of registered pack handles.
    #[must_use]
    pub fn registered_packs(&self) -> usize {
        self.registry.len()
    }
}

/// Lifetime coupling: evicting the last block (or any index artifact) of
/// a pack drops and closes its handle.
fn on_evict(registry: &PackRegistry, key: &BlockKey, slot: &CacheRef, cause: RemovalCause) {
    if key.is_index() {
        tracing::debug!(
            position = key.position(),
            ?cause,
            "index artifact evicted; dropping pack"
        );
        registry.drop_by_key(key.pack());
        return;
    }

    let remaining = key.pack().add_cached_bytes(-i64::from(slot.size()));
    if remaining <= 0 {
        registry.drop_by_key(key.pack());
    }
}
