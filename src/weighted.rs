//! Bounded, weighted, concurrent store for cache entries.
//!
//! Thin wrapper over a TinyLFU-admitting weighted cache. Two contract
//! points matter to the rest of the crate:
//!
//! - `get_or_compute` runs its loader at most once per absent key;
//!   concurrent callers for the same key block on the first.
//! - The eviction hook fires exactly once per physical removal, whether
//!   explicit or capacity-driven. Delivery is batched by the backing
//!   cache; `run_pending_tasks` is the quiescent point at which every
//!   pending removal has been observed by the hook.

use std::sync::Arc;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;

pub use moka::notification::RemovalCause;

use crate::cache_ref::CacheRef;
use crate::errors::PackReadError;
use crate::keys::BlockKey;

/// Fixed per-entry weight covering key and entry headers.
pub const ENTRY_OVERHEAD_BYTES: u32 = 60;

/// Bounded weighted map from [`BlockKey`] to [`CacheRef`].
#[derive(Debug)]
pub struct WeightedCache {
    cache: Cache<BlockKey, CacheRef, ahash::RandomState>,
}

impl WeightedCache {
    /// Builds a store bounded by `max_bytes` total weight.
    ///
    /// `hook` observes every physical removal with its cause.
    pub fn new<H>(max_bytes: u64, hook: H) -> Self
    where
        H: Fn(&BlockKey, &CacheRef, RemovalCause) + Send + Sync + 'static,
    {
        let cache = Cache::builder()
            .max_capacity(max_bytes)
            .weigher(|_key: &BlockKey, slot: &CacheRef| {
                ENTRY_OVERHEAD_BYTES.saturating_add(slot.size())
            })
            .eviction_policy(EvictionPolicy::tiny_lfu())
            .eviction_listener(move |key: Arc<BlockKey>, slot: CacheRef, cause: RemovalCause| {
                hook(&key, &slot, cause);
            })
            .build_with_hasher(ahash::RandomState::new());
        Self { cache }
    }

    /// Returns the cached entry for `key`, loading it if absent.
    ///
    /// The loader runs at most once per absent key across all threads;
    /// concurrent callers wait for the winner and share its result. A
    /// failing loader admits nothing, and its error is shared by every
    /// waiter.
    pub fn get_or_compute<F>(&self, key: BlockKey, loader: F) -> Result<CacheRef, Arc<PackReadError>>
    where
        F: FnOnce() -> Result<CacheRef, PackReadError>,
    {
        self.cache.try_get_with(key, loader)
    }

    /// Returns the cached entry for `key`, inserting `make()` if absent.
    ///
    /// Same singleton guarantee as [`get_or_compute`](Self::get_or_compute),
    /// for infallible producers.
    pub fn get_or_insert_with<F>(&self, key: BlockKey, make: F) -> CacheRef
    where
        F: FnOnce() -> CacheRef,
    {
        self.cache.get_with(key, make)
    }

    /// Returns the cached entry without loading.
    #[must_use]
    pub fn get_if_present(&self, key: &BlockKey) -> Option<CacheRef> {
        self.cache.get(key)
    }

    /// Removes one entry. The hook observes the removal.
    pub fn invalidate(&self, key: &BlockKey) {
        self.cache.invalidate(key);
    }

    /// Discards every entry.
    ///
    /// Bulk invalidation bypasses the hook; callers owning derived state
    /// (counters, registries) must reset it themselves.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Flushes pending maintenance: deferred evictions and hook delivery.
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }

    /// Approximate total weight of cached entries in bytes.
    #[must_use]
    pub fn weighted_size(&self) -> u64 {
        self.cache.weighted_size()
    }

    /// Approximate number of cached entries.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::PackKey;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn slot(pack: &PackKey, position: i64, size: u32) -> CacheRef {
        CacheRef::for_value(pack.clone(), position, size, Arc::new(size))
    }

    #[test]
    fn loader_runs_once_per_key() {
        let cache = WeightedCache::new(4096, |_, _, _| {});
        let pack = PackKey::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let made = cache
                .get_or_compute(BlockKey::new(pack.clone(), 0), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(slot(&pack, 0, 512))
                })
                .expect("loaded");
            assert_eq!(made.size(), 512);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_loader_admits_nothing() {
        let cache = WeightedCache::new(4096, |_, _, _| {});
        let pack = PackKey::new();
        let key = BlockKey::new(pack.clone(), 0);

        let err = cache
            .get_or_compute(key.clone(), || {
                Err(PackReadError::OutOfRange { offset: 0, len: 512 })
            })
            .unwrap_err();
        assert!(matches!(*err, PackReadError::OutOfRange { .. }));
        assert!(cache.get_if_present(&key).is_none());

        // The key is not poisoned; the next loader runs.
        cache
            .get_or_compute(key.clone(), || Ok(slot(&pack, 0, 512)))
            .expect("second load");
        assert!(cache.get_if_present(&key).is_some());
    }

    #[test]
    fn hook_observes_explicit_invalidation() {
        let removed = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&removed);
        let cache = WeightedCache::new(4096, move |_, _, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let pack = PackKey::new();
        let key = BlockKey::new(pack.clone(), 0);
        cache.get_or_insert_with(key.clone(), || slot(&pack, 0, 512));
        cache.invalidate(&key);
        cache.run_pending_tasks();

        assert_eq!(removed.load(Ordering::SeqCst), 1);
        assert!(cache.get_if_present(&key).is_none());
    }

    #[test]
    fn capacity_evictions_keep_weight_bounded() {
        let removed = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&removed);
        let cache = WeightedCache::new(2048, move |_, _, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let pack = PackKey::new();
        for i in 0..8 {
            let position = i64::from(i) * 512;
            cache.get_or_insert_with(BlockKey::new(pack.clone(), position), || {
                slot(&pack, position, 512)
            });
            cache.run_pending_tasks();
        }

        assert!(cache.weighted_size() <= 2048 + u64::from(ENTRY_OVERHEAD_BYTES + 512));
        assert!(removed.load(Ordering::SeqCst) >= 1);
    }
}
