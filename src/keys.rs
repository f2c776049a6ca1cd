//! Identity tokens for live packs and cached entries.
//!
//! A `PackKey` is allocated once per live pack handle and compares by
//! allocation identity, not by value: re-opening a pack under the same
//! description yields a distinct key, which is how superseded cache
//! entries are told apart from current ones. The key carries the running
//! total of cached block bytes owned by its pack; the eviction pathway
//! debits it and uses the zero crossing as the signal that the pack
//! handle has gone cold.
//!
//! # Invariants
//! - Two keys compare equal iff they are the same allocation.
//! - `cached_bytes` converges to the sum of cached block sizes for the
//!   key at quiescence; it may transiently over- or undershoot while
//!   admissions and evictions race.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Seed for per-allocation key hashes. Odd increment keeps the mixed
/// sequence full-period.
static NEXT_KEY_SEED: AtomicU64 = AtomicU64::new(0x9e37_79b9_7f4a_7c15);

/// 64-bit avalanche mix to spread sequential seeds across hash space.
#[inline]
fn mix64(mut x: u64) -> u64 {
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^= x >> 33;
    x
}

struct PackKeyInner {
    hash: u32,
    cached_bytes: AtomicI64,
}

/// Identity token for a live pack.
///
/// Cheap to clone; all clones share the same allocation and counter.
#[derive(Clone)]
pub struct PackKey {
    inner: Arc<PackKeyInner>,
}

impl PackKey {
    /// Allocates a fresh key with a zeroed counter.
    #[must_use]
    pub fn new() -> Self {
        let seed = NEXT_KEY_SEED.fetch_add(0x9e37_79b9_7f4a_7c15, Ordering::Relaxed);
        let mixed = mix64(seed);
        Self {
            inner: Arc::new(PackKeyInner {
                hash: (mixed ^ (mixed >> 32)) as u32,
                cached_bytes: AtomicI64::new(0),
            }),
        }
    }

    /// Returns the precomputed hash used for sharding and map placement.
    #[must_use]
    pub fn hash_value(&self) -> u32 {
        self.inner.hash
    }

    /// Current cached block bytes attributed to this pack.
    #[must_use]
    pub fn cached_bytes(&self) -> i64 {
        self.inner.cached_bytes.load(Ordering::Acquire)
    }

    /// Adjusts the counter by `delta` and returns the new total.
    pub(crate) fn add_cached_bytes(&self, delta: i64) -> i64 {
        self.inner.cached_bytes.fetch_add(delta, Ordering::AcqRel) + delta
    }

    /// Resets the counter to zero.
    pub(crate) fn reset_cached_bytes(&self) {
        self.inner.cached_bytes.store(0, Ordering::Release);
    }
}

impl Default for PackKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for PackKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for PackKey {}

impl Hash for PackKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.inner.hash);
    }
}

impl fmt::Debug for PackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackKey")
            .field("hash", &self.inner.hash)
            .field("cached_bytes", &self.cached_bytes())
            .finish()
    }
}

/// Composite identity of a cached entry: pack identity plus position.
///
/// Non-negative positions address data blocks by aligned byte offset.
/// Negative positions address per-pack index artifact slots; the sign is
/// the discriminator.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct BlockKey {
    pack: PackKey,
    position: i64,
}

impl BlockKey {
    /// Builds a key for the given pack identity and position.
    #[must_use]
    pub fn new(pack: PackKey, position: i64) -> Self {
        Self { pack, position }
    }

    /// Pack identity component.
    #[must_use]
    pub fn pack(&self) -> &PackKey {
        &self.pack
    }

    /// Position component. Negative values are index artifact slots.
    #[must_use]
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Returns true when this key addresses an index artifact slot.
    #[must_use]
    pub fn is_index(&self) -> bool {
        self.position < 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn keys_compare_by_identity() {
        let a = PackKey::new();
        let b = PackKey::new();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn clones_share_the_counter() {
        let key = PackKey::new();
        let other = key.clone();
        key.add_cached_bytes(512);
        assert_eq!(other.cached_bytes(), 512);
        other.add_cached_bytes(-512);
        assert_eq!(key.cached_bytes(), 0);
    }

    #[test]
    fn add_returns_the_new_total() {
        let key = PackKey::new();
        assert_eq!(key.add_cached_bytes(100), 100);
        assert_eq!(key.add_cached_bytes(-300), -200);
        key.reset_cached_bytes();
        assert_eq!(key.cached_bytes(), 0);
    }

    #[test]
    fn block_keys_distinguish_positions_and_packs() {
        let pack = PackKey::new();
        let a = BlockKey::new(pack.clone(), 0);
        let b = BlockKey::new(pack.clone(), 512);
        let c = BlockKey::new(PackKey::new(), 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, BlockKey::new(pack, 0));
    }

    #[test]
    fn hash_follows_identity() {
        let pack = PackKey::new();
        let a = BlockKey::new(pack.clone(), 7);
        let b = BlockKey::new(pack, 7);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn negative_positions_are_index_slots() {
        let pack = PackKey::new();
        assert!(BlockKey::new(pack.clone(), -1).is_index());
        assert!(!BlockKey::new(pack, 0).is_index());
    }
}
