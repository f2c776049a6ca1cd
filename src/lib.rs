//! Weighted in-memory block cache and pack-handle registry for
//! pack-file-based object stores.
//!
//! Pack files are large append-only containers read at byte offsets,
//! one fixed-size aligned block at a time. This crate memoizes those
//! blocks together with the opaque per-pack index artifacts (reverse
//! indices, bitmaps, offset maps) produced by external collaborators,
//! and acts as the factory for the per-pack handle ([`PackFile`]) and
//! identity token ([`PackKey`]) that readers carry around.
//!
//! Three concerns share one weight budget:
//! - a bounded weighted cache with TinyLFU-style eviction and a
//!   singleton loader per missing key,
//! - a registry guaranteeing one live handle per pack description,
//! - a lifetime rule: evicting a pack's last block or any of its index
//!   artifacts drops and closes the handle. Readers never close packs;
//!   cache pressure is the only liveness signal.
//!
//! Read flow: reader -> [`BlockCache::get_or_load`] -> align position ->
//! weighted-cache lookup; on miss the pack handle reads one block from
//! the caller's [`BlockSource`], the entry is admitted and the pack's
//! cached-bytes counter credited. Eviction debits the counter; the zero
//! crossing unregisters and closes the handle.
//!
//! The cache is in-memory only and safe under arbitrary multi-threaded
//! use. A process-wide active instance lives in [`instance`].

pub mod block;
pub mod cache;
pub mod cache_ref;
pub mod config;
pub mod errors;
pub mod instance;
pub mod keys;
pub mod pack;
pub mod registry;
pub mod source;
pub mod weighted;

pub use block::PackBlock;
pub use cache::BlockCache;
pub use cache_ref::CacheRef;
pub use config::{
    CacheConfig, DEFAULT_BLOCK_SIZE, DEFAULT_MAX_BYTES, DEFAULT_STREAM_RATIO, MIN_BLOCK_SIZE,
};
pub use errors::{ConfigError, LoadError, PackReadError};
pub use keys::{BlockKey, PackKey};
pub use pack::{PackDescription, PackFile, POS_BITMAP_INDEX, POS_INDEX, POS_REVERSE_INDEX};
pub use registry::PackRegistry;
pub use source::{BlockSource, MemoryBlockSource};
pub use weighted::{RemovalCause, WeightedCache, ENTRY_OVERHEAD_BYTES};
