//! Process-wide active cache.
//!
//! One cache instance serves a process; collaborators load it through
//! [`current`] on every use rather than holding it, so a
//! [`replace`]/[`reconfigure`] takes effect for subsequent operations.
//! Loads are lock-free; replacement tears down the displaced instance
//! after the swap.

use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;

use crate::cache::BlockCache;
use crate::config::CacheConfig;
use crate::errors::ConfigError;

static CURRENT: OnceLock<ArcSwap<BlockCache>> = OnceLock::new();

fn slot() -> &'static ArcSwap<BlockCache> {
    CURRENT.get_or_init(|| {
        let cache = BlockCache::new(CacheConfig::default()).expect("default cache config is valid");
        ArcSwap::from_pointee(cache)
    })
}

/// Returns the currently active cache. Lock-free.
#[must_use]
pub fn current() -> Arc<BlockCache> {
    slot().load_full()
}

/// Installs `new` as the active cache and cleans up the displaced one.
///
/// In-flight operations against the old instance finish against it; its
/// entries and registered handles are cleared once the swap is visible.
pub fn replace(new: Arc<BlockCache>) {
    let old = slot().swap(new);
    old.clean_up();
}

/// Builds a cache from `config` and installs it as the active instance.
///
/// # Errors
/// [`ConfigError`] when the configuration is invalid; the active
/// instance is left untouched on that path.
pub fn reconfigure(config: CacheConfig) -> Result<(), ConfigError> {
    replace(Arc::new(BlockCache::new(config)?));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::PackDescription;

    // The slot is process-global and the harness runs tests in parallel,
    // so the whole lifecycle is exercised in one sequential test.
    #[test]
    fn replace_and_reconfigure_lifecycle() {
        let installed = Arc::new(
            BlockCache::new(CacheConfig {
                block_size: 512,
                max_bytes: 8192,
                stream_ratio: 0.5,
            })
            .expect("valid config"),
        );
        replace(Arc::clone(&installed));
        assert!(Arc::ptr_eq(&current(), &installed));

        // Displacing an instance cleans it up.
        let pack = installed.get_or_create_pack(&PackDescription::new("swap-me"), None);
        reconfigure(CacheConfig::default()).expect("reconfigure");
        assert!(pack.is_closed());
        assert_eq!(installed.registered_packs(), 0);

        // A rejected configuration leaves the active instance untouched.
        let active = current();
        let err = reconfigure(CacheConfig {
            block_size: 100,
            max_bytes: 1,
            stream_ratio: 0.5,
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::BlockSizeTooSmall { .. }));
        assert!(Arc::ptr_eq(&current(), &active));
    }
}
