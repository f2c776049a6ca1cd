//! Registry of live pack handles.
//!
//! Two coupled maps: descriptions to handles, and key identities back to
//! descriptions. Both are mutated inside one critical section so the
//! reverse index never disagrees with the forward map. Removed handles
//! are closed after the lock is released; nothing holds the registry
//! lock across a collaborator call.
//!
//! # Invariants
//! - At most one non-invalid handle per description.
//! - `by_description[d] = p` implies `by_key[p.key] = d`.
//! - The reverse index never holds a superseded key: replacing an
//!   invalid handle removes the old pair first.

use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::keys::PackKey;
use crate::pack::{PackDescription, PackFile};

#[derive(Default, Debug)]
struct Maps {
    by_description: AHashMap<PackDescription, Arc<PackFile>>,
    by_key: AHashMap<PackKey, PackDescription>,
}

/// Mapping `PackDescription -> PackFile` with a `PackKey` reverse index.
#[derive(Default, Debug)]
pub struct PackRegistry {
    maps: Mutex<Maps>,
}

impl PackRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live handle for `desc`, creating one if absent.
    ///
    /// An existing non-invalid handle is returned as-is. An invalid one
    /// is replaced: its pair leaves both maps, its counter is zeroed and
    /// it is closed. `key_hint` is used for the new handle when provided
    /// and not already registered; otherwise a fresh key is allocated.
    pub fn get_or_create(
        &self,
        desc: &PackDescription,
        key_hint: Option<PackKey>,
        block_size: u32,
    ) -> Arc<PackFile> {
        let (pack, displaced) = {
            let mut maps = self.maps.lock();
            if let Some(existing) = maps.by_description.get(desc) {
                if !existing.invalid() {
                    return Arc::clone(existing);
                }
            }

            let displaced = maps.by_description.remove(desc);
            if let Some(old) = &displaced {
                maps.by_key.remove(old.key());
            }

            let key = match key_hint {
                Some(hint) if !maps.by_key.contains_key(&hint) => hint,
                _ => PackKey::new(),
            };
            let pack = Arc::new(PackFile::new(desc.clone(), key.clone(), block_size));
            maps.by_description.insert(desc.clone(), Arc::clone(&pack));
            maps.by_key.insert(key, desc.clone());
            (pack, displaced)
        };

        if let Some(old) = displaced {
            Self::retire(&old);
        }
        pack
    }

    /// Drops the pair owned by `key`, if still registered.
    ///
    /// The removed handle's counter is zeroed and the handle closed.
    /// A key that is absent (already dropped, or superseded by a newer
    /// handle for the same description) is a no-op.
    pub fn drop_by_key(&self, key: &PackKey) {
        let removed = {
            let mut maps = self.maps.lock();
            match maps.by_key.remove(key) {
                Some(desc) => {
                    let owns_entry = maps
                        .by_description
                        .get(&desc)
                        .is_some_and(|pack| pack.key() == key);
                    if owns_entry {
                        maps.by_description.remove(&desc)
                    } else {
                        None
                    }
                }
                None => None,
            }
        };

        if let Some(pack) = removed {
            tracing::debug!(pack = %pack.description(), "pack handle dropped from registry");
            Self::retire(&pack);
        }
    }

    /// Drops the pair registered under `desc`, if any.
    pub fn drop_by_description(&self, desc: &PackDescription) {
        let removed = {
            let mut maps = self.maps.lock();
            let pack = maps.by_description.remove(desc);
            if let Some(pack) = &pack {
                maps.by_key.remove(pack.key());
            }
            pack
        };

        if let Some(pack) = removed {
            Self::retire(&pack);
        }
    }

    /// Drops every pair, closing every handle.
    pub fn clear(&self) {
        let drained: Vec<Arc<PackFile>> = {
            let mut maps = self.maps.lock();
            maps.by_key.clear();
            maps.by_description.drain().map(|(_, pack)| pack).collect()
        };

        for pack in drained {
            Self::retire(&pack);
        }
    }

    /// Returns the live handle for `desc` without creating one.
    #[must_use]
    pub fn get(&self, desc: &PackDescription) -> Option<Arc<PackFile>> {
        self.maps.lock().by_description.get(desc).cloned()
    }

    /// Reverse lookup: the description registered for `key`.
    #[must_use]
    pub fn description_of(&self, key: &PackKey) -> Option<PackDescription> {
        self.maps.lock().by_key.get(key).cloned()
    }

    /// Number of registered handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.lock().by_description.len()
    }

    /// Returns true when no handle is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn retire(pack: &PackFile) {
        pack.key().reset_cached_bytes();
        pack.close();
    }
}
