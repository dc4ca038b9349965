use crate::RhiError;
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Per-resource map from view-descriptor hash to the live view for that
/// descriptor. Entries hold weak references; a view keeps itself registered
/// for exactly as long as strong references to it exist, and erases its own
/// entry from its resource's cache when the last one goes away.
pub(crate) struct ViewCache<V> {
    views: Mutex<FxHashMap<u64, Weak<V>>>,
}

impl<V> Default for ViewCache<V> {
    fn default() -> Self {
        Self {
            views: Mutex::new(FxHashMap::default()),
        }
    }
}

impl<V> ViewCache<V> {
    /// Returns the cached view for `hash`, or constructs one with `create`.
    ///
    /// The upgrade happens under the lock: it either extends the lifetime of
    /// a live view atomically, or fails for a view whose last reference is
    /// mid-destruction, in which case the stale entry is dropped and the
    /// construct path runs. Construction itself happens outside the lock;
    /// two threads racing the same new descriptor both receive valid views
    /// and the last insert wins the map slot.
    pub fn get_or_create(
        &self,
        hash: u64,
        create: impl FnOnce() -> Result<V, RhiError>,
    ) -> Result<Arc<V>, RhiError> {
        {
            let mut views = self.views.lock();
            if let Some(entry) = views.get(&hash) {
                if let Some(view) = entry.upgrade() {
                    return Ok(view);
                }
                views.remove(&hash);
            }
        }

        let view = Arc::new(create()?);
        self.views.lock().insert(hash, Arc::downgrade(&view));
        Ok(view)
    }

    /// Removes the entry for `hash`, but only if it still refers to `view`.
    /// A dying view must not evict a newer view that replaced it under the
    /// same hash.
    pub fn erase(&self, hash: u64, view: *const V) {
        let mut views = self.views.lock();
        if let Some(entry) = views.get(&hash) {
            if Weak::as_ptr(entry) == view {
                views.remove(&hash);
            }
        }
    }

    /// Query-only existence check; does not touch reference counts.
    pub fn contains(&self, hash: u64) -> bool {
        self.views
            .lock()
            .get(&hash)
            .map_or(false, |entry| entry.strong_count() > 0)
    }

    pub fn live_view_count(&self) -> usize {
        self.views
            .lock()
            .values()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }

    /// Drops every entry. Outstanding views stay alive through their own
    /// strong references; they just stop being findable, so later requests
    /// build fresh views.
    pub fn clear(&self) {
        self.views.lock().clear();
    }
}
