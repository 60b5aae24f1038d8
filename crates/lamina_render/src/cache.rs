//! Screenshot cache
//!
//! Exact-key store of composited rasters, shared by the dispatcher thread,
//! screenshot handles and the UI thread behind one lock. Entries are bounded
//! by count per layer set (oldest first out) and dropped wholesale when the
//! content they show changes; pixels are never patched in place.

use crate::key::{Screenshot, ScreenshotKey};
use lamina_core::{LayerId, LayerSetId, Rect};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Hit and eviction counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct Entries {
    map: FxHashMap<ScreenshotKey, Arc<Screenshot>>,
    total_bytes: usize,
    stats: CacheStats,
}

impl Entries {
    fn remove_where(&mut self, mut doomed: impl FnMut(&Screenshot) -> bool) -> Vec<Arc<Screenshot>> {
        let keys: Vec<ScreenshotKey> = self
            .map
            .iter()
            .filter(|(_, shot)| {
                let shot: &Screenshot = shot;
                doomed(shot)
            })
            .map(|(key, _)| key.clone())
            .collect();
        keys.iter().filter_map(|key| self.remove(key)).collect()
    }

    fn remove(&mut self, key: &ScreenshotKey) -> Option<Arc<Screenshot>> {
        let shot = self.map.remove(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(shot.byte_len());
        self.stats.evictions += 1;
        Some(shot)
    }

    /// Keys with their creation time, oldest first
    fn oldest(&self, layer_set: Option<LayerSetId>) -> Vec<(std::time::Instant, ScreenshotKey)> {
        let mut by_age: Vec<_> = self
            .map
            .iter()
            .filter(|(key, _)| layer_set.map_or(true, |set| key.layer_set == set))
            .map(|(key, shot)| (shot.created_at(), key.clone()))
            .collect();
        by_age.sort_by_key(|(created, _)| *created);
        by_age
    }
}

pub struct ScreenshotCache {
    entries: Mutex<Entries>,
    max_per_layer_set: usize,
}

impl ScreenshotCache {
    pub fn new(max_per_layer_set: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            max_per_layer_set: max_per_layer_set.max(1),
        }
    }

    pub fn max_per_layer_set(&self) -> usize {
        self.max_per_layer_set
    }

    pub fn get(&self, key: &ScreenshotKey) -> Option<Arc<Screenshot>> {
        let mut entries = self.entries.lock();
        let found = entries.map.get(key).cloned();
        if found.is_some() {
            entries.stats.hits += 1;
        } else {
            entries.stats.misses += 1;
        }
        found
    }

    pub fn contains(&self, key: &ScreenshotKey) -> bool {
        self.entries.lock().map.contains_key(key)
    }

    /// Store a screenshot, replacing any entry with the same key, then
    /// enforce the count bound of its layer set
    pub fn put(&self, screenshot: Screenshot) -> Arc<Screenshot> {
        let shot = Arc::new(screenshot);
        let layer_set = shot.key().layer_set;
        let evicted = {
            let mut entries = self.entries.lock();
            entries.total_bytes += shot.byte_len();
            if let Some(old) = entries.map.insert(shot.key().clone(), Arc::clone(&shot)) {
                entries.total_bytes = entries.total_bytes.saturating_sub(old.byte_len());
            }
            Self::trim_set(&mut entries, layer_set, self.max_per_layer_set)
        };
        if evicted > 0 {
            tracing::debug!(%layer_set, evicted, "screenshot cache over bound");
        }
        shot
    }

    fn trim_set(entries: &mut Entries, layer_set: LayerSetId, max: usize) -> usize {
        let by_age = entries.oldest(Some(layer_set));
        let excess = by_age.len().saturating_sub(max);
        by_age
            .iter()
            .take(excess)
            .filter(|(_, key)| entries.remove(key).is_some())
            .count()
    }

    /// Drop every screenshot showing content of `layer`
    pub fn invalidate(&self, layer: LayerId) -> usize {
        let removed = self.entries.lock().remove_where(|shot| shot.key().involves_layer(layer));
        if !removed.is_empty() {
            tracing::debug!(%layer, removed = removed.len(), "invalidated screenshots");
        }
        removed.len()
    }

    pub fn invalidate_layer_set(&self, layer_set: LayerSetId) -> usize {
        self.entries
            .lock()
            .remove_where(|shot| shot.key().layer_set == layer_set)
            .len()
    }

    /// Drop every screenshot of `layer_set` whose view intersects `rect`,
    /// for changes to objects that span several layers
    pub fn invalidate_intersecting(&self, layer_set: LayerSetId, rect: &Rect) -> usize {
        let removed = self.entries.lock().remove_where(|shot| {
            shot.key().layer_set == layer_set && shot.key().world_rect().intersects(rect)
        });
        if !removed.is_empty() {
            tracing::debug!(%layer_set, removed = removed.len(), "invalidated screenshots in region");
        }
        removed.len()
    }

    /// Enforce `max_per_layer_set` on every layer set
    pub fn trim(&self, max_per_layer_set: usize) -> usize {
        let mut entries = self.entries.lock();
        let mut sets: Vec<LayerSetId> = entries.map.keys().map(|k| k.layer_set).collect();
        sets.sort_unstable();
        sets.dedup();
        sets.into_iter()
            .map(|set| Self::trim_set(&mut entries, set, max_per_layer_set))
            .sum()
    }

    /// Evict oldest screenshots until at least `bytes` are freed or the
    /// cache is empty. Returns the bytes freed.
    pub fn reclaim(&self, bytes: usize) -> usize {
        let mut entries = self.entries.lock();
        let mut freed = 0usize;
        for (_, key) in entries.oldest(None) {
            if freed >= bytes {
                break;
            }
            if let Some(shot) = entries.remove(&key) {
                freed += shot.byte_len();
            }
        }
        drop(entries);
        if freed > 0 {
            tracing::debug!(requested = bytes, freed, "reclaimed screenshot memory");
        }
        freed
    }

    pub fn flush(&self) {
        let mut entries = self.entries.lock();
        let count = entries.map.len();
        entries.map.clear();
        entries.total_bytes = 0;
        entries.stats.evictions += count as u64;
        drop(entries);
        tracing::debug!(count, "flushed screenshot cache");
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.entries.lock().total_bytes
    }

    pub fn stats(&self) -> CacheStats {
        self.entries.lock().stats
    }
}

impl Default for ScreenshotCache {
    fn default() -> Self {
        Self::new(128)
    }
}

impl std::fmt::Debug for ScreenshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("ScreenshotCache")
            .field("len", &entries.map.len())
            .field("total_bytes", &entries.total_bytes)
            .field("max_per_layer_set", &self.max_per_layer_set)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamina_core::{CompositeMode, ContextLayer, PixelSize, ViewState};
    use lamina_paint::Raster;

    fn view(set: u64, layer: u64, x: f64) -> ViewState {
        ViewState::new(
            LayerSetId::new(set),
            LayerId::new(layer),
            Rect::new(x, 0.0, 10.0, 10.0),
            1.0,
        )
    }

    fn shot(view: &ViewState) -> Screenshot {
        let raster = Raster::try_new(view.pixel_size()).unwrap();
        Screenshot::new(ScreenshotKey::from_view(view), raster, [])
    }

    #[test]
    fn test_get_requires_exact_key() {
        let cache = ScreenshotCache::new(8);
        let v = view(1, 1, 0.0);
        cache.put(shot(&v));
        assert!(cache.get(&ScreenshotKey::from_view(&v)).is_some());
        let nudged = view(1, 1, 0.000_001);
        assert!(cache.get(&ScreenshotKey::from_view(&nudged)).is_none());
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_bound_evicts_oldest_per_layer_set() {
        let cache = ScreenshotCache::new(2);
        let first = view(1, 1, 0.0);
        cache.put(shot(&first));
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.put(shot(&view(1, 1, 10.0)));
        std::thread::sleep(std::time::Duration::from_millis(2));
        // Other layer set does not count against set 1
        cache.put(shot(&view(2, 1, 0.0)));
        assert_eq!(cache.len(), 3);

        cache.put(shot(&view(1, 1, 20.0)));
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&ScreenshotKey::from_view(&first)));
    }

    #[test]
    fn test_invalidate_drops_ghost_users_of_layer() {
        let cache = ScreenshotCache::new(8);
        let ghosted = view(1, 1, 0.0)
            .with_mode(CompositeMode::MultiLayer)
            .with_context_layers([ContextLayer::new(LayerId::new(2), 1)]);
        cache.put(shot(&ghosted));
        cache.put(shot(&view(1, 3, 0.0)));
        assert_eq!(cache.invalidate(LayerId::new(2)), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_intersecting_is_per_entry() {
        let cache = ScreenshotCache::new(8);
        cache.put(shot(&view(1, 1, 0.0)));
        cache.put(shot(&view(1, 1, 100.0)));
        let removed = cache.invalidate_intersecting(LayerSetId::new(1), &Rect::new(5.0, 5.0, 1.0, 1.0));
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_reclaim_and_byte_accounting() {
        let cache = ScreenshotCache::new(8);
        cache.put(shot(&view(1, 1, 0.0)));
        cache.put(shot(&view(1, 1, 10.0)));
        let per_shot = PixelSize::new(10, 10).rgba_bytes();
        assert_eq!(cache.total_bytes(), 2 * per_shot);

        assert_eq!(cache.reclaim(1), per_shot);
        assert_eq!(cache.total_bytes(), per_shot);
        cache.flush();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_replacing_same_key_keeps_bytes_consistent() {
        let cache = ScreenshotCache::new(8);
        let v = view(1, 1, 0.0);
        cache.put(shot(&v));
        cache.put(shot(&v));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), PixelSize::new(10, 10).rgba_bytes());
    }
}
