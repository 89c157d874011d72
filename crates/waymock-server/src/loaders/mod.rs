//! Multi-source resource loading.
//!
//! A [`LoaderManager`] lets any number of independent producers (the file
//! reader, a plugin, the programmatic API) each own a replaceable array of
//! records. `create_loader()` hands out an independent [`Loader`] handle;
//! calling [`Loader::load`] replaces only that loader's own records, never
//! another loader's. [`LoaderManager::resources`] is always the live
//! concatenation of every loader's current records in loader-creation
//! order.
//!
//! Every `load()` fires the manager's single on-load callback exactly once,
//! synchronously, with no batching across loaders. Producers that reload
//! rapidly (a file watcher) are expected to debounce before calling `load`;
//! the manager itself never coalesces.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

type OnLoad = Arc<dyn Fn() + Send + Sync>;
type Slot<T> = Arc<RwLock<Vec<T>>>;

/// Owns the per-loader record slots and the shared on-load callback.
pub struct LoaderManager<T> {
    slots: RwLock<Vec<Slot<T>>>,
    on_load: Arc<RwLock<Option<OnLoad>>>,
    /// Human-readable tag used in logs ("routes", "collections").
    tag: &'static str,
}

impl<T: Clone> LoaderManager<T> {
    pub fn new(tag: &'static str) -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
            on_load: Arc::new(RwLock::new(None)),
            tag,
        }
    }

    /// Install the callback fired synchronously after every `load()`.
    /// Replaces any previously installed callback.
    pub fn on_load(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.on_load.write() = Some(Arc::new(callback));
    }

    /// Create a fresh, independent loader.
    pub fn create_loader(&self) -> Loader<T> {
        let slot: Slot<T> = Arc::new(RwLock::new(Vec::new()));
        self.slots.write().push(Arc::clone(&slot));
        Loader {
            slot,
            on_load: Arc::clone(&self.on_load),
            tag: self.tag,
        }
    }

    /// Concatenation of all loaders' current records, in creation order.
    pub fn resources(&self) -> Vec<T> {
        let slots = self.slots.read();
        let mut all = Vec::new();
        for slot in slots.iter() {
            all.extend(slot.read().iter().cloned());
        }
        all
    }

    pub fn loader_count(&self) -> usize {
        self.slots.read().len()
    }
}

/// Handle owned by one producer. Each `load` is a full replacement of this
/// producer's records; deltas are not supported.
pub struct Loader<T> {
    slot: Slot<T>,
    on_load: Arc<RwLock<Option<OnLoad>>>,
    tag: &'static str,
}

impl<T: Clone> Loader<T> {
    pub fn load(&self, records: Vec<T>) {
        let count = records.len();
        *self.slot.write() = records;
        debug!(tag = self.tag, records = count, "loader records replaced");

        let callback = self.on_load.read().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_loader_isolation() {
        let manager: LoaderManager<u32> = LoaderManager::new("test");
        let first = manager.create_loader();
        let second = manager.create_loader();

        first.load(vec![1, 2]);
        second.load(vec![3, 4]);
        assert_eq!(manager.resources(), vec![1, 2, 3, 4]);

        // Reloading the first loader replaces only its own records and
        // keeps creation order.
        first.load(vec![9, 8]);
        assert_eq!(manager.resources(), vec![9, 8, 3, 4]);
        assert_eq!(manager.loader_count(), 2);
    }

    #[test]
    fn test_on_load_fires_once_per_load() {
        let manager: LoaderManager<u32> = LoaderManager::new("test");
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        manager.on_load(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let a = manager.create_loader();
        let b = manager.create_loader();
        a.load(vec![1]);
        a.load(vec![2]);
        b.load(vec![3]);
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_empty_load_still_notifies() {
        let manager: LoaderManager<u32> = LoaderManager::new("test");
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        manager.on_load(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let a = manager.create_loader();
        a.load(Vec::new());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(manager.resources().is_empty());
    }
}
