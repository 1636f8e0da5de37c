use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// In-memory result cache with single-flight computation per key.
///
/// Entries live until [`clear`](Self::clear); there is no expiry and no size
/// bound. While a key is being computed, concurrent callers for the same key
/// wait on the in-flight computation instead of starting their own. A failed
/// computation removes its slot so the next caller retries.
pub struct ResultCache<V> {
    entries: DashMap<String, Arc<OnceCell<Arc<V>>>>,
}

impl<V> ResultCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        self.entries.get(key).and_then(|cell| cell.get().cloned())
    }

    pub fn put(&self, key: impl Into<String>, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.entries
            .insert(key.into(), Arc::new(OnceCell::new_with(Some(Arc::clone(&value)))));
        value
    }

    /// Return the cached value for `key`, or run `compute` exactly once across
    /// all concurrent callers. The flag is true when this call ran `compute`.
    pub async fn get_or_try_compute<F, Fut, E>(&self, key: &str, compute: F) -> Result<(Arc<V>, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        // Clone the cell out so no map shard lock is held across the await
        let cell = Arc::clone(
            self.entries
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );

        let mut computed = false;
        let result = cell
            .get_or_try_init(|| {
                computed = true;
                async move { compute().await.map(Arc::new) }
            })
            .await
            .map(Arc::clone);

        match result {
            Ok(value) => Ok((value, computed)),
            Err(err) => {
                // Drop the empty slot unless another caller is still waiting on it
                self.entries.remove_if(key, |_, slot| {
                    Arc::ptr_eq(slot, &cell) && !slot.initialized() && Arc::strong_count(slot) <= 2
                });
                Err(err)
            }
        }
    }

    /// Drop every entry, returning how many held a value.
    pub fn clear(&self) -> usize {
        let removed = self.len();
        self.entries.clear();
        removed
    }

    /// Number of completed entries
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Default for ResultCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
