//! Generic keyed free-list pool. Grounded in `pool.rs`'s
//! `RwLock<HashMap<usize, Lane<B>>>` descriptor-set pool, generalized from
//! that one Key/Item instantiation (layout-id → descriptor pool) into the
//! generic `K`/`I` the spec's §4.2 table requires (command pools, descriptor
//! sets, query pools, framebuffers).

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

/// A keyed stack of recycled items. `mint` is called to produce a brand-new
/// item when `acquire` finds an empty bucket for `key`.
struct Bucket<I> {
    free: Vec<I>,
}

impl<I> Bucket<I> {
    fn new() -> Self {
        Self { free: Vec::new() }
    }
}

/// `map Key -> Stack<Item>`; items are leased via [`PoolManager::acquire`]
/// and returned to their bucket when the [`PoolItem`] lease is dropped.
pub struct PoolManager<K: Eq + Hash + Clone, I> {
    buckets: Mutex<HashMap<K, Bucket<I>>>,
}

impl<K: Eq + Hash + Clone, I> Default for PoolManager<K, I> {
    fn default() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, I> PoolManager<K, I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a free item is available under `key` without consuming it.
    pub fn has_free(&self, key: &K) -> bool {
        self.buckets
            .lock()
            .get(key)
            .map(|b| !b.free.is_empty())
            .unwrap_or(false)
    }

    /// Number of free items currently parked under `key`.
    pub fn free_count(&self, key: &K) -> usize {
        self.buckets.lock().get(key).map(|b| b.free.len()).unwrap_or(0)
    }

    /// Total number of distinct buckets ever created (one per unique key).
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Lease a free item under `key`, minting one with `mint` if the bucket
    /// is empty or doesn't exist yet.
    pub fn acquire(self: &Arc<Self>, key: K, mint: impl FnOnce() -> I) -> PoolItem<K, I> {
        let item = {
            let mut buckets = self.buckets.lock();
            let bucket = buckets.entry(key.clone()).or_insert_with(Bucket::new);
            bucket.free.pop()
        };
        let item = item.unwrap_or_else(mint);
        PoolItem {
            key,
            item: Some(item),
            pool: self.clone(),
        }
    }

    /// Mint a new leased item under `key` unconditionally, bypassing the
    /// free list. Used when the caller already knows no reusable item
    /// exists (e.g. the very first allocation for a brand-new key).
    pub fn create(self: &Arc<Self>, key: K, item: I) -> PoolItem<K, I> {
        self.buckets.lock().entry(key.clone()).or_insert_with(Bucket::new);
        PoolItem {
            key,
            item: Some(item),
            pool: self.clone(),
        }
    }

    fn release(&self, key: &K, item: I) {
        let mut buckets = self.buckets.lock();
        buckets.entry(key.clone()).or_insert_with(Bucket::new).free.push(item);
    }
}

/// An RAII lease of a pooled item; returns to its bucket on drop.
pub struct PoolItem<K: Eq + Hash + Clone, I> {
    key: K,
    item: Option<I>,
    pool: Arc<PoolManager<K, I>>,
}

impl<K: Eq + Hash + Clone, I> PoolItem<K, I> {
    pub fn get(&self) -> &I {
        self.item.as_ref().expect("[PoolItem] item taken before drop")
    }

    pub fn get_mut(&mut self) -> &mut I {
        self.item.as_mut().expect("[PoolItem] item taken before drop")
    }
}

impl<K: Eq + Hash + Clone, I> Drop for PoolItem<K, I> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(&self.key, item);
        }
    }
}

impl<K: Eq + Hash + Clone + fmt::Debug, I> fmt::Debug for PoolManager<K, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buckets = self.buckets.lock();
        f.debug_struct("PoolManager")
            .field("keys", &buckets.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_drop_round_trips() {
        let pool: Arc<PoolManager<u32, String>> = Arc::new(PoolManager::new());
        assert!(!pool.has_free(&1));
        {
            let item = pool.acquire(1, || "fresh".to_string());
            assert_eq!(item.get(), "fresh");
            assert!(!pool.has_free(&1));
        }
        // property 3: acquire -> drop -> has_free == true
        assert!(pool.has_free(&1));
        assert_eq!(pool.free_count(&1), 1);
    }

    #[test]
    fn reacquire_reuses_the_same_item_without_minting() {
        let pool: Arc<PoolManager<&'static str, u32>> = Arc::new(PoolManager::new());
        let mut mint_calls = 0;
        {
            let _a = pool.acquire("k", || {
                mint_calls += 1;
                7
            });
        }
        {
            let item = pool.acquire("k", || {
                mint_calls += 1;
                99
            });
            assert_eq!(*item.get(), 7);
        }
        assert_eq!(mint_calls, 1);
    }

    #[test]
    fn distinct_keys_do_not_share_buckets() {
        let pool: Arc<PoolManager<u32, u32>> = Arc::new(PoolManager::new());
        let _a = pool.acquire(1, || 10);
        let _b = pool.acquire(2, || 20);
        assert_eq!(pool.bucket_count(), 2);
    }
}
