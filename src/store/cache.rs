use std::{
    collections::{BTreeSet, HashMap},
    hash::Hash,
    sync::Arc,
};

use crate::{
    db::{Footprint, Identifier, Position, Text, Value},
    util::Spinlock,
    Result,
};

/// Listener fired when a cache entry is evicted under heap pressure.
pub type EvictionListener = Arc<dyn Fn(&'static str) + Send + Sync>;

/// A bounded cache of materialised present-state views, generic over
/// the `(locator, key, value)` typing.
///
/// One entry caches the sorted value set currently present at a
/// `(locator, key)` pair; a new revision for the pair toggles membership
/// in place, mirroring the parity rule. Entries are evicted in
/// least-recently-used order once the heap budget is exceeded; eviction
/// is advisory and fires the listener, it never fails a read.
pub struct RecordCache<L, K, V>
where
    L: Clone + Eq + Hash + Footprint,
    K: Clone + Eq + Hash + Footprint,
    V: Clone + Ord + Footprint,
{
    name: &'static str,
    budget: usize,
    inner: Spinlock<Inner<L, K, V>>,
    listener: Spinlock<Option<EvictionListener>>,
}

struct Inner<L, K, V>
where
    V: Ord,
{
    map: HashMap<(L, K), Entry<V>>,
    used: usize,
    tick: u64,
    n_hits: u64,
    n_misses: u64,
    n_evicted: u64,
}

struct Entry<V>
where
    V: Ord,
{
    values: BTreeSet<V>,
    footprint: usize,
    last_access: u64,
}

impl<L, K, V> RecordCache<L, K, V>
where
    L: Clone + Eq + Hash + Footprint,
    K: Clone + Eq + Hash + Footprint,
    V: Clone + Ord + Footprint,
{
    pub fn new(name: &'static str, budget: usize) -> RecordCache<L, K, V> {
        RecordCache {
            name,
            budget,
            inner: Spinlock::new(Inner {
                map: HashMap::new(),
                used: 0,
                tick: 0,
                n_hits: 0,
                n_misses: 0,
                n_evicted: 0,
            }),
            listener: Spinlock::new(None),
        }
    }

    pub fn set_eviction_listener(&self, listener: EvictionListener) {
        *self.listener.write() = Some(listener);
    }

    /// Cached present-set for `(locator, key)`, None on a miss.
    pub fn get(&self, locator: &L, key: &K) -> Option<BTreeSet<V>> {
        let mut inner = self.inner.write();
        inner.tick += 1;
        let tick = inner.tick;
        match inner.map.get_mut(&(locator.clone(), key.clone())) {
            Some(entry) => {
                entry.last_access = tick;
                let values = entry.values.clone();
                inner.n_hits += 1;
                Some(values)
            }
            None => {
                inner.n_misses += 1;
                None
            }
        }
    }

    /// Install a freshly materialised present-set.
    pub fn put(&self, locator: L, key: K, values: BTreeSet<V>) -> Result<()> {
        let footprint = Self::footprint_of(&locator, &key, &values)?;

        let evicted = {
            let mut inner = self.inner.write();
            inner.tick += 1;
            let tick = inner.tick;

            if let Some(old) = inner.map.insert(
                (locator, key),
                Entry {
                    values,
                    footprint,
                    last_access: tick,
                },
            ) {
                inner.used -= old.footprint;
            }
            inner.used += footprint;
            inner.evict_over(self.budget)
        };

        self.notify(evicted);
        Ok(())
    }

    /// Toggle `value`'s membership in a cached entry; the parity rule
    /// applied incrementally. A miss is a no-op, the next read
    /// materialises from storage.
    pub fn toggle(&self, locator: &L, key: &K, value: &V) -> Result<()> {
        let size = crate::util::key_footprint(value)?;

        let evicted = {
            let mut inner = self.inner.write();
            let delta: isize = match inner.map.get_mut(&(locator.clone(), key.clone())) {
                Some(entry) => {
                    if entry.values.remove(value) {
                        entry.footprint -= size;
                        -(size as isize)
                    } else {
                        entry.values.insert(value.clone());
                        entry.footprint += size;
                        size as isize
                    }
                }
                None => 0,
            };
            if delta >= 0 {
                inner.used += delta as usize;
            } else {
                inner.used -= (-delta) as usize;
            }
            inner.evict_over(self.budget)
        };
        self.notify(evicted);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_used(&self) -> usize {
        self.inner.read().used
    }

    fn notify(&self, evicted: usize) {
        if evicted > 0 {
            if let Some(listener) = self.listener.read().as_ref() {
                for _i in 0..evicted {
                    listener(self.name);
                }
            }
        }
    }

    fn footprint_of(locator: &L, key: &K, values: &BTreeSet<V>) -> Result<usize> {
        let mut size = crate::util::key_footprint(locator)?;
        size += crate::util::key_footprint(key)?;
        for value in values.iter() {
            size += crate::util::key_footprint(value)?;
        }
        Ok(size)
    }
}

impl<L, K, V> Inner<L, K, V>
where
    L: Clone + Eq + Hash,
    K: Clone + Eq + Hash,
    V: Ord,
{
    // evict least-recently-used entries until under budget; return the
    // eviction count.
    fn evict_over(&mut self, budget: usize) -> usize {
        let mut evicted = 0;
        while self.used > budget && !self.map.is_empty() {
            let victim = self
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(key, _)| key.clone());
            match victim {
                Some(key) => {
                    if let Some(entry) = self.map.remove(&key) {
                        self.used -= entry.footprint;
                        self.n_evicted += 1;
                        evicted += 1;
                    }
                }
                None => break,
            }
        }
        evicted
    }
}

/// The three cache instantiations of the read path.
pub struct Caches {
    /// `(record, key)` -> values currently present.
    pub partial: RecordCache<Identifier, Text, Value>,
    /// `(key, value)` -> records currently holding it.
    pub secondary: RecordCache<Text, Value, Identifier>,
    /// `(key, word)` -> word positions currently present.
    pub corpus: RecordCache<Text, Text, Position>,
}

impl Caches {
    /// Split `budget` bytes across the three caches.
    pub fn new(budget: usize) -> Caches {
        Caches {
            partial: RecordCache::new("partial", budget / 2),
            secondary: RecordCache::new("secondary", budget / 4),
            corpus: RecordCache::new("corpus", budget / 4),
        }
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod cache_test;
