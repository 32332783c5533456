use std::{
    collections::{BTreeMap, HashMap},
    convert::TryFrom,
    hash::{BuildHasher, Hash, Hasher},
    ops::{Bound, RangeBounds},
};

use crate::{coll::NUM_SHARDS, hash::CityHasher, util::Spinlock};

/// A concurrent navigable map that defers sorting.
///
/// Writes land in one of N latch-guarded hashmap shards, so concurrent
/// writers rarely contend. Any navigable operation (first/last/ceiling/
/// floor/range) first drains all shards into the internal sorted tree.
/// Point reads consult the owning shard first and the tree second.
pub struct IncrementalSortMap<K, V>
where
    K: Ord + Hash,
{
    shards: Vec<Spinlock<HashMap<K, V>>>,
    sorted: Spinlock<BTreeMap<K, V>>,
}

impl<K, V> Default for IncrementalSortMap<K, V>
where
    K: Ord + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        IncrementalSortMap::new(NUM_SHARDS)
    }
}

impl<K, V> IncrementalSortMap<K, V>
where
    K: Ord + Hash + Clone,
    V: Clone,
{
    pub fn new(num_shards: usize) -> IncrementalSortMap<K, V> {
        let num_shards = num_shards.max(1);
        let mut shards = Vec::with_capacity(num_shards);
        (0..num_shards).for_each(|_| shards.push(Spinlock::new(HashMap::new())));
        IncrementalSortMap {
            shards,
            sorted: Spinlock::new(BTreeMap::new()),
        }
    }

    fn to_shard(&self, key: &K) -> usize {
        let mut hasher = CityHasher::new().build_hasher();
        key.hash(&mut hasher);
        usize::try_from(hasher.finish() % (self.shards.len() as u64)).unwrap()
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        // an older copy may live in the tree; evict it so point reads
        // and navigation agree on the newest value.
        let old = self.sorted.write().remove(&key);
        let shard = self.to_shard(&key);
        self.shards[shard].write().insert(key, value).or(old)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let shard = self.to_shard(key);
        let unsorted = self.shards[shard].write().remove(key);
        unsorted.or_else(|| self.sorted.write().remove(key))
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let shard = self.to_shard(key);
        {
            // drop the shard latch before consulting the tree; the
            // drainer nests the locks in the opposite order.
            let guard = self.shards[shard].read();
            if let Some(value) = guard.get(key) {
                return Some(value.clone());
            }
        }
        self.sorted.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        let unsorted: usize = self.shards.iter().map(|s| s.read().len()).sum();
        unsorted + self.sorted.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // move every shard-resident entry into the sorted tree.
    fn drain_shards(&self) {
        let mut tree = self.sorted.write();
        for shard in self.shards.iter() {
            let mut guard = shard.write();
            for (key, value) in guard.drain() {
                tree.insert(key, value);
            }
        }
    }

    pub fn first_key_value(&self) -> Option<(K, V)> {
        self.drain_shards();
        let tree = self.sorted.read();
        tree.iter().next().map(|(k, v)| (k.clone(), v.clone()))
    }

    pub fn last_key_value(&self) -> Option<(K, V)> {
        self.drain_shards();
        let tree = self.sorted.read();
        tree.iter().next_back().map(|(k, v)| (k.clone(), v.clone()))
    }

    /// Least entry with key >= `key`.
    pub fn ceiling(&self, key: &K) -> Option<(K, V)> {
        self.drain_shards();
        let tree = self.sorted.read();
        tree.range((Bound::Included(key.clone()), Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    /// Greatest entry with key <= `key`.
    pub fn floor(&self, key: &K) -> Option<(K, V)> {
        self.drain_shards();
        let tree = self.sorted.read();
        tree.range((Bound::Unbounded, Bound::Included(key.clone())))
            .next_back()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    /// Collect the entries within `range`, in key order.
    pub fn range_collect<R>(&self, range: R) -> Vec<(K, V)>
    where
        R: RangeBounds<K>,
    {
        self.drain_shards();
        let tree = self.sorted.read();
        tree.range(range)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Collect every entry, in key order.
    pub fn collect_sorted(&self) -> Vec<(K, V)> {
        self.range_collect(..)
    }
}

#[cfg(test)]
#[path = "incr_test.rs"]
mod incr_test;
