use std::{
    collections::HashSet,
    convert::TryFrom,
    hash::{BuildHasher, Hash, Hasher},
};

use crate::{coll::NUM_SHARDS, hash::CityHasher, util::Spinlock};

/// A set partitioned into shards, each guarded by a stamped read/write
/// latch.
///
/// Writers contend only within a shard. Whole-set traversal via
/// [ShardedHashSet::scan] acquires one shard's read latch at a time and
/// releases it on every exit path, including panics unwinding out of the
/// visitor.
pub struct ShardedHashSet<T>
where
    T: Hash + Eq,
{
    shards: Vec<Spinlock<HashSet<T>>>,
}

impl<T> Default for ShardedHashSet<T>
where
    T: Hash + Eq,
{
    fn default() -> Self {
        ShardedHashSet::new(NUM_SHARDS)
    }
}

impl<T> ShardedHashSet<T>
where
    T: Hash + Eq,
{
    pub fn new(num_shards: usize) -> ShardedHashSet<T> {
        let num_shards = num_shards.max(1);
        let mut shards = Vec::with_capacity(num_shards);
        (0..num_shards).for_each(|_| shards.push(Spinlock::new(HashSet::new())));
        ShardedHashSet { shards }
    }

    // unsigned remainder; a signed remainder over a raw hash code would
    // index out of bounds for negative hashes.
    fn to_shard(&self, value: &T) -> usize {
        let mut hasher = CityHasher::new().build_hasher();
        value.hash(&mut hasher);
        usize::try_from(hasher.finish() % (self.shards.len() as u64)).unwrap()
    }

    /// Insert `value`, return false if it was already present.
    pub fn insert(&self, value: T) -> bool {
        let shard = self.to_shard(&value);
        self.shards[shard].write().insert(value)
    }

    /// Remove `value`, return true if it was present.
    pub fn remove(&self, value: &T) -> bool {
        let shard = self.to_shard(value);
        self.shards[shard].write().remove(value)
    }

    pub fn contains(&self, value: &T) -> bool {
        let shard = self.to_shard(value);
        self.shards[shard].read().contains(value)
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every member under the owning shard's read latch. Rotating
    /// between shards is a consistency seam: members moved concurrently
    /// may be seen twice or not at all.
    pub fn scan<F>(&self, mut visit: F)
    where
        F: FnMut(&T),
    {
        for shard in self.shards.iter() {
            let guard = shard.read();
            for value in guard.iter() {
                visit(value);
            }
            // guard drops here, before the next shard is latched.
        }
    }

    /// Collect a point-in-time copy of the members.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        let mut values = vec![];
        self.scan(|value| values.push(value.clone()));
        values
    }
}

#[cfg(test)]
#[path = "shard_test.rs"]
mod shard_test;
