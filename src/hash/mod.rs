//! Module implement the hash functions used across the package.

use std::{
    hash::{BuildHasher, Hasher},
    io,
};

use crate::{Error, Result};

/// Type uses google's city hash to convert [Hash][std::hash::Hash]able
/// key into `u64`. Used to route keys into shards of the concurrent
/// collections. Refer [cityhash_rs] for details.
#[derive(Clone, Copy, Default)]
pub struct CityHasher {
    digest: u128,
}

impl CityHasher {
    pub fn new() -> CityHasher {
        CityHasher::default()
    }
}

impl BuildHasher for CityHasher {
    type Hasher = Self;

    #[inline]
    fn build_hasher(&self) -> Self {
        *self
    }
}

impl Hasher for CityHasher {
    fn finish(&self) -> u64 {
        ((self.digest >> 64) as u64) ^ ((self.digest & 0xFFFFFFFFFFFFFFFF) as u64)
    }

    fn write(&mut self, bytes: &[u8]) {
        self.digest = cityhash_rs::cityhash_110_128(bytes);
    }
}

/// Seed for all murmur3 digests; must never change, digests are persisted
/// in manifests and bloom filter files.
pub const MURMUR_SEED: u32 = 0;

/// Return the 128-bit murmur3 digest of `bytes`. Fingerprint digests and
/// the bloom filter's double hashing are derived from this value.
pub fn murmur3_128(bytes: &[u8]) -> Result<u128> {
    let mut cursor = io::Cursor::new(bytes);
    err_at!(Fatal, murmur3::murmur3_x64_128(&mut cursor, MURMUR_SEED))
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
