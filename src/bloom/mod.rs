//! Module implement an append-only logging bloom filter.
//!
//! The filter is an in-memory bit-set whose mutations are journalled:
//! every newly-set bit index is queued in an append buffer, and
//! [LoggingBloomFilter::disk_sync] appends the queued indexes to the
//! backing file as little-endian `u32`s. Since a put can set bits but
//! never clear them, a sync never needs to rewrite history; reopening
//! replays the recorded indexes to rebuild the exact bit-set.

use std::{convert::TryFrom, ffi, fs, io::Read};

use crate::{util, util::Spinlock, Error, Result};

/// Expected number of fingerprints per filter, drives sizing.
pub const EXPECTED_INSERTIONS: usize = 500_000;

/// Target false-positive probability.
pub const FPP: f64 = 0.03;

/// Return the bit-set width for `n` expected insertions at false
/// positive probability `fpp`.
pub fn num_bits(n: usize, fpp: f64) -> u32 {
    let bits = ((n as f64) * fpp.ln() / (1.0 / 2_f64.powf(2_f64.ln())).ln()).ceil();
    (bits as u32).max(64)
}

/// Return the hash count for a `num_bits` wide filter over `n` expected
/// insertions.
pub fn num_hashes(n: usize, num_bits: u32) -> u32 {
    let k = (2_f64.ln() * (num_bits as f64) / (n as f64)).round();
    (k as u32).max(1)
}

struct Inner {
    bits: Vec<u64>,
    append: Vec<u32>,
    file: fs::File,
    n_set_events: u64,
}

/// Append-only bloom filter keyed on composite fingerprint bytes.
///
/// `put` never clears a bit, so for any bytes ever put,
/// `might_contain` answers true, across syncs and reopens.
pub struct LoggingBloomFilter {
    location: ffi::OsString,
    num_bits: u32,
    k: u32,
    inner: Spinlock<Inner>,
}

impl LoggingBloomFilter {
    /// Create a fresh filter backed by a new file at `location`.
    pub fn create(location: &ffi::OsStr, n: usize, fpp: f64) -> Result<LoggingBloomFilter> {
        let num_bits = num_bits(n, fpp);
        let file = util::create_file_a(location)?;

        let inner = Inner {
            bits: vec![0_u64; ((num_bits as usize) + 63) / 64],
            append: vec![],
            file,
            n_set_events: 0,
        };

        Ok(LoggingBloomFilter {
            location: location.to_os_string(),
            num_bits,
            k: num_hashes(n, num_bits),
            inner: Spinlock::new(inner),
        })
    }

    /// Open an existing filter, replaying every recorded bit index. The
    /// sizing arguments must match the ones the filter was created with.
    /// A trailing partial record, from a crash mid-append, is dropped.
    pub fn open(location: &ffi::OsStr, n: usize, fpp: f64) -> Result<LoggingBloomFilter> {
        let num_bits = num_bits(n, fpp);
        let mut bits = vec![0_u64; ((num_bits as usize) + 63) / 64];

        let mut data = vec![];
        {
            let mut fd = util::open_file_r(location)?;
            err_at!(IOError, fd.read_to_end(&mut data), "bloom {:?}", location)?;
        }
        if data.len() % 4 != 0 {
            log::warn!(
                "bloom {:?} trailing {} bytes dropped",
                location,
                data.len() % 4
            );
        }

        let mut n_set_events = 0;
        for chunk in data.chunks_exact(4) {
            let index = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if index >= num_bits {
                err_at!(Corrupted, msg: "bloom {:?} bit {} >= {}", location, index, num_bits)?;
            }
            bits[(index as usize) / 64] |= 1 << (index % 64);
            n_set_events += 1;
        }

        let inner = Inner {
            bits,
            append: vec![],
            file: util::open_file_a(location)?,
            n_set_events,
        };

        Ok(LoggingBloomFilter {
            location: location.to_os_string(),
            num_bits,
            k: num_hashes(n, num_bits),
            inner: Spinlock::new(inner),
        })
    }

    // double hashing off the 128-bit murmur digest, bit index per round.
    fn bit_indexes(&self, bytes: &[u8]) -> Result<Vec<u32>> {
        let digest = crate::hash::murmur3_128(bytes)?;
        let hash1 = digest as u64;
        let hash2 = (digest >> 64) as u64;

        let mut indexes = Vec::with_capacity(self.k as usize);
        for i in 0..u64::from(self.k) {
            let combined = hash1.wrapping_add(i.wrapping_mul(hash2));
            indexes.push(u32::try_from(combined % u64::from(self.num_bits)).unwrap());
        }
        Ok(indexes)
    }

    /// Record `bytes`. Return true when at least one bit was newly set.
    pub fn put(&self, bytes: &[u8]) -> Result<bool> {
        let indexes = self.bit_indexes(bytes)?;
        let mut inner = self.inner.write();

        let mut dirty = false;
        for index in indexes.into_iter() {
            let (word, mask) = ((index as usize) / 64, 1_u64 << (index % 64));
            if inner.bits[word] & mask == 0 {
                inner.bits[word] |= mask;
                inner.append.push(index);
                inner.n_set_events += 1;
                dirty = true;
            }
        }
        Ok(dirty)
    }

    /// Whether `bytes` may have been put. False negatives are
    /// impossible; false positives happen with probability ~fpp.
    pub fn might_contain(&self, bytes: &[u8]) -> Result<bool> {
        let indexes = self.bit_indexes(bytes)?;
        let inner = self.inner.read();

        for index in indexes.into_iter() {
            let (word, mask) = ((index as usize) / 64, 1_u64 << (index % 64));
            if inner.bits[word] & mask == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Append the queued bit indexes to the backing file and fsync.
    /// Return the number of bytes appended.
    pub fn disk_sync(&self) -> Result<usize> {
        let mut inner = self.inner.write();
        if inner.append.is_empty() {
            return Ok(0);
        }

        let mut data = Vec::with_capacity(inner.append.len() * 4);
        for index in inner.append.iter() {
            data.extend_from_slice(&index.to_le_bytes());
        }
        inner.append.clear();

        let Inner { file, .. } = &mut *inner;
        util::sync_write(file, &data)
    }

    /// On-disk size in bytes: set-bit events since creation times four.
    pub fn to_disk_size(&self) -> u64 {
        let inner = self.inner.read();
        (inner.n_set_events - (inner.append.len() as u64)) * 4
    }

    pub fn to_location(&self) -> ffi::OsString {
        self.location.clone()
    }

    /// Delete the backing file.
    pub fn purge(self) -> Result<()> {
        err_at!(IOError, fs::remove_file(&self.location), "{:?}", self.location)
    }

    /// Serialize every set bit index, in the on-disk `u32` stream
    /// format. Replaying these into a fresh filter reproduces the exact
    /// bit-set; sealed segments embed this stream.
    pub fn to_bit_stream(&self) -> Vec<u8> {
        let inner = self.inner.read();
        let mut data = vec![];
        for (word_off, word) in inner.bits.iter().enumerate() {
            let mut word = *word;
            while word != 0 {
                let bit = word.trailing_zeros();
                let index = (word_off as u32) * 64 + bit;
                data.extend_from_slice(&index.to_le_bytes());
                word &= word - 1;
            }
        }
        data
    }
}

/// Read-only bloom view rebuilt from a recorded bit-index stream, used
/// for the copy embedded in sealed segment files.
pub struct View {
    num_bits: u32,
    k: u32,
    bits: Vec<u64>,
}

impl View {
    /// Rebuild from a `u32` bit-index stream, with the sizing arguments
    /// the originating filter was created with.
    pub fn from_bit_stream(data: &[u8], n: usize, fpp: f64) -> Result<View> {
        let num_bits = num_bits(n, fpp);
        let mut bits = vec![0_u64; ((num_bits as usize) + 63) / 64];

        if data.len() % 4 != 0 {
            err_at!(Corrupted, msg: "bloom stream trailing {} bytes", data.len() % 4)?;
        }
        for chunk in data.chunks_exact(4) {
            let index = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if index >= num_bits {
                err_at!(Corrupted, msg: "bloom stream bit {} >= {}", index, num_bits)?;
            }
            bits[(index as usize) / 64] |= 1 << (index % 64);
        }

        Ok(View {
            num_bits,
            k: num_hashes(n, num_bits),
            bits,
        })
    }

    pub fn might_contain(&self, bytes: &[u8]) -> Result<bool> {
        let digest = crate::hash::murmur3_128(bytes)?;
        let hash1 = digest as u64;
        let hash2 = (digest >> 64) as u64;

        for i in 0..u64::from(self.k) {
            let combined = hash1.wrapping_add(i.wrapping_mul(hash2));
            let index = u32::try_from(combined % u64::from(self.num_bits)).unwrap();
            let (word, mask) = ((index as usize) / 64, 1_u64 << (index % 64));
            if self.bits[word] & mask == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
