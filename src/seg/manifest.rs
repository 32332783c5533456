use std::convert::TryInto;

use crate::{check_remaining, db, seg, Error, Result};

/// Byte width of one manifest record.
pub const ENTRY_SIZE: usize = 32;

/// One manifest record: `digest:16 || start:8 || end:8`.
///
/// `digest` is the murmur fingerprint of a locator's canonical bytes;
/// `[start, end)` is the locator's byte range within the segment file.
/// Records are fixed-size and sorted by digest, so a lookup is a binary
/// search over the raw bytes without deserialising the whole manifest.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ManifestEntry {
    pub digest: u128,
    pub start: u64,
    pub end: u64,
}

impl ManifestEntry {
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<usize> {
        buf.extend_from_slice(&self.digest.to_le_bytes());
        buf.extend_from_slice(&self.start.to_le_bytes());
        buf.extend_from_slice(&self.end.to_le_bytes());
        Ok(ENTRY_SIZE)
    }

    pub fn decode(buf: &[u8]) -> Result<(ManifestEntry, usize)> {
        check_remaining!(buf, ENTRY_SIZE, "manifest entry")?;
        let digest = u128::from_le_bytes(buf[..16].try_into().unwrap());
        let start = u64::from_le_bytes(buf[16..24].try_into().unwrap());
        let end = u64::from_le_bytes(buf[24..32].try_into().unwrap());
        Ok((ManifestEntry { digest, start, end }, ENTRY_SIZE))
    }
}

/// Build a stream's manifest from its sorted revisions and encoded
/// record sizes. `base` is the stream's absolute offset in the file.
/// Return the entries sorted by digest.
pub fn build(
    revisions: &[db::Revision],
    sizes: &[usize],
    base: u64,
) -> Result<Vec<ManifestEntry>> {
    assert_eq!(revisions.len(), sizes.len());

    let mut entries: Vec<ManifestEntry> = vec![];
    let mut fpos = base;
    let mut current: Option<(u128, u64)> = None; // (digest, start)

    for (revision, size) in revisions.iter().zip(sizes.iter()) {
        let digest = revision.locator_digest()?;
        let size = seg::to_u64(*size)?;
        match current {
            Some((prev, _)) if prev == digest => (),
            Some((prev, start)) => {
                entries.push(ManifestEntry {
                    digest: prev,
                    start,
                    end: fpos,
                });
                current = Some((digest, fpos));
            }
            None => current = Some((digest, fpos)),
        }
        fpos += size;
    }
    if let Some((digest, start)) = current {
        entries.push(ManifestEntry {
            digest,
            start,
            end: fpos,
        });
    }

    entries.sort_by(|a, b| a.digest.cmp(&b.digest));
    Ok(entries)
}

/// Decode a manifest section.
pub fn decode_all(buf: &[u8]) -> Result<Vec<ManifestEntry>> {
    if buf.len() % ENTRY_SIZE != 0 {
        err_at!(Corrupted, msg: "manifest truncated at {}", buf.len())?;
    }
    let mut entries = Vec::with_capacity(buf.len() / ENTRY_SIZE);
    for chunk in buf.chunks_exact(ENTRY_SIZE) {
        let (entry, _) = ManifestEntry::decode(chunk)?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Binary search `entries`, sorted by digest, for a locator's range.
pub fn lookup(entries: &[ManifestEntry], digest: u128) -> Option<(u64, u64)> {
    match entries.binary_search_by(|entry| entry.digest.cmp(&digest)) {
        Ok(off) => Some((entries[off].start, entries[off].end)),
        Err(_) => None,
    }
}

#[cfg(test)]
#[path = "manifest_test.rs"]
mod manifest_test;
