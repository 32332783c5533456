use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::Arc,
};

use crate::{
    db::{Composite, Identifier, Revision, Stream, Text, Value, Write},
    seg::{Receipt, Segment, SegmentStorage},
    store::{navigate, search, Caches, Operator},
    util::spinlock::WriteGuard,
    Config, Result,
};

/// Version argument meaning "current state".
pub const NOW: u64 = u64::MAX;

/// Seal `seg0` once its revisions exceed this many encoded bytes.
pub const SEG0_LIMIT: u64 = 8 * 1024 * 1024;

/// Read-side aggregator over the segment list.
///
/// Routes every read across the sealed segments and the mutable `seg0`,
/// folding revision parity; accepts transported writes into `seg0` and
/// whole segments from the batch transporter. The database never sees
/// buffered writes; the engine layers those on top through the `extra`
/// parameters of the `*_in` methods.
pub struct Database {
    storage: Arc<SegmentStorage>,
    caches: Caches,
    searchable: Option<Vec<String>>,
    seg0_limit: u64,
}

impl Database {
    /// Open the database under `config`'s directories: list segment
    /// files, load headers only, sort by starting version, reconcile
    /// duplicate-overlap segments from a prior crash and install a
    /// fresh `seg0` at the tail.
    pub fn open(config: &Config) -> Result<Database> {
        let storage = Arc::new(SegmentStorage::open(
            &config.to_segments_dir(),
            &config.to_bloom_dir(),
        )?);

        let database = Database {
            storage,
            caches: Caches::new(config.cache_budget),
            searchable: config.searchable.clone(),
            seg0_limit: SEG0_LIMIT,
        };

        {
            let mut guard = database.storage.lock().write();
            let reconciled = database.repair_in(&mut guard)?;
            if reconciled > 0 {
                log::info!("repair reconciled {} duplicate segments", reconciled);
            }
            let seg0 = database.storage.new_segment()?;
            guard.push(seg0);
        }

        Ok(database)
    }

    pub fn storage(&self) -> &Arc<SegmentStorage> {
        &self.storage
    }

    /// Override the byte budget at which `seg0` is rolled.
    pub fn set_seg0_limit(&mut self, limit: u64) -> &mut Self {
        self.seg0_limit = limit;
        self
    }

    pub fn is_searchable(&self, key: &Text) -> bool {
        match &self.searchable {
            Some(keys) => keys.iter().any(|k| k == key.as_str()),
            None => true,
        }
    }

    /// Move `writes` into `seg0` while the caller holds the storage
    /// write latch. Rolls `seg0` when it outgrows its budget, else
    /// persists its mutable snapshot, so the writes are durable in the
    /// database before the buffer forgets them.
    pub fn absorb(
        &self,
        guard: &mut WriteGuard<Vec<Arc<Segment>>>,
        writes: &[Write],
    ) -> Result<Vec<Receipt>> {
        if !guard.last().map(|s| s.is_mutable()).unwrap_or(false) {
            guard.push(self.storage.new_segment()?);
        }
        let seg0 = Arc::clone(guard.last().unwrap());

        let mut receipts = Vec::with_capacity(writes.len());
        for write in writes.iter() {
            let searchable = self.is_searchable(&write.key);
            receipts.push(seg0.acquire(write, searchable)?);
        }

        if seg0.length()? >= self.seg0_limit {
            self.storage.transfer(&seg0)?;
            guard.push(self.storage.new_segment()?);
            log::info!("seg0 sealed as {}", seg0);
        } else {
            self.storage.save(&seg0)?;
        }

        Ok(receipts)
    }

    /// Fold `receipts` into the lookup caches: each revision toggles
    /// its cached entry, mirroring the parity rule.
    pub fn apply_receipts(&self, receipts: &[Receipt]) -> Result<()> {
        for receipt in receipts.iter() {
            for revision in receipt.revisions.iter() {
                match revision {
                    Revision::Table {
                        record, key, value, ..
                    } => self.caches.partial.toggle(record, key, value)?,
                    Revision::Index {
                        key, value, record, ..
                    } => self.caches.secondary.toggle(key, value, record)?,
                    Revision::Corpus {
                        key, word, position, ..
                    } => self.caches.corpus.toggle(key, word, position)?,
                }
            }
        }
        Ok(())
    }

    /// Insert a transported segment immediately before `seg0`, prime
    /// the caches from its receipts and persist it if still mutable.
    /// Receipts fold in under the same latch hold as the insertion, so
    /// reads never observe one without the other.
    pub fn merge(&self, segment: Arc<Segment>, receipts: &[Receipt]) -> Result<()> {
        let mut guard = self.storage.lock().write();
        let at = match guard.last() {
            Some(tail) if tail.is_mutable() => guard.len() - 1,
            _ => guard.len(),
        };
        guard.insert(at, Arc::clone(&segment));
        self.apply_receipts(receipts)?;
        std::mem::drop(guard);

        if segment.is_mutable() {
            self.storage.save(&segment)?;
        }
        Ok(())
    }

    /// Drop duplicate revisions captured twice by a crash-mid-transport:
    /// for every intersecting pair the newer segment is rebuilt without
    /// the shared revisions, or dropped entirely when nothing remains.
    /// Return the number of segments reconciled.
    pub fn repair(&self) -> Result<usize> {
        let mut guard = self.storage.lock().write();
        self.repair_in(&mut guard)
    }

    fn repair_in(&self, guard: &mut WriteGuard<Vec<Arc<Segment>>>) -> Result<usize> {
        let mut reconciled = 0;

        'scan: loop {
            let sealed = guard.len()
                - guard.last().map(|s| s.is_mutable() as usize).unwrap_or(0);
            for i in 0..sealed {
                for j in (i + 1)..sealed {
                    if guard[i].intersects(&guard[j])? {
                        self.reconcile(guard, i, j)?;
                        reconciled += 1;
                        continue 'scan;
                    }
                }
            }
            break;
        }
        Ok(reconciled)
    }

    // drop from the newer segment `j` every revision also present in
    // the older segment `i`.
    fn reconcile(
        &self,
        guard: &mut WriteGuard<Vec<Arc<Segment>>>,
        i: usize,
        j: usize,
    ) -> Result<()> {
        let (older, newer) = (Arc::clone(&guard[i]), Arc::clone(&guard[j]));
        log::warn!("reconciling duplicate revisions {} -> {}", older, newer);

        let mut kept: Vec<Revision> = vec![];
        for stream in Stream::ALL.iter() {
            let mut seen: HashSet<Vec<u8>> = HashSet::new();
            for revision in older.read_stream(*stream)?.into_iter() {
                let mut buf = vec![];
                revision.encode(&mut buf)?;
                seen.insert(buf);
            }
            for revision in newer.read_stream(*stream)?.into_iter() {
                let mut buf = vec![];
                revision.encode(&mut buf)?;
                if !seen.contains(&buf) {
                    kept.push(revision);
                }
            }
        }

        if kept.is_empty() {
            guard.remove(j);
        } else {
            let replacement = self.storage.new_segment()?;
            replacement.ingest(&kept)?;
            self.storage.transfer(&replacement)?;
            guard[j] = replacement;
        }
        self.storage.purge(&newer)?;
        Ok(())
    }
}

// the read contract; public wrappers walk the list under the read
// latch, `*_in` variants take an explicit list plus buffered revisions
// so the engine can merge consistently.
impl Database {
    /// Even/odd parity over all revisions matching `(key, value,
    /// record)` at `version`.
    pub fn verify(
        &self,
        key: &Text,
        value: &Value,
        record: Identifier,
        version: u64,
    ) -> Result<bool> {
        let guard = self.storage.lock().read();
        self.verify_in(guard.as_slice(), &[], key, value, record, version)
    }

    pub(crate) fn verify_in(
        &self,
        segments: &[Arc<Segment>],
        extra: &[Revision],
        key: &Text,
        value: &Value,
        record: Identifier,
        version: u64,
    ) -> Result<bool> {
        // current-state lookups can ride the secondary cache.
        if version == NOW {
            if let Some(records) = self.caches.secondary.get(key, value) {
                let mut present = records.contains(&record);
                for revision in extra.iter() {
                    if let Revision::Index {
                        key: k,
                        value: v,
                        record: r,
                        ..
                    } = revision
                    {
                        if k == key && v == value && *r == record {
                            present = !present;
                        }
                    }
                }
                return Ok(present);
            }
        }

        let fingerprint = Composite::of3(&record, key, value)?.to_bytes();
        let digest = locator_digest_of(&record)?;

        let mut count = 0_u64;
        // every segment must be consulted: a REMOVE in an older segment
        // may be followed by an ADD in a newer one.
        for segment in segments.iter() {
            if !segment.might_contain(&fingerprint)? {
                continue;
            }
            for revision in segment.read_locator(Stream::Table, digest)?.into_iter() {
                match revision {
                    Revision::Table {
                        record: r,
                        key: k,
                        value: v,
                        version: n,
                    } if r == record && k == *key && v == *value && n <= version => {
                        count += 1
                    }
                    _ => (),
                }
            }
        }
        for revision in extra.iter() {
            match revision {
                Revision::Table {
                    record: r,
                    key: k,
                    value: v,
                    version: n,
                } if *r == record && k == key && v == value && *n <= version => count += 1,
                _ => (),
            }
        }

        Ok(count % 2 == 1)
    }

    /// Every key of `record` with the values present at `version`.
    pub fn select(
        &self,
        record: Identifier,
        version: u64,
    ) -> Result<BTreeMap<Text, BTreeSet<Value>>> {
        let guard = self.storage.lock().read();
        self.select_in(guard.as_slice(), &[], record, version)
    }

    pub(crate) fn select_in(
        &self,
        segments: &[Arc<Segment>],
        extra: &[Revision],
        record: Identifier,
        version: u64,
    ) -> Result<BTreeMap<Text, BTreeSet<Value>>> {
        let locator = Composite::of(&record)?.to_bytes();
        let digest = locator_digest_of(&record)?;

        let mut counts: HashMap<(Text, Value), u64> = HashMap::new();
        for segment in segments.iter() {
            if !segment.might_contain(&locator)? {
                continue;
            }
            for revision in segment.read_locator(Stream::Table, digest)?.into_iter() {
                if let Revision::Table {
                    record: r,
                    key,
                    value,
                    version: n,
                } = revision
                {
                    if r == record && n <= version {
                        *counts.entry((key, value)).or_insert(0) += 1;
                    }
                }
            }
        }
        for revision in extra.iter() {
            if let Revision::Table {
                record: r,
                key,
                value,
                version: n,
            } = revision
            {
                if *r == record && *n <= version {
                    *counts.entry((key.clone(), value.clone())).or_insert(0) += 1;
                }
            }
        }

        let mut present: BTreeMap<Text, BTreeSet<Value>> = BTreeMap::new();
        for ((key, value), count) in counts.into_iter() {
            if count % 2 == 1 {
                present.entry(key).or_insert_with(BTreeSet::new).insert(value);
            }
        }
        Ok(present)
    }

    /// The values present at `(record, key)` at `version`.
    pub fn select_key(
        &self,
        key: &Text,
        record: Identifier,
        version: u64,
    ) -> Result<BTreeSet<Value>> {
        let guard = self.storage.lock().read();
        self.select_key_in(guard.as_slice(), &[], key, record, version)
    }

    pub(crate) fn select_key_in(
        &self,
        segments: &[Arc<Segment>],
        extra: &[Revision],
        key: &Text,
        record: Identifier,
        version: u64,
    ) -> Result<BTreeSet<Value>> {
        let mut values = match version {
            NOW => match self.caches.partial.get(&record, key) {
                Some(values) => values,
                None => {
                    let values = self
                        .select_in(segments, &[], record, NOW)?
                        .remove(key)
                        .unwrap_or_default();
                    self.caches.partial.put(record, key.clone(), values.clone())?;
                    values
                }
            },
            _ => self
                .select_in(segments, &[], record, version)?
                .remove(key)
                .unwrap_or_default(),
        };

        for revision in extra.iter() {
            if let Revision::Table {
                record: r,
                key: k,
                value,
                version: n,
            } = revision
            {
                if *r == record && k == key && *n <= version {
                    // parity toggle.
                    if !values.remove(value) {
                        values.insert(value.clone());
                    }
                }
            }
        }
        Ok(values)
    }

    /// Every value of `key` mapped to the records holding it at
    /// `version`.
    pub fn browse(
        &self,
        key: &Text,
        version: u64,
    ) -> Result<BTreeMap<Value, BTreeSet<Identifier>>> {
        let guard = self.storage.lock().read();
        self.browse_in(guard.as_slice(), &[], key, version)
    }

    pub(crate) fn browse_in(
        &self,
        segments: &[Arc<Segment>],
        extra: &[Revision],
        key: &Text,
        version: u64,
    ) -> Result<BTreeMap<Value, BTreeSet<Identifier>>> {
        let locator = Composite::of(key)?.to_bytes();
        let digest = locator_digest_of(key)?;

        let mut counts: HashMap<(Value, Identifier), u64> = HashMap::new();
        for segment in segments.iter() {
            if !segment.might_contain(&locator)? {
                continue;
            }
            for revision in segment.read_locator(Stream::Index, digest)?.into_iter() {
                if let Revision::Index {
                    key: k,
                    value,
                    record,
                    version: n,
                } = revision
                {
                    if k == *key && n <= version {
                        *counts.entry((value, record)).or_insert(0) += 1;
                    }
                }
            }
        }
        for revision in extra.iter() {
            if let Revision::Index {
                key: k,
                value,
                record,
                version: n,
            } = revision
            {
                if k == key && *n <= version {
                    *counts.entry((value.clone(), *record)).or_insert(0) += 1;
                }
            }
        }

        let mut present: BTreeMap<Value, BTreeSet<Identifier>> = BTreeMap::new();
        for ((value, record), count) in counts.into_iter() {
            if count % 2 == 1 {
                present
                    .entry(value)
                    .or_insert_with(BTreeSet::new)
                    .insert(record);
            }
        }

        // prime the secondary cache with pure segment state; verify's
        // fast path rides it and receipts keep it current.
        let dirty = extra
            .iter()
            .any(|r| matches!(r, Revision::Index { key: k, .. } if k == key));
        if version == NOW && !dirty {
            for (value, records) in present.iter() {
                self.caches
                    .secondary
                    .put(key.clone(), value.clone(), records.clone())?;
            }
        }
        Ok(present)
    }

    /// Records whose `key` holds a value satisfying `op` over
    /// `operands`, at `version`.
    pub fn find(
        &self,
        key: &Text,
        op: Operator,
        operands: &[Value],
        version: u64,
    ) -> Result<BTreeSet<Identifier>> {
        let guard = self.storage.lock().read();
        self.find_in(guard.as_slice(), &[], key, op, operands, version)
    }

    pub(crate) fn find_in(
        &self,
        segments: &[Arc<Segment>],
        extra: &[Revision],
        key: &Text,
        op: Operator,
        operands: &[Value],
        version: u64,
    ) -> Result<BTreeSet<Identifier>> {
        let browse = self.browse_in(segments, extra, key, version)?;

        let mut records = BTreeSet::new();
        for (value, holders) in browse.into_iter() {
            if op.matches(&value, operands)? {
                records.extend(holders);
            }
        }
        Ok(records)
    }

    /// Records whose tokenised `key` text matches `query`: per-token
    /// prefix/infix, adjacent positions AND-combined.
    pub fn search(
        &self,
        key: &Text,
        query: &str,
        version: u64,
    ) -> Result<BTreeSet<Identifier>> {
        let guard = self.storage.lock().read();
        self.search_in(guard.as_slice(), &[], key, query, version)
    }

    pub(crate) fn search_in(
        &self,
        segments: &[Arc<Segment>],
        extra: &[Revision],
        key: &Text,
        query: &str,
        version: u64,
    ) -> Result<BTreeSet<Identifier>> {
        let postings = self.postings_in(segments, extra, key, version)?;
        Ok(search::matching_records(&postings, query))
    }

    // word -> present positions for `key`, parity folded.
    fn postings_in(
        &self,
        segments: &[Arc<Segment>],
        extra: &[Revision],
        key: &Text,
        version: u64,
    ) -> Result<BTreeMap<Text, BTreeSet<crate::db::Position>>> {
        let locator = Composite::of(key)?.to_bytes();
        let digest = locator_digest_of(key)?;

        let mut counts: HashMap<(Text, crate::db::Position), u64> = HashMap::new();
        for segment in segments.iter() {
            if !segment.might_contain(&locator)? {
                continue;
            }
            for revision in segment.read_locator(Stream::Corpus, digest)?.into_iter() {
                if let Revision::Corpus {
                    key: k,
                    word,
                    position,
                    version: n,
                } = revision
                {
                    if k == *key && n <= version {
                        *counts.entry((word, position)).or_insert(0) += 1;
                    }
                }
            }
        }
        for revision in extra.iter() {
            if let Revision::Corpus {
                key: k,
                word,
                position,
                version: n,
            } = revision
            {
                if k == key && *n <= version {
                    *counts.entry((word.clone(), *position)).or_insert(0) += 1;
                }
            }
        }

        let mut postings: BTreeMap<Text, BTreeSet<crate::db::Position>> = BTreeMap::new();
        for ((word, position), count) in counts.into_iter() {
            if count % 2 == 1 {
                postings
                    .entry(word)
                    .or_insert_with(BTreeSet::new)
                    .insert(position);
            }
        }

        // prime the corpus cache; receipts keep primed entries current.
        let dirty = extra
            .iter()
            .any(|r| matches!(r, Revision::Corpus { key: k, .. } if k == key));
        if version == NOW && !dirty {
            for (word, positions) in postings.iter() {
                self.caches
                    .corpus
                    .put(key.clone(), word.clone(), positions.clone())?;
            }
        }
        Ok(postings)
    }

    /// Navigate a dotted key path from `start`, applying `op` at the
    /// final step. An unknown key anywhere on the path yields an empty
    /// set, not an error.
    pub fn navigate(
        &self,
        path: &str,
        start: &BTreeSet<Identifier>,
        op: Operator,
        operands: &[Value],
        version: u64,
    ) -> Result<BTreeSet<Identifier>> {
        let guard = self.storage.lock().read();
        navigate::navigate_in(self, guard.as_slice(), &[], path, start, op, operands, version)
    }

    /// Rough revision count hint for `key`'s index block, summed over
    /// segments; drives the navigation direction choice.
    pub(crate) fn cardinality_hint(
        &self,
        segments: &[Arc<Segment>],
        key: &Text,
    ) -> Result<u64> {
        let digest = locator_digest_of(key)?;
        let mut hint = 0;
        for segment in segments.iter() {
            hint += segment.locator_span(Stream::Index, digest)?;
        }
        Ok(hint)
    }
}

pub(crate) fn locator_digest_of<B>(locator: &B) -> Result<u128>
where
    B: crate::db::Byteable,
{
    let mut buf = vec![];
    locator.encode(&mut buf)?;
    crate::hash::murmur3_128(&buf)
}

#[cfg(test)]
#[path = "database_test.rs"]
mod database_test;
