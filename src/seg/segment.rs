use std::{
    collections::HashSet,
    ffi, fmt, fs,
    io::{Read, Seek},
    result,
    sync::Arc,
};

use crate::{
    bloom::{self, LoggingBloomFilter, EXPECTED_INSERTIONS, FPP},
    db::{self, Revision, Stream, Write},
    read_file,
    seg::{self, manifest, Flusher, Header, ManifestEntry, FLUSH_QUEUE_SIZE, HEADER_SIZE},
    util::{self, Spinlock},
    Error, Result,
};

/// Proof that a write landed in a mutable segment, carrying the
/// revisions it contributed. The database re-derives cache entries from
/// receipts when the segment is merged.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub write: Write,
    pub revisions: Vec<Revision>,
}

/// An on-disk unit holding a sorted run of revisions.
///
/// A segment is created mutable, as the database's `seg0`, and accepts
/// writes via [Segment::acquire] under its intrinsic latch. Once
/// [Segment::transfer] seals it the segment never changes again;
/// manifests and the bloom view load lazily on first consult.
pub struct Segment {
    name: String,
    inner: Spinlock<Inner>,
}

enum Inner {
    Mutable(Mutable),
    Sealed(Arc<Sealed>),
}

struct Mutable {
    table: Vec<Revision>,
    index: Vec<Revision>,
    corpus: Vec<Revision>,
    bloom: LoggingBloomFilter,
    version_lo: u64,
    version_hi: u64,
    length: u64,
}

struct Sealed {
    location: ffi::OsString,
    header: Header,
    manifests: [Spinlock<Option<Arc<Vec<ManifestEntry>>>>; 3],
    bloom: Spinlock<Option<Arc<bloom::View>>>,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "segment<{}>", self.name)
    }
}

impl Segment {
    /// Create a fresh mutable segment; its logging bloom filter journals
    /// to `bloom_location`.
    pub fn new_mutable(name: &str, bloom_location: &ffi::OsStr) -> Result<Segment> {
        let bloom = LoggingBloomFilter::create(bloom_location, EXPECTED_INSERTIONS, FPP)?;

        let mutable = Mutable {
            table: vec![],
            index: vec![],
            corpus: vec![],
            bloom,
            version_lo: u64::MAX,
            version_hi: 0,
            length: 0,
        };

        Ok(Segment {
            name: name.to_string(),
            inner: Spinlock::new(Inner::Mutable(mutable)),
        })
    }

    /// Open a sealed segment at `location`, loading only its header.
    pub fn open(name: &str, location: &ffi::OsStr) -> Result<Segment> {
        let header = {
            let mut fd = util::open_file_r(location)?;
            let buf = read_file!(
                &mut fd,
                std::io::SeekFrom::Start(0),
                HEADER_SIZE,
                "segment header"
            )?;
            Header::decode(&buf)?
        };

        let sealed = Sealed {
            location: location.to_os_string(),
            header,
            manifests: [
                Spinlock::new(None),
                Spinlock::new(None),
                Spinlock::new(None),
            ],
            bloom: Spinlock::new(None),
        };

        Ok(Segment {
            name: name.to_string(),
            inner: Spinlock::new(Inner::Sealed(Arc::new(sealed))),
        })
    }

    pub fn to_name(&self) -> String {
        self.name.clone()
    }

    pub fn is_mutable(&self) -> bool {
        matches!(&*self.inner.read(), Inner::Mutable(_))
    }

    /// `(version_lo, version_hi)` of the revisions held.
    pub fn to_version_range(&self) -> (u64, u64) {
        match &*self.inner.read() {
            Inner::Mutable(m) => (m.version_lo, m.version_hi),
            Inner::Sealed(s) => (s.header.version_lo, s.header.version_hi),
        }
    }

    pub fn len_revisions(&self) -> usize {
        match &*self.inner.read() {
            Inner::Mutable(m) => m.table.len() + m.index.len() + m.corpus.len(),
            Inner::Sealed(s) => {
                (s.header.n_table + s.header.n_index + s.header.n_corpus) as usize
            }
        }
    }

    /// Approximate on-disk byte length.
    pub fn length(&self) -> Result<u64> {
        match &*self.inner.read() {
            Inner::Mutable(m) => Ok(m.length),
            Inner::Sealed(s) => {
                let meta = err_at!(IOError, fs::metadata(&s.location))?;
                Ok(meta.len())
            }
        }
    }

}

impl Segment {
    /// Accept a write into this mutable segment. Derives the write's
    /// revisions, records every fingerprint arity in the bloom filter
    /// and returns the [Receipt].
    pub fn acquire(&self, write: &Write, searchable: bool) -> Result<Receipt> {
        let revisions = write.to_revisions(searchable)?;

        let mut inner = self.inner.write();
        match &mut *inner {
            Inner::Mutable(m) => m.ingest(&revisions)?,
            Inner::Sealed(_) => err_at!(Fatal, msg: "acquire on sealed {}", self.name)?,
        }

        Ok(Receipt {
            write: write.clone(),
            revisions,
        })
    }

    /// Accept raw revisions; the compactor's path into a replacement
    /// segment.
    pub fn ingest(&self, revisions: &[Revision]) -> Result<()> {
        let mut inner = self.inner.write();
        match &mut *inner {
            Inner::Mutable(m) => m.ingest(revisions),
            Inner::Sealed(_) => err_at!(Fatal, msg: "ingest on sealed {}", self.name),
        }
    }

    /// Persist the current content at `location` in the sealed layout,
    /// leaving the segment mutable. Also syncs the bloom journal, so a
    /// restart sees everything transported so far.
    pub fn save(&self, location: &ffi::OsStr) -> Result<()> {
        let inner = self.inner.read();
        match &*inner {
            Inner::Mutable(m) => {
                m.bloom.disk_sync()?;
                m.write_file(location)?;
                Ok(())
            }
            Inner::Sealed(_) => Ok(()), // sealed files never change
        }
    }

    /// Seal this segment at `location`. After transfer the segment is
    /// immutable; its in-memory streams are dropped in favour of the
    /// on-disk form.
    pub fn transfer(&self, location: &ffi::OsStr) -> Result<()> {
        let mut inner = self.inner.write();
        let header = match &mut *inner {
            Inner::Mutable(m) => {
                m.bloom.disk_sync()?;
                m.write_file(location)?
            }
            Inner::Sealed(_) => err_at!(Fatal, msg: "transfer on sealed {}", self.name)?,
        };

        let sealed = Sealed {
            location: location.to_os_string(),
            header,
            manifests: [
                Spinlock::new(None),
                Spinlock::new(None),
                Spinlock::new(None),
            ],
            bloom: Spinlock::new(None),
        };
        *inner = Inner::Sealed(Arc::new(sealed));
        Ok(())
    }
}

impl Segment {
    /// Bloom consult for a fingerprint's canonical bytes. False means
    /// definitely absent from this segment.
    pub fn might_contain(&self, bytes: &[u8]) -> Result<bool> {
        let sealed = match &*self.inner.read() {
            Inner::Mutable(m) => return m.bloom.might_contain(bytes),
            Inner::Sealed(s) => Arc::clone(s),
        };
        sealed.bloom_view()?.might_contain(bytes)
    }

    /// Every revision of `stream` whose locator hashes to `digest`, in
    /// stored order. Consults only the locator's byte range on disk.
    pub fn read_locator(&self, stream: Stream, digest: u128) -> Result<Vec<Revision>> {
        let sealed = match &*self.inner.read() {
            Inner::Mutable(m) => {
                let mut revisions = vec![];
                for revision in m.stream(stream).iter() {
                    if revision.locator_digest()? == digest {
                        revisions.push(revision.clone());
                    }
                }
                return Ok(revisions);
            }
            Inner::Sealed(s) => Arc::clone(s),
        };
        sealed.read_locator(stream, digest)
    }

    /// The whole `stream`, sorted.
    pub fn read_stream(&self, stream: Stream) -> Result<Vec<Revision>> {
        let sealed = match &*self.inner.read() {
            Inner::Mutable(m) => {
                let mut revisions = m.stream(stream).to_vec();
                revisions.sort();
                return Ok(revisions);
            }
            Inner::Sealed(s) => Arc::clone(s),
        };
        sealed.read_stream(stream)
    }

    /// Byte span a locator occupies in `stream`; a cheap cardinality
    /// hint for the navigation cost estimator.
    pub fn locator_span(&self, stream: Stream, digest: u128) -> Result<u64> {
        let sealed = match &*self.inner.read() {
            Inner::Mutable(m) => {
                let mut span = 0;
                for revision in m.stream(stream).iter() {
                    if revision.locator_digest()? == digest {
                        let mut scratch = vec![];
                        span += seg::to_u64(revision.encode(&mut scratch)?)?;
                    }
                }
                return Ok(span);
            }
            Inner::Sealed(s) => Arc::clone(s),
        };

        let entries = sealed.manifest(stream)?;
        match manifest::lookup(&entries, digest) {
            Some((start, end)) => Ok(end - start),
            None => Ok(0),
        }
    }

    /// True iff any revision is shared with `other`. Shared table
    /// revisions imply shared derived revisions, so only the table
    /// stream is compared.
    pub fn intersects(&self, other: &Segment) -> Result<bool> {
        let mine: HashSet<Vec<u8>> = {
            let mut set = HashSet::new();
            for revision in self.read_stream(Stream::Table)?.into_iter() {
                let mut buf = vec![];
                revision.encode(&mut buf)?;
                set.insert(buf);
            }
            set
        };

        for revision in other.read_stream(Stream::Table)?.into_iter() {
            let mut buf = vec![];
            revision.encode(&mut buf)?;
            if mine.contains(&buf) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Similarity score in 0..=100: the Jaccard index of the two
    /// segments' triple fingerprints.
    pub fn similarity_with(&self, other: &Segment) -> Result<u8> {
        let mut mine = HashSet::new();
        for revision in self.read_stream(Stream::Table)?.into_iter() {
            mine.insert(revision.fingerprint()?.to_bytes());
        }
        let mut theirs = HashSet::new();
        for revision in other.read_stream(Stream::Table)?.into_iter() {
            theirs.insert(revision.fingerprint()?.to_bytes());
        }

        let union = mine.union(&theirs).count();
        if union == 0 {
            return Ok(0);
        }
        let shared = mine.intersection(&theirs).count();
        Ok(((shared * 100) / union) as u8)
    }
}

impl Mutable {
    fn stream(&self, stream: Stream) -> &[Revision] {
        match stream {
            Stream::Table => &self.table,
            Stream::Index => &self.index,
            Stream::Corpus => &self.corpus,
        }
    }

    fn ingest(&mut self, revisions: &[Revision]) -> Result<()> {
        for revision in revisions.iter() {
            self.bloom.put(&revision.fingerprint()?.to_bytes())?;
            self.bloom.put(&revision.locator_key_fingerprint()?.to_bytes())?;
            self.bloom.put(&revision.locator_fingerprint()?.to_bytes())?;

            let mut scratch = vec![];
            self.length += seg::to_u64(revision.encode(&mut scratch)?)?;

            let version = revision.to_version();
            self.version_lo = self.version_lo.min(version);
            self.version_hi = self.version_hi.max(version);

            match revision.to_stream() {
                Stream::Table => self.table.push(revision.clone()),
                Stream::Index => self.index.push(revision.clone()),
                Stream::Corpus => self.corpus.push(revision.clone()),
            }
        }
        Ok(())
    }

    // encode the sealed layout and flush it to `location`; returns the
    // header that was written.
    fn write_file(&self, location: &ffi::OsStr) -> Result<Header> {
        let mut streams: Vec<Vec<Revision>> = vec![
            self.table.to_vec(),
            self.index.to_vec(),
            self.corpus.to_vec(),
        ];
        for stream in streams.iter_mut() {
            stream.sort();
        }

        // encode streams, tracking per-record sizes for the manifests.
        let mut blocks: Vec<Vec<u8>> = vec![];
        let mut sizes: Vec<Vec<usize>> = vec![];
        for stream in streams.iter() {
            let mut block = vec![];
            let mut record_sizes = vec![];
            for revision in stream.iter() {
                record_sizes.push(revision.encode(&mut block)?);
            }
            blocks.push(block);
            sizes.push(record_sizes);
        }

        let table_offset = seg::to_u64(HEADER_SIZE)?;
        let index_offset = table_offset + seg::to_u64(blocks[0].len())?;
        let corpus_offset = index_offset + seg::to_u64(blocks[1].len())?;
        let table_manifest_offset = corpus_offset + seg::to_u64(blocks[2].len())?;

        let mut manifests: Vec<Vec<u8>> = vec![];
        let bases = [table_offset, index_offset, corpus_offset];
        for (i, stream) in streams.iter().enumerate() {
            let entries = manifest::build(stream, &sizes[i], bases[i])?;
            let mut block = vec![];
            for entry in entries.iter() {
                entry.encode(&mut block)?;
            }
            manifests.push(block);
        }

        let index_manifest_offset = table_manifest_offset + seg::to_u64(manifests[0].len())?;
        let corpus_manifest_offset = index_manifest_offset + seg::to_u64(manifests[1].len())?;
        let bloom_offset = corpus_manifest_offset + seg::to_u64(manifests[2].len())?;

        let bloom_block = self.bloom.to_bit_stream();

        let header = Header {
            version: seg::FORMAT_VERSION,
            schema: seg::SCHEMA,
            n_table: streams[0].len() as u32,
            n_index: streams[1].len() as u32,
            n_corpus: streams[2].len() as u32,
            version_lo: self.version_lo,
            version_hi: self.version_hi,
            table_offset,
            index_offset,
            corpus_offset,
            table_manifest_offset,
            index_manifest_offset,
            corpus_manifest_offset,
            bloom_offset,
            bloom_length: bloom_block.len() as u32,
        };

        let mut flusher = Flusher::new(location, FLUSH_QUEUE_SIZE)?;
        let mut head = vec![];
        header.encode(&mut head)?;
        flusher.flush(head)?;
        for block in blocks.into_iter().chain(manifests.into_iter()) {
            if !block.is_empty() {
                flusher.flush(block)?;
            }
        }
        if !bloom_block.is_empty() {
            flusher.flush(bloom_block)?;
        }
        flusher.close()?;

        Ok(header)
    }
}

impl Sealed {
    fn read_range(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        if end < start {
            err_at!(Corrupted, msg: "range {}..{} in {:?}", start, end, self.location)?;
        }
        let mut fd = util::open_file_r(&self.location)?;
        read_file!(
            &mut fd,
            std::io::SeekFrom::Start(start),
            end - start,
            "segment range"
        )
    }

    fn manifest(&self, stream: Stream) -> Result<Arc<Vec<ManifestEntry>>> {
        let slot = match stream {
            Stream::Table => &self.manifests[0],
            Stream::Index => &self.manifests[1],
            Stream::Corpus => &self.manifests[2],
        };

        if let Some(entries) = slot.read().as_ref() {
            return Ok(Arc::clone(entries));
        }

        let (start, end) = self.header.to_manifest_range(stream);
        let entries = Arc::new(manifest::decode_all(&self.read_range(start, end)?)?);

        let mut guard = slot.write();
        if guard.is_none() {
            *guard = Some(Arc::clone(&entries));
        }
        Ok(entries)
    }

    fn bloom_view(&self) -> Result<Arc<bloom::View>> {
        if let Some(view) = self.bloom.read().as_ref() {
            return Ok(Arc::clone(view));
        }

        let start = self.header.bloom_offset;
        let end = start + u64::from(self.header.bloom_length);
        let view = Arc::new(bloom::View::from_bit_stream(
            &self.read_range(start, end)?,
            EXPECTED_INSERTIONS,
            FPP,
        )?);

        let mut guard = self.bloom.write();
        if guard.is_none() {
            *guard = Some(Arc::clone(&view));
        }
        Ok(view)
    }

    fn read_locator(&self, stream: Stream, digest: u128) -> Result<Vec<Revision>> {
        let entries = self.manifest(stream)?;
        match manifest::lookup(&entries, digest) {
            Some((start, end)) => seg::decode_stream(stream, &self.read_range(start, end)?),
            None => Ok(vec![]),
        }
    }

    fn read_stream(&self, stream: Stream) -> Result<Vec<Revision>> {
        let (start, end) = self.header.to_stream_range(stream);
        seg::decode_stream(stream, &self.read_range(start, end)?)
    }
}

#[cfg(test)]
#[path = "segment_test.rs"]
mod segment_test;
