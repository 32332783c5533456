use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, result,
    sync::Arc,
    thread,
};

use crate::{
    atomic::{AtomicOperation, LockTable, Outcome},
    buffer::Buffer,
    clock::TimeSource,
    compact::{Compactor, MergeSortCompactor, NoOpCompactor},
    db::{Identifier, Revision, Text, Value},
    store::{Database, Operator},
    transport::StreamingTransporter,
    Config, Error, Result,
};

/// The assembled storage engine.
///
/// Writes go through two-phase atomic operations into the buffer;
/// the streaming transporter drains them into the database in the
/// background. Reads take the segment-storage read latch once, then
/// merge buffered writes with segment state, so a read never observes a
/// write mid-transport.
pub struct Store {
    config: Config,
    time: TimeSource,
    buffer: Arc<Buffer>,
    database: Arc<Database>,
    locks: LockTable,
    compactor: Arc<Compactor>,
    transporter: Option<StreamingTransporter>,
}

impl Store {
    /// Open the engine at `config.dir` with the local clock.
    pub fn open(config: Config) -> Result<Store> {
        Store::open_with_time(config, TimeSource::new_local())
    }

    /// Open the engine with an explicit time source, typically the
    /// hybrid clock of a cluster node.
    pub fn open_with_time(config: Config, time: TimeSource) -> Result<Store> {
        let buffer = Arc::new(Buffer::open(
            &config.to_buffer_dir(),
            config.page_size,
            config.durability,
            time.clone(),
        )?);
        let database = Arc::new(Database::open(&config)?);

        let compactor = {
            let storage = Arc::clone(database.storage());
            let strategy: Box<dyn crate::compact::CompactionStrategy> =
                match config.compactor.as_str() {
                    "mergesort" => Box::new(MergeSortCompactor),
                    _ => Box::new(NoOpCompactor),
                };
            Arc::new(Compactor::new(storage, strategy))
        };

        let transporter = StreamingTransporter::start(
            Arc::clone(&buffer),
            Arc::clone(&database),
            time.clone(),
        )?;

        Ok(Store {
            config,
            time,
            buffer,
            database,
            locks: LockTable::default(),
            compactor,
            transporter: Some(transporter),
        })
    }

    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    pub fn compactor(&self) -> &Arc<Compactor> {
        &self.compactor
    }

    pub fn to_config(&self) -> Config {
        self.config.clone()
    }

    pub fn time(&self) -> &TimeSource {
        &self.time
    }

    /// Assert `(key, value)` on `record`. Returns false when the triple
    /// is already present.
    pub fn add(&self, key: &str, value: Value, record: Identifier) -> Result<bool> {
        let key = Text::from(key);
        loop {
            let mut op = AtomicOperation::new(self);
            op.add(key.clone(), value.clone(), record)?;
            match op.commit() {
                Outcome::Ok => {
                    op.finish()?;
                    break Ok(true);
                }
                Outcome::Conflict => {
                    if self.verify(&key, &value, record, crate::store::NOW)? {
                        break Ok(false);
                    }
                    thread::yield_now(); // lock race, retry
                }
                Outcome::Fatal(err) => break Err(err),
            }
        }
    }

    /// Retract `(key, value)` from `record`. Returns false when the
    /// triple is not present.
    pub fn remove(&self, key: &str, value: Value, record: Identifier) -> Result<bool> {
        let key = Text::from(key);
        loop {
            let mut op = AtomicOperation::new(self);
            op.remove(key.clone(), value.clone(), record)?;
            match op.commit() {
                Outcome::Ok => {
                    op.finish()?;
                    break Ok(true);
                }
                Outcome::Conflict => {
                    if !self.verify(&key, &value, record, crate::store::NOW)? {
                        break Ok(false);
                    }
                    thread::yield_now();
                }
                Outcome::Fatal(err) => break Err(err),
            }
        }
    }

    /// Parity of `(key, value, record)` at `version`, merged across
    /// buffer and segments.
    pub fn verify(
        &self,
        key: &Text,
        value: &Value,
        record: Identifier,
        version: u64,
    ) -> Result<bool> {
        let guard = self.database.storage().lock().read();
        let extra = self.buffered_revisions(version)?;
        self.database
            .verify_in(guard.as_slice(), &extra, key, value, record, version)
    }

    /// All keys and present values of `record` at `version`.
    pub fn select(
        &self,
        record: Identifier,
        version: u64,
    ) -> Result<BTreeMap<Text, BTreeSet<Value>>> {
        let guard = self.database.storage().lock().read();
        let extra = self.buffered_revisions(version)?;
        self.database
            .select_in(guard.as_slice(), &extra, record, version)
    }

    /// Present values of `(record, key)` at `version`.
    pub fn select_key(
        &self,
        key: &Text,
        record: Identifier,
        version: u64,
    ) -> Result<BTreeSet<Value>> {
        let guard = self.database.storage().lock().read();
        let extra = self.buffered_revisions(version)?;
        self.database
            .select_key_in(guard.as_slice(), &extra, key, record, version)
    }

    /// Value to holding-records map for `key` at `version`.
    pub fn browse(
        &self,
        key: &Text,
        version: u64,
    ) -> Result<BTreeMap<Value, BTreeSet<Identifier>>> {
        let guard = self.database.storage().lock().read();
        let extra = self.buffered_revisions(version)?;
        self.database
            .browse_in(guard.as_slice(), &extra, key, version)
    }

    /// Records satisfying `op` on `key`; a dotted key navigates.
    pub fn find(
        &self,
        key: &str,
        op: Operator,
        operands: &[Value],
        version: u64,
    ) -> Result<BTreeSet<Identifier>> {
        if key.contains('.') {
            return self.navigate(key, &BTreeSet::new(), op, operands, version);
        }

        let key = Text::from(key);
        let guard = self.database.storage().lock().read();
        let extra = self.buffered_revisions(version)?;
        self.database
            .find_in(guard.as_slice(), &extra, &key, op, operands, version)
    }

    /// Full-text match over `key`'s tokenised values.
    pub fn search(&self, key: &str, query: &str, version: u64) -> Result<BTreeSet<Identifier>> {
        let key = Text::from(key);
        let guard = self.database.storage().lock().read();
        let extra = self.buffered_revisions(version)?;
        self.database
            .search_in(guard.as_slice(), &extra, &key, query, version)
    }

    /// Navigate a dotted `path` from `start`, applying `op` at the
    /// final step.
    pub fn navigate(
        &self,
        path: &str,
        start: &BTreeSet<Identifier>,
        op: Operator,
        operands: &[Value],
        version: u64,
    ) -> Result<BTreeSet<Identifier>> {
        let guard = self.database.storage().lock().read();
        let extra = self.buffered_revisions(version)?;
        crate::store::navigate::navigate_in(
            &self.database,
            guard.as_slice(),
            &extra,
            path,
            start,
            op,
            operands,
            version,
        )
    }

    /// Reconcile duplicate revisions left by a crash mid-transport.
    pub fn repair(&self) -> Result<usize> {
        self.database.repair()
    }

    /// One incremental compaction shift, if the latch is free.
    pub fn try_incremental_compaction(&self) -> Result<bool> {
        self.compactor.try_incremental_compaction()
    }

    /// A full compaction cycle over the sealed segments.
    pub fn execute_full_compaction(&self) -> Result<()> {
        self.compactor.execute_full_compaction()
    }

    pub fn to_stats(&self) -> Stats {
        Stats {
            n_buffered_writes: self.buffer.len_writes(),
            n_sealed_pages: self.buffer.len_sealed_pages(),
            n_segments: self.database.storage().lock().read().len(),
            n_compacted: self.compactor.to_compacted_count(),
        }
    }

    /// Drain what can be drained, stop the transporter and close the
    /// buffer. Buffered writes that remain are durable in their page
    /// files and reload on the next open.
    pub fn close(mut self) -> Result<()> {
        while self.buffer.try_transport(&self.database)? {}
        self.buffer.close()?;
        match self.transporter.take() {
            Some(transporter) => transporter.close()?,
            None => err_at!(Fatal, msg: "transporter missing")?,
        }
        Ok(())
    }

    // revisions the buffered writes would contribute, merged into every
    // read. Callers hold the storage read latch.
    fn buffered_revisions(&self, version: u64) -> Result<Vec<Revision>> {
        let mut revisions = vec![];
        for write in self.buffer.to_writes(version).into_iter() {
            let searchable = self.database.is_searchable(&write.key);
            revisions.extend(write.to_revisions(searchable)?);
        }
        Ok(revisions)
    }
}

/// Point-in-time engine counters.
#[derive(Debug, Clone)]
pub struct Stats {
    pub n_buffered_writes: usize,
    pub n_sealed_pages: usize,
    pub n_segments: usize,
    pub n_compacted: usize,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(
            f,
            "stats<writes:{} pages:{} segments:{} compacted:{}>",
            self.n_buffered_writes, self.n_sealed_pages, self.n_segments, self.n_compacted
        )
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;
