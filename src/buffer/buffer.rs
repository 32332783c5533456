use std::{
    collections::VecDeque,
    convert::TryFrom,
    ffi, fs, path,
    sync::atomic::{AtomicU64, Ordering::SeqCst},
    sync::{Condvar, Mutex},
};

use crate::{
    buffer::{Batch, BatchTransportable, Page, PageFileName, BATCH_SYNC_EVERY},
    clock::TimeSource,
    db::{Action, Identifier, Text, Value, Write},
    store::Database,
    Durability, Error, Result,
};

/// Write-ahead, page-based queue of writes.
///
/// `insert` assigns the version, appends to the current page under the
/// configured durability mode and mirrors the write in memory. Sealed
/// pages drain into the database via [Buffer::try_transport], oldest
/// first. Readers merge [Buffer::to_writes] with segment reads; the
/// engine serialises those merged reads against transport through the
/// segment-storage latch.
pub struct Buffer {
    dir: ffi::OsString,
    page_size: usize,
    durability: Durability,
    time: TimeSource,

    inner: Mutex<Inner>,
    transportable: Condvar,
    listeners: Mutex<Vec<Box<dyn Fn() + Send + Sync>>>,
    last_transport_us: AtomicU64,
}

struct Inner {
    sealed: VecDeque<Page>,
    current: Page,
    next_id: u64,
    transporting: bool,
    closed: bool,
}

impl Buffer {
    /// Open the buffer under `dir`, reloading any pages a previous
    /// process left behind. Reloaded pages are all sealed; a fresh page
    /// becomes current. Pages failing structural checks are excluded
    /// with a log entry.
    pub fn open(
        dir: &ffi::OsStr,
        page_size: usize,
        durability: Durability,
        time: TimeSource,
    ) -> Result<Buffer> {
        err_at!(IOError, fs::create_dir_all(dir))?;

        let mut sealed = vec![];
        for item in err_at!(IOError, fs::read_dir(dir))? {
            let location: path::PathBuf = {
                let file_name = err_at!(IOError, item)?.file_name();
                [dir.to_os_string(), file_name].iter().collect()
            };
            if u64::try_from(PageFileName(location.clone().into_os_string())).is_err() {
                continue; // not a page file
            }
            match Page::load(location.as_os_str()) {
                Ok(page) => sealed.push(page),
                Err(err) => log::error!("excluding page {:?}: {}", location, err),
            }
        }
        sealed.sort_by_key(|page| page.to_id());

        let next_id = sealed.last().map(|page| page.to_id() + 1).unwrap_or(0);
        let current = Page::create(dir, next_id)?;

        let now = time.epoch_micros()?;
        let inner = Inner {
            sealed: sealed.into_iter().collect(),
            current,
            next_id: next_id + 1,
            transporting: false,
            closed: false,
        };

        Ok(Buffer {
            dir: dir.to_os_string(),
            page_size,
            durability,
            time,
            inner: Mutex::new(inner),
            transportable: Condvar::new(),
            listeners: Mutex::new(vec![]),
            last_transport_us: AtomicU64::new(now),
        })
    }

    /// Append one mutation. Assigns the monotonic version, turns the
    /// page when it would overflow and applies the durability mode.
    /// Return the stamped write.
    pub fn insert(
        &self,
        key: Text,
        value: Value,
        record: Identifier,
        action: Action,
    ) -> Result<Write> {
        let version = self.time.epoch_micros()?;
        let write = Write::new(key, value, record, version, action);

        let size = {
            let mut buf = vec![];
            write.encode(&mut buf)?
        };

        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            err_at!(InvalidInput, msg: "buffer closed")?;
        }

        if inner.current.projected_size(size) > self.page_size && !inner.current.is_empty()
        {
            self.turn_page(&mut inner)?;
        }

        let sync = match self.durability {
            Durability::SyncEach => true,
            Durability::Batched => inner.current.n_unsynced() + 1 >= BATCH_SYNC_EVERY,
            Durability::Os => false,
        };
        inner.current.append(&write, sync)?;

        Ok(write)
    }

    // seal the current page and start a new one; callers hold the inner
    // lock.
    fn turn_page(&self, inner: &mut Inner) -> Result<()> {
        inner.current.sync()?;

        let id = inner.next_id;
        inner.next_id += 1;
        let fresh = Page::create(&self.dir, id)?;

        let full = std::mem::replace(&mut inner.current, fresh);
        log::debug!("buffer page {} sealed with {} writes", full.to_id(), full.len());
        inner.sealed.push_back(full);

        self.transportable.notify_all();
        Ok(())
    }

    /// Block until at least one sealed page exists, or the buffer is
    /// closed.
    pub fn wait_until_transportable(&self) {
        let mut inner = self.inner.lock().unwrap();
        while inner.sealed.is_empty() && !inner.closed {
            inner = self.transportable.wait(inner).unwrap();
        }
    }

    /// Register a listener fired when the transport backlog fully
    /// drains, telling the transporter it may scale its rate back.
    pub fn on_transport_rate_scale_back(&self, listener: Box<dyn Fn() + Send + Sync>) {
        self.listeners.lock().unwrap().push(listener);
    }

    fn fire_scale_back(&self) {
        for listener in self.listeners.lock().unwrap().iter() {
            listener();
        }
    }

    /// Microsecond timestamp of the last completed transport.
    pub fn to_last_transport_us(&self) -> u64 {
        self.last_transport_us.load(SeqCst)
    }

    /// Move the oldest sealed page's writes into the database's mutable
    /// segment, then delete the page. Returns true iff at least one
    /// write moved. Non-blocking: bails out when the segment-storage
    /// latch or the page is unavailable.
    pub fn try_transport(&self, database: &Database) -> Result<bool> {
        let mut guard = match database.storage().lock().try_write() {
            Some(guard) => guard,
            None => return Ok(false),
        };

        let writes = {
            let mut inner = self.inner.lock().unwrap();
            if inner.transporting || inner.sealed.is_empty() {
                return Ok(false);
            }
            inner.transporting = true;
            inner.sealed.front().unwrap().to_sorted_writes()
        };

        // move into seg0; on failure release the claim and surface the
        // error to the transporter's cycle handler.
        let res = database.absorb(&mut guard, &writes);
        let receipts = match res {
            Ok(receipts) => receipts,
            Err(err) => {
                self.inner.lock().unwrap().transporting = false;
                return Err(err);
            }
        };

        // unhook the page and fold the receipts into the caches while
        // still holding the storage latch, so no merged read observes
        // the writes twice, not at all, or through a stale cache.
        let page = {
            let mut inner = self.inner.lock().unwrap();
            let page = inner.sealed.pop_front().unwrap();
            inner.transporting = false;
            page
        };
        database.apply_receipts(&receipts)?;
        std::mem::drop(guard);

        let n_writes = writes.len();
        log::debug!("transported page {} with {} writes", page.to_id(), n_writes);
        page.purge()?;

        self.last_transport_us
            .store(self.time.epoch_micros()?, SeqCst);
        if self.inner.lock().unwrap().sealed.is_empty() {
            self.fire_scale_back();
        }

        Ok(n_writes > 0)
    }

    /// Snapshot of buffered writes with version <= `ceiling`, in version
    /// order across pages.
    pub fn to_writes(&self, ceiling: u64) -> Vec<Write> {
        let inner = self.inner.lock().unwrap();

        let mut writes = vec![];
        for page in inner.sealed.iter() {
            writes.extend(
                page.to_sorted_writes()
                    .into_iter()
                    .filter(|w| w.version <= ceiling),
            );
        }
        writes.extend(
            inner
                .current
                .to_sorted_writes()
                .into_iter()
                .filter(|w| w.version <= ceiling),
        );
        writes
    }

    /// Number of buffered writes, across sealed pages and the current
    /// page.
    pub fn len_writes(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        let sealed: usize = inner.sealed.iter().map(|page| page.len()).sum();
        sealed + inner.current.len()
    }

    /// Number of sealed pages awaiting transport.
    pub fn len_sealed_pages(&self) -> usize {
        self.inner.lock().unwrap().sealed.len()
    }

    /// Sync the current page and refuse further writes; wakes any
    /// transporter blocked on [Buffer::wait_until_transportable].
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.current.sync()?;
        inner.closed = true;
        self.transportable.notify_all();
        Ok(())
    }
}

impl BatchTransportable for Buffer {
    fn next_batch(&self) -> Result<Option<Batch>> {
        let inner = self.inner.lock().unwrap();
        match inner.sealed.front() {
            Some(page) => Ok(Some(Batch {
                name: PageFileName::from(page.to_id()).to_string(),
                writes: page.as_writes().to_vec(),
                ordinal: page.to_id(),
            })),
            None => Ok(None),
        }
    }

    fn purge_batch(&self, batch: &Batch) -> Result<()> {
        let page = {
            let mut inner = self.inner.lock().unwrap();
            match inner.sealed.front() {
                Some(page) if page.to_id() == batch.ordinal => {
                    inner.sealed.pop_front().unwrap()
                }
                Some(page) => err_at!(
                    InvalidInput, msg: "purge out of order {} != {}", page.to_id(), batch.ordinal
                )?,
                None => err_at!(InvalidInput, msg: "no page for {}", batch.ordinal)?,
            }
        };
        page.purge()?;
        self.last_transport_us
            .store(self.time.epoch_micros()?, SeqCst);
        Ok(())
    }
}

#[cfg(test)]
#[path = "buffer_test.rs"]
mod buffer_test;
