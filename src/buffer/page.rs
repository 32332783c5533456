use std::{
    convert::TryFrom,
    ffi, fs,
    io::{Read, Seek, SeekFrom, Write as IoWrite},
    path,
};

use crate::{
    buffer::{PAGE_HEADER_SIZE, PAGE_MAGIC},
    coll::BridgeSortMap,
    db::Write,
    util, Error, Result,
};

/// One write-ahead page: a fixed-budget file of serialised writes plus
/// an in-memory sorted view.
///
/// The file starts with `page_magic:4 || page_id:8 || write_count:4`,
/// followed by the writes in arrival order. The in-memory
/// [BridgeSortMap] bridges arrival order into version order; since
/// versions are assigned at insert, arrivals are almost always already
/// in order and land in the map's primary run.
pub struct Page {
    id: u64,
    location: ffi::OsString,
    fd: fs::File,
    written: usize,
    n_unsynced: usize,
    writes: Vec<Write>,
    map: BridgeSortMap<u64, usize>,
}

impl Page {
    /// Create a fresh page numbered `id` under `dir`.
    pub fn create(dir: &ffi::OsStr, id: u64) -> Result<Page> {
        let location = crate::buffer::to_page_location(dir, id);

        {
            let parent = path::Path::new(&location).parent().unwrap();
            err_at!(IOError, fs::create_dir_all(parent))?;
        }
        let mut fd = {
            fs::remove_file(&location).ok();
            let mut opts = fs::OpenOptions::new();
            err_at!(
                IOError,
                opts.read(true).write(true).create_new(true).open(&location)
            )?
        };

        let mut head = vec![];
        head.extend_from_slice(&PAGE_MAGIC.to_le_bytes());
        head.extend_from_slice(&id.to_le_bytes());
        head.extend_from_slice(&0_u32.to_le_bytes());
        err_at!(IOError, fd.write_all(&head))?;

        Ok(Page {
            id,
            location,
            fd,
            written: PAGE_HEADER_SIZE,
            n_unsynced: 0,
            writes: vec![],
            map: BridgeSortMap::new(),
        })
    }

    /// Reload a page from disk, tolerating a torn trailing write from a
    /// crash mid-append. A page whose header is damaged is refused.
    pub fn load(location: &ffi::OsStr) -> Result<Page> {
        let mut fd = util::open_file_w(location)?;

        let mut data = vec![];
        err_at!(IOError, fd.read_to_end(&mut data), "page {:?}", location)?;
        if data.len() < PAGE_HEADER_SIZE {
            err_at!(Corrupted, msg: "page {:?} truncated header", location)?;
        }

        let magic = util::decode_u32(&data, "page magic")?;
        if magic != PAGE_MAGIC {
            err_at!(Corrupted, msg: "page {:?} bad magic {:x}", location, magic)?;
        }
        let id = util::decode_u64(&data[4..], "page id")?;

        let mut writes = vec![];
        let mut map = BridgeSortMap::new();
        let mut off = PAGE_HEADER_SIZE;
        while off < data.len() {
            match Write::decode(&data[off..]) {
                Ok((write, n)) => {
                    map.insert(write.version, writes.len());
                    writes.push(write);
                    off += n;
                }
                Err(_) => {
                    // torn tail; everything before it is intact.
                    log::warn!(
                        "page {:?} dropping torn tail at byte {}",
                        location,
                        off
                    );
                    err_at!(IOError, fd.set_len(u64::try_from(off).unwrap()))?;
                    break;
                }
            }
        }

        let mut page = Page {
            id,
            location: location.to_os_string(),
            fd,
            written: off,
            n_unsynced: 0,
            writes,
            map,
        };
        page.update_count()?;
        Ok(page)
    }

    pub fn to_id(&self) -> u64 {
        self.id
    }

    pub fn to_location(&self) -> ffi::OsString {
        self.location.clone()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Bytes this page would occupy after appending a write of
    /// `write_size` encoded bytes.
    pub fn projected_size(&self, write_size: usize) -> usize {
        self.written + write_size
    }

    /// Append a write; `sync` forces an fsync of the appended bytes.
    pub fn append(&mut self, write: &Write, sync: bool) -> Result<()> {
        let mut buf = vec![];
        write.encode(&mut buf)?;

        err_at!(IOError, self.fd.seek(SeekFrom::Start(self.written as u64)))?;
        err_at!(IOError, self.fd.write_all(&buf))?;
        self.written += buf.len();

        self.map.insert(write.version, self.writes.len());
        self.writes.push(write.clone());
        self.update_count()?;

        if sync {
            self.sync()?;
        } else {
            self.n_unsynced += 1;
        }
        Ok(())
    }

    /// Fsync pending appends.
    pub fn sync(&mut self) -> Result<()> {
        err_at!(IOError, self.fd.sync_data(), "page {:?}", self.location)?;
        self.n_unsynced = 0;
        Ok(())
    }

    pub fn n_unsynced(&self) -> usize {
        self.n_unsynced
    }

    /// The writes in insertion order.
    pub fn as_writes(&self) -> &[Write] {
        &self.writes
    }

    /// The writes in version order, via the bridge map.
    pub fn to_sorted_writes(&self) -> Vec<Write> {
        self.map
            .iter()
            .map(|(_, index)| self.writes[*index].clone())
            .collect()
    }

    /// Delete the backing file; the page was transported.
    pub fn purge(self) -> Result<()> {
        err_at!(IOError, fs::remove_file(&self.location), "{:?}", self.location)
    }

    // keep the header's write_count field current.
    fn update_count(&mut self) -> Result<()> {
        let count = u32::try_from(self.writes.len());
        let count = err_at!(FailConvert, count)?;
        err_at!(IOError, self.fd.seek(SeekFrom::Start(12)))?;
        err_at!(IOError, self.fd.write_all(&count.to_le_bytes()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "page_test.rs"]
mod page_test;
