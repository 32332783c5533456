//! Module implement the write-ahead staging area.
//!
//! Writes are appended durably to fixed-size page files and mirrored in
//! per-page in-memory maps for reads. Once a page fills it is sealed and
//! becomes eligible for transport into the database, oldest first; a
//! transported page is deleted. The buffer therefore holds exactly the
//! writes that are not yet in a segment.

use std::{convert::TryFrom, ffi, fmt, path, result};

use crate::{db, Error, Result};

mod buffer;
mod page;

pub use self::buffer::Buffer;
pub use page::Page;

/// Magic prefix of every page file, "CNBP".
pub const PAGE_MAGIC: u32 = 0x434E4250;

/// Default page size in bytes; a page turns when its next write would
/// cross this.
pub const PAGE_SIZE: usize = 1024 * 1024;

/// Under `Batched` durability, fsync after this many appended writes.
pub const BATCH_SYNC_EVERY: usize = 64;

/// Byte width of the fixed page header:
/// `page_magic:4 || page_id:8 || write_count:4`.
pub const PAGE_HEADER_SIZE: usize = 16;

/// An explicit batch of writes handed to the batch transporter: one
/// sealed page's writes in insertion order, tagged with the page's
/// ordinal. Consumers must merge resulting segments in ordinal order.
#[derive(Debug, Clone)]
pub struct Batch {
    pub name: String,
    pub writes: Vec<db::Write>,
    pub ordinal: u64,
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "batch<{} n:{} ord:{}>", self.name, self.writes.len(), self.ordinal)
    }
}

/// Store types whose pending writes can be pulled in explicit batches,
/// indexed elsewhere (possibly in parallel) and then purged.
pub trait BatchTransportable {
    /// The oldest untransported batch, None when fully drained.
    fn next_batch(&self) -> Result<Option<Batch>>;

    /// Drop a consumed batch from the store. Must be called only after
    /// the batch's writes are durable elsewhere.
    fn purge_batch(&self, batch: &Batch) -> Result<()>;
}

/// A page file is uniquely locatable given the buffer directory and the
/// page's id. `format!("{}.page", id)`
#[derive(Clone)]
pub struct PageFileName(pub ffi::OsString);

impl From<u64> for PageFileName {
    fn from(id: u64) -> PageFileName {
        let file_name = format!("{}.page", id);
        PageFileName(AsRef::<ffi::OsStr>::as_ref(&file_name).to_os_string())
    }
}

impl TryFrom<PageFileName> for u64 {
    type Error = Error;

    fn try_from(fname: PageFileName) -> Result<u64> {
        let ffpp = path::Path::new(&fname.0);
        let id = || -> Option<u64> {
            let fname = ffpp.file_name()?;
            if fname.to_str()?.ends_with(".page") {
                path::Path::new(fname).file_stem()?.to_str()?.parse().ok()
            } else {
                None
            }
        }();

        match id {
            Some(id) => Ok(id),
            None => err_at!(InvalidFile, msg: "{:?}", ffpp),
        }
    }
}

impl From<PageFileName> for ffi::OsString {
    fn from(name: PageFileName) -> ffi::OsString {
        name.0
    }
}

impl fmt::Display for PageFileName {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self.0.to_str() {
            Some(s) => write!(f, "{}", s),
            None => write!(f, "{:?}", self.0),
        }
    }
}

/// Compose the path of page `id` under `dir`.
pub fn to_page_location(dir: &ffi::OsStr, id: u64) -> ffi::OsString {
    let loc: path::PathBuf = [dir.to_os_string(), PageFileName::from(id).into()]
        .iter()
        .collect();
    loc.into_os_string()
}
