use fs2::FileExt;

use std::{convert::TryFrom, ffi, fs, mem};

use crate::{util, write_file, Error, Result};

/// Background writer that batches encoded blocks into a segment file.
///
/// Blocks are posted over a bounded channel and written by a dedicated
/// thread holding a shared file lock; closing the flusher drains the
/// channel, fsyncs and releases the lock.
pub enum Flusher {
    File {
        loc: ffi::OsString,
        fpos: u64,
        th: Option<util::Thread<Vec<u8>, u64, Result<u64>>>,
        tx: Option<util::thread::Tx<Vec<u8>, u64>>,
    },
    None,
}

impl Drop for Flusher {
    fn drop(&mut self) {
        match self {
            Flusher::None => (),
            Flusher::File { tx, .. } => mem::drop(tx.take()),
        }
    }
}

impl Flusher {
    /// Create a flusher writing a fresh file at `loc`.
    pub fn new(loc: &ffi::OsStr, chan_size: usize) -> Result<Flusher> {
        let fd = util::create_file_a(loc)?;

        let ffpp = loc.to_os_string();
        let (th, tx) = {
            let thread = util::Thread::new_sync(
                "seg-flusher",
                chan_size,
                move |rx: util::thread::Rx<Vec<u8>, u64>| move || thread_flush(ffpp, fd, rx, 0),
            );
            let tx = thread.to_tx();
            (thread, tx)
        };

        Ok(Flusher::File {
            loc: loc.to_os_string(),
            fpos: 0,
            th: Some(th),
            tx: Some(tx),
        })
    }

    pub fn empty() -> Flusher {
        Flusher::None
    }

    // return the latest file position.
    pub fn to_fpos(&self) -> Option<u64> {
        match self {
            Flusher::File { fpos, .. } => Some(*fpos),
            Flusher::None => None,
        }
    }

    /// Post one encoded block for writing; returns after the block is
    /// queued, not after it reaches disk.
    pub fn flush(&mut self, data: Vec<u8>) -> Result<()> {
        match self {
            Flusher::File { fpos, tx, .. } => *fpos = tx.as_ref().unwrap().request(data)?,
            Flusher::None => (),
        };
        Ok(())
    }

    /// Close this flusher and its thread, after syncing data to disk.
    /// Return the final file size.
    pub fn close(&mut self) -> Result<u64> {
        match self {
            Flusher::File { tx, th, .. } => {
                mem::drop(tx.take());
                th.take().unwrap().join()?
            }
            Flusher::None => Ok(0),
        }
    }
}

fn thread_flush(
    loc: ffi::OsString,
    mut fd: fs::File,
    rx: util::thread::Rx<Vec<u8>, u64>,
    mut fpos: u64,
) -> Result<u64> {
    err_at!(IOError, fd.lock_shared(), "fail read lock for {:?}", loc)?;

    for (data, res_tx) in rx {
        write_file!(fd, &data, &loc, "flushing segment")?;

        fpos += err_at!(FailConvert, u64::try_from(data.len()))?;
        res_tx.map(|tx| tx.send(fpos).ok());
    }

    err_at!(IOError, fd.sync_all(), "fail sync_all {:?}", loc)?;
    err_at!(IOError, fd.unlock(), "fail read unlock {:?}", loc)?;

    Ok(fpos)
}

#[cfg(test)]
#[path = "flush_test.rs"]
mod flush_test;
