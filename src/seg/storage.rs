use uuid::Uuid;

use std::{convert::TryFrom, ffi, fs, path, sync::Arc};

use crate::{
    seg::{
        files::{self, SegmentFileName},
        Segment,
    },
    util::Spinlock,
    Error, Result,
};

/// Owner of the segment list and the lock that guards its shape.
///
/// The list is `[s1, s2, .., sn, seg0]`: sealed segments in starting
/// version order with the one mutable segment always at the tail. Every
/// list mutation, transport into `seg0` and compactor shift happens
/// under the write latch; readers walk the list under the read latch.
/// Storage also allocates segment and bloom files.
pub struct SegmentStorage {
    segments_dir: ffi::OsString,
    bloom_dir: ffi::OsString,
    lock: Spinlock<Vec<Arc<Segment>>>,
}

impl SegmentStorage {
    /// Open the storage under `segments_dir`/`bloom_dir`, listing
    /// existing segment files and loading their headers only. Files
    /// failing structural checks are excluded with a log entry. The
    /// returned list is sorted by starting version; no `seg0` is
    /// appended yet.
    pub fn open(segments_dir: &ffi::OsStr, bloom_dir: &ffi::OsStr) -> Result<SegmentStorage> {
        err_at!(IOError, fs::create_dir_all(segments_dir))?;
        err_at!(IOError, fs::create_dir_all(bloom_dir))?;

        let mut segments: Vec<Arc<Segment>> = vec![];
        for item in err_at!(IOError, fs::read_dir(segments_dir))? {
            let location: path::PathBuf = {
                let file_name = err_at!(IOError, item)?.file_name();
                [segments_dir.to_os_string(), file_name].iter().collect()
            };
            let name = match String::try_from(SegmentFileName(location.clone().into_os_string()))
            {
                Ok(name) => name,
                Err(_) => continue, // not a segment file
            };
            match Segment::open(&name, location.as_os_str()) {
                Ok(segment) => segments.push(Arc::new(segment)),
                Err(err) => {
                    log::error!("excluding segment {:?}: {}", location, err);
                }
            }
        }

        segments.sort_by_key(|segment| segment.to_version_range().0);

        Ok(SegmentStorage {
            segments_dir: segments_dir.to_os_string(),
            bloom_dir: bloom_dir.to_os_string(),
            lock: Spinlock::new(segments),
        })
    }

    /// The storage lock wrapping the segment list. Components receive
    /// this handle, never the list itself.
    pub fn lock(&self) -> &Spinlock<Vec<Arc<Segment>>> {
        &self.lock
    }

    /// Allocate a fresh mutable segment with its own bloom journal.
    pub fn new_segment(&self) -> Result<Arc<Segment>> {
        let name = Uuid::new_v4().to_string();
        let bloom_location = files::to_bloom_location(&self.bloom_dir, &name);
        Ok(Arc::new(Segment::new_mutable(&name, &bloom_location)?))
    }

    /// The `.seg` path allocated to `segment`.
    pub fn to_location(&self, segment: &Segment) -> ffi::OsString {
        files::to_segment_location(&self.segments_dir, &segment.to_name())
    }

    /// Persist a mutable segment's current content at its location.
    pub fn save(&self, segment: &Segment) -> Result<()> {
        segment.save(&self.to_location(segment))
    }

    /// Seal `segment` at its location.
    pub fn transfer(&self, segment: &Segment) -> Result<()> {
        segment.transfer(&self.to_location(segment))
    }

    /// Delete a garbage segment's files; compaction's final step.
    pub fn purge(&self, segment: &Segment) -> Result<()> {
        let name = segment.to_name();
        let seg_loc = files::to_segment_location(&self.segments_dir, &name);
        let blm_loc = files::to_bloom_location(&self.bloom_dir, &name);
        fs::remove_file(&seg_loc).ok(); // may never have been saved
        fs::remove_file(&blm_loc).ok();
        Ok(())
    }

    /// Free bytes on the volume holding the segments directory.
    pub fn available_disk_space(&self) -> Result<u64> {
        err_at!(IOError, fs2::available_space(&self.segments_dir))
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;
