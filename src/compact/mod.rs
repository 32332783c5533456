//! Module implement background segment rewriting.
//!
//! The [Compactor] walks a `(index, count)` shift window over the
//! sealed prefix of the segment list, asking a pluggable
//! [CompactionStrategy] to rewrite each window. A shift that produces
//! replacements swaps them in under the storage write latch and the
//! removed segments' files are purged. Shift boundaries are the only
//! cancellation points; a running shift is never abandoned midway.

use std::sync::{Arc, Mutex};

use crate::{
    db::{Revision, Stream},
    seg::{Segment, SegmentStorage},
    util::spinlock::WriteGuard,
    Result,
};

/// Similarity above which [MergeSortCompactor] merges a pair.
pub const MERGE_SIMILARITY: u8 = 50;

/// The compactor's window over the sealed segment prefix.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Shift {
    pub index: usize,
    pub count: usize,
}

impl Default for Shift {
    fn default() -> Shift {
        Shift { index: 0, count: 1 }
    }
}

/// A pluggable rewrite of a window of adjacent sealed segments.
///
/// Returning `None` declines the window; returning segments replaces
/// the window wholesale. Replacements must already be sealed and
/// durable, and must preserve revision parity: compaction changes the
/// shape of storage, never the answers reads produce.
pub trait CompactionStrategy: Send + Sync {
    fn compact(
        &self,
        window: &[Arc<Segment>],
        storage: &SegmentStorage,
    ) -> Result<Option<Vec<Arc<Segment>>>>;

    fn to_name(&self) -> &'static str;
}

/// Default strategy: decline every window.
pub struct NoOpCompactor;

impl CompactionStrategy for NoOpCompactor {
    fn compact(
        &self,
        _window: &[Arc<Segment>],
        _storage: &SegmentStorage,
    ) -> Result<Option<Vec<Arc<Segment>>>> {
        Ok(None)
    }

    fn to_name(&self) -> &'static str {
        "noop"
    }
}

/// Merge adjacent pairs whose revision sets mostly overlap.
///
/// A pair compacts iff its similarity exceeds [MERGE_SIMILARITY] and
/// the volume has headroom for a full copy of both; the merged segment
/// carries every revision from both inputs in sort order.
pub struct MergeSortCompactor;

impl CompactionStrategy for MergeSortCompactor {
    fn compact(
        &self,
        window: &[Arc<Segment>],
        storage: &SegmentStorage,
    ) -> Result<Option<Vec<Arc<Segment>>>> {
        let (a, b) = match window {
            [a, b] => (a, b),
            _ => return Ok(None),
        };

        let similarity = a.similarity_with(b)?;
        if similarity <= MERGE_SIMILARITY {
            return Ok(None);
        }
        let needed = a.length()? + b.length()?;
        if storage.available_disk_space()? <= needed {
            log::warn!("skipping merge of {} and {}: {} bytes needed", a, b, needed);
            return Ok(None);
        }

        let merged = storage.new_segment()?;
        for segment in window.iter() {
            for stream in Stream::ALL.iter() {
                let revisions: Vec<Revision> = segment.read_stream(*stream)?;
                merged.ingest(&revisions)?;
            }
        }
        storage.transfer(&merged)?;

        log::info!(
            "merged {} and {} (similarity {}) into {}",
            a,
            b,
            similarity,
            merged
        );
        Ok(Some(vec![merged]))
    }

    fn to_name(&self) -> &'static str {
        "mergesort"
    }
}

/// Periodically rewrites the sealed segment prefix by shifts.
///
/// Holds a handle to the segment storage, never the list itself; every
/// shift runs under the storage write latch.
pub struct Compactor {
    storage: Arc<SegmentStorage>,
    strategy: Box<dyn CompactionStrategy>,
    shift: Mutex<Shift>,
    n_compacted: Mutex<usize>,
}

impl Compactor {
    pub fn new(storage: Arc<SegmentStorage>, strategy: Box<dyn CompactionStrategy>) -> Compactor {
        Compactor {
            storage,
            strategy,
            shift: Mutex::new(Shift::default()),
            n_compacted: Mutex::new(0),
        }
    }

    pub fn to_strategy_name(&self) -> &'static str {
        self.strategy.to_name()
    }

    pub fn to_shift(&self) -> Shift {
        *self.shift.lock().unwrap()
    }

    /// Segments compacted away so far.
    pub fn to_compacted_count(&self) -> usize {
        *self.n_compacted.lock().unwrap()
    }

    /// Run one shift iff the storage latch is immediately acquirable
    /// and there is more than one sealed segment. Return true when a
    /// shift ran.
    pub fn try_incremental_compaction(&self) -> Result<bool> {
        let mut guard = match self.storage.lock().try_write() {
            Some(guard) => guard,
            None => return Ok(false),
        };
        if guard.len() <= 2 {
            return Ok(false);
        }
        self.run_shift(&mut guard)?;
        Ok(true)
    }

    /// Loop shifts until one completes a full cycle over the sealed
    /// prefix. The latch is released between shifts, so writers and
    /// readers interleave with a full compaction.
    pub fn execute_full_compaction(&self) -> Result<()> {
        loop {
            let cycled = {
                let mut guard = self.storage.lock().write();
                self.run_shift(&mut guard)?
            };
            if cycled {
                break Ok(());
            }
        }
    }

    /// One shift of the state machine. Return true when the cycle
    /// completed and the shift reset to `(0, 1)`.
    pub fn run_shift(&self, guard: &mut WriteGuard<Vec<Arc<Segment>>>) -> Result<bool> {
        // the mutable tail is never compacted.
        let limit = guard.len().saturating_sub(1);
        let mut shift = self.shift.lock().unwrap();

        if shift.count > limit {
            *shift = Shift::default();
            return Ok(true);
        }
        if shift.index + shift.count > limit {
            shift.index = 0;
            shift.count += 1;
            return Ok(false);
        }

        let window: Vec<Arc<Segment>> =
            guard[shift.index..shift.index + shift.count].to_vec();
        match self.strategy.compact(&window, &self.storage)? {
            None => shift.index += 1,
            Some(replacements) => {
                let mut garbage = vec![];
                for _i in 0..shift.count {
                    garbage.push(guard.remove(shift.index));
                }
                for segment in replacements.iter().rev() {
                    guard.insert(shift.index, Arc::clone(segment));
                    self.storage.save(segment)?;
                }
                shift.index += shift.count - 1;

                *self.n_compacted.lock().unwrap() += garbage.len();
                for segment in garbage.into_iter() {
                    self.storage.purge(&segment)?;
                }
            }
        }
        Ok(false)
    }
}
