use rayon::prelude::*;

use std::sync::Arc;

use crate::{
    buffer::{Batch, BatchTransportable},
    db::Revision,
    seg::Receipt,
    store::Database,
    Result,
};

/// Pull-based mover: drains explicit batches from a
/// [BatchTransportable] store into whole segments.
///
/// Each batch's writes are indexed into revisions in parallel, ingested
/// into a fresh segment, sealed, and merged into the database before
/// the batch is purged from its source. Draining one batch at a time
/// keeps the merges in ordinal order, which consumers must preserve.
pub struct BatchTransporter {
    database: Arc<Database>,
}

impl BatchTransporter {
    pub fn new(database: Arc<Database>) -> BatchTransporter {
        BatchTransporter { database }
    }

    /// Drain every pending batch from `source`. Return the number of
    /// batches moved.
    pub fn drain<S>(&self, source: &S) -> Result<usize>
    where
        S: BatchTransportable,
    {
        let mut n_batches = 0;
        while let Some(batch) = source.next_batch()? {
            self.transport_one(source, &batch)?;
            n_batches += 1;
        }
        Ok(n_batches)
    }

    fn transport_one<S>(&self, source: &S, batch: &Batch) -> Result<()>
    where
        S: BatchTransportable,
    {
        let database = &self.database;

        // derive revisions in parallel; collect keeps write order.
        let derived: Result<Vec<Vec<Revision>>> = batch
            .writes
            .par_iter()
            .map(|write| write.to_revisions(database.is_searchable(&write.key)))
            .collect();
        let derived = derived?;

        let receipts: Vec<Receipt> = batch
            .writes
            .iter()
            .zip(derived.iter())
            .map(|(write, revisions)| Receipt {
                write: write.clone(),
                revisions: revisions.clone(),
            })
            .collect();

        let segment = database.storage().new_segment()?;
        let revisions: Vec<Revision> = derived.into_iter().flatten().collect();
        segment.ingest(&revisions)?;
        database.storage().transfer(&segment)?;
        log::debug!("batch {} indexed as {}", batch, segment);

        // insert before seg0, fold receipts and purge the source batch
        // under one latch hold; a merged read never sees the batch's
        // writes in both places.
        {
            let mut guard = database.storage().lock().write();
            let at = match guard.last() {
                Some(tail) if tail.is_mutable() => guard.len() - 1,
                _ => guard.len(),
            };
            guard.insert(at, Arc::clone(&segment));
            database.apply_receipts(&receipts)?;
            source.purge_batch(batch)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "batch_test.rs"]
mod batch_test;
