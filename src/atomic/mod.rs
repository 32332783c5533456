//! Module implement two-phase atomic operations.
//!
//! An [AtomicOperation] stages mutations without touching the buffer.
//! `commit` acquires a lock on every staged fingerprint and re-checks
//! the staged expectations; application is deferred until `finish`,
//! which appends the staged writes and releases the locks. A commit
//! that loses a lock race or fails an expectation surfaces
//! [Outcome::Conflict] as a value, never as an error, and the caller
//! retries. Locks are held indefinitely between `commit` and `finish`;
//! distributed consistency is chosen over liveness.

use std::collections::BTreeSet;

use crate::{
    coll::ShardedHashSet,
    db::{Action, Identifier, Text, Value},
    store::{Store, NOW},
    Error, Result,
};

/// Result of a two-phase commit attempt.
#[derive(Debug)]
pub enum Outcome {
    /// Locks held, expectations hold; call `finish`.
    Ok,
    /// A concurrent operation holds a lock or an expectation failed;
    /// abort and retry.
    Conflict,
    /// Unrecoverable failure; the operation is aborted.
    Fatal(Error),
}

/// Process-wide table of fingerprints locked by in-flight atomic
/// operations.
pub struct LockTable {
    fingerprints: ShardedHashSet<Vec<u8>>,
}

impl Default for LockTable {
    fn default() -> LockTable {
        LockTable {
            fingerprints: ShardedHashSet::default(),
        }
    }
}

impl LockTable {
    /// Claim `fingerprint`; false when another operation holds it.
    pub fn try_acquire(&self, fingerprint: Vec<u8>) -> bool {
        self.fingerprints.insert(fingerprint)
    }

    pub fn release(&self, fingerprint: &[u8]) {
        self.fingerprints.remove(&fingerprint.to_vec());
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum State {
    Open,
    Committed,
    Finished,
    Aborted,
}

struct Staged {
    key: Text,
    value: Value,
    record: Identifier,
    action: Action,
}

/// A two-phase mutation against a [Store].
///
/// Stage mutations with `add`/`remove`, then `commit` and `finish`.
/// Dropping an operation releases whatever it still holds.
pub struct AtomicOperation<'a> {
    store: &'a Store,
    staged: Vec<Staged>,
    locked: Vec<Vec<u8>>,
    state: State,
}

impl<'a> Drop for AtomicOperation<'a> {
    fn drop(&mut self) {
        self.release_locks();
    }
}

impl<'a> AtomicOperation<'a> {
    pub fn new(store: &'a Store) -> AtomicOperation<'a> {
        AtomicOperation {
            store,
            staged: vec![],
            locked: vec![],
            state: State::Open,
        }
    }

    /// Stage asserting `(key, value)` on `record`. At commit the triple
    /// is expected absent; adding a present triple is a conflict, not a
    /// parity flip to absent.
    pub fn add(&mut self, key: Text, value: Value, record: Identifier) -> Result<()> {
        self.stage(key, value, record, Action::Add)
    }

    /// Stage retracting `(key, value)` from `record`. At commit the
    /// triple is expected present.
    pub fn remove(&mut self, key: Text, value: Value, record: Identifier) -> Result<()> {
        self.stage(key, value, record, Action::Remove)
    }

    fn stage(
        &mut self,
        key: Text,
        value: Value,
        record: Identifier,
        action: Action,
    ) -> Result<()> {
        if self.state != State::Open {
            err_at!(InvalidInput, msg: "stage in {:?}", self.state)?;
        }
        self.staged.push(Staged {
            key,
            value,
            record,
            action,
        });
        Ok(())
    }

    /// Phase one: acquire fingerprint locks and re-check expectations.
    /// Application is deferred to [AtomicOperation::finish].
    pub fn commit(&mut self) -> Outcome {
        if self.state != State::Open {
            return Outcome::Fatal(Error::InvalidInput(
                "atomic".to_string(),
                format!("commit in {:?}", self.state),
            ));
        }

        // deduplicated, so a retry never self-conflicts.
        let fingerprints: BTreeSet<Vec<u8>> = match self
            .staged
            .iter()
            .map(|s| {
                crate::db::Composite::of3(&s.record, &s.key, &s.value)
                    .map(|c| c.to_bytes())
            })
            .collect()
        {
            Ok(fingerprints) => fingerprints,
            Err(err) => {
                self.state = State::Aborted;
                return Outcome::Fatal(err);
            }
        };

        for fingerprint in fingerprints.into_iter() {
            if self.store.locks().try_acquire(fingerprint.clone()) {
                self.locked.push(fingerprint);
            } else {
                self.release_locks();
                self.state = State::Aborted;
                return Outcome::Conflict;
            }
        }

        for staged in self.staged.iter() {
            let expect_present = staged.action == Action::Remove;
            match self
                .store
                .verify(&staged.key, &staged.value, staged.record, NOW)
            {
                Ok(present) if present == expect_present => (),
                Ok(_) => {
                    self.release_locks();
                    self.state = State::Aborted;
                    return Outcome::Conflict;
                }
                Err(err) => {
                    self.release_locks();
                    self.state = State::Aborted;
                    return Outcome::Fatal(err);
                }
            }
        }

        self.state = State::Committed;
        Outcome::Ok
    }

    /// Phase two: append the staged writes to the buffer and release
    /// every lock. Return the assigned versions, in staging order.
    pub fn finish(&mut self) -> Result<Vec<u64>> {
        if self.state != State::Committed {
            err_at!(InvalidInput, msg: "finish in {:?}", self.state)?;
        }

        let mut versions = vec![];
        for staged in self.staged.iter() {
            let write = self.store.buffer().insert(
                staged.key.clone(),
                staged.value.clone(),
                staged.record,
                staged.action,
            )?;
            versions.push(write.version);
        }

        self.release_locks();
        self.state = State::Finished;
        Ok(versions)
    }

    /// Walk away without applying; releases every lock.
    pub fn abort(&mut self) {
        self.release_locks();
        self.state = State::Aborted;
    }

    fn release_locks(&mut self) {
        for fingerprint in self.locked.drain(..) {
            self.store.locks().release(&fingerprint);
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
