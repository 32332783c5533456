//! Module implement the version clock.
//!
//! Every write carries a microsecond-resolution version obtained from a
//! [TimeSource]. The local source is monotonic within the process even
//! when the wall clock steps backward. The hybrid source delegates to a
//! cluster collaborator so that versions agree across nodes.

use std::{
    convert::TryFrom,
    sync::atomic::{AtomicU64, Ordering::SeqCst},
    sync::Arc,
    time,
};

use crate::{Error, Result};

/// External collaborator supplying distributed time and replicated
/// logging. Consensus itself is outside this package; implementations
/// typically wrap a raft or paxos client.
pub trait Cluster: Send + Sync {
    /// Return a hybrid-logical timestamp in microseconds since UNIX epoch.
    fn hybrid_clock(&self) -> u64;

    /// Append opaque bytes to the replicated log.
    fn append_log(&self, bytes: &[u8]) -> Result<()>;
}

/// Monotonic microsecond clock, local or hybrid-distributed.
///
/// Created at engine boot and passed through constructors; there is no
/// process-wide singleton.
#[derive(Clone)]
pub enum TimeSource {
    Local {
        last: Arc<AtomicU64>,
    },
    Hybrid {
        cluster: Arc<dyn Cluster>,
        last: Arc<AtomicU64>,
    },
}

impl TimeSource {
    pub fn new_local() -> TimeSource {
        TimeSource::Local {
            last: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn new_hybrid(cluster: Arc<dyn Cluster>) -> TimeSource {
        TimeSource::Hybrid {
            cluster,
            last: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Return the next version. Consecutive calls return strictly
    /// increasing values.
    pub fn epoch_micros(&self) -> Result<u64> {
        let (last, now) = match self {
            TimeSource::Local { last } => {
                let elapsed = err_at!(
                    TimeFail,
                    time::UNIX_EPOCH.elapsed(),
                    "clock before unix epoch"
                )?;
                (last, err_at!(FailConvert, u64::try_from(elapsed.as_micros()))?)
            }
            TimeSource::Hybrid { cluster, last } => (last, cluster.hybrid_clock()),
        };

        // monotonic: never step backward, never repeat.
        let mut prev = last.load(SeqCst);
        loop {
            let next = now.max(prev + 1);
            match last.compare_exchange_weak(prev, next, SeqCst, SeqCst) {
                Ok(_) => break Ok(next),
                Err(val) => prev = val,
            }
        }
    }
}
