//! Module implement the concurrent collections backing the indexes.
//!
//! * [BridgeSortMap] - sorted view over an already-sorted run plus a
//!   bridge tree for late arrivals; one per buffer page.
//! * [ShardedHashSet] - a set partitioned into stamped-lock shards.
//! * [IncrementalSortMap] - a concurrent map that defers sorting until
//!   the first navigable operation.

mod bridge;
mod incr;
mod shard;

pub use bridge::BridgeSortMap;
pub use incr::IncrementalSortMap;
pub use shard::ShardedHashSet;

/// Default shard count for the sharded collections.
pub const NUM_SHARDS: usize = 16;
