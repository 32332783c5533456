//! Module implement the background movers from buffer to database.
//!
//! The [StreamingTransporter] drains continuously with an adaptive
//! cadence and a hung-detector that restarts a stalled loop. The
//! [BatchTransporter] pulls explicit batches from a
//! [BatchTransportable][crate::buffer::BatchTransportable] store,
//! indexes them in parallel and merges the resulting segments in
//! ordinal order.

mod batch;
mod stream;

pub use batch::BatchTransporter;
pub use stream::{
    StreamingTransporter, HUNG_FREQ_MS, HUNG_THRESHOLD_MS, INACTIVITY_THRESHOLD_MS,
    MAX_SLEEP_MS, MIN_SLEEP_MS,
};
