//! Plinth is the storage core of a versioned, document-style record
//! database. Every mutation is recorded as a per-field revision carrying a
//! microsecond-resolution version, staged durably in a write-ahead
//! [Buffer][buffer::Buffer], transported in the background into an
//! immutable, segment-based on-disk [Database][store::Database], and
//! rewritten over time by a [Compactor][compact::Compactor].
//!
//! Data is modelled as `(key, value, record)` triples. A triple is present
//! when the count of its equal revisions is odd and absent when even, so
//! removal never rewrites history; it appends. Reads fold this parity
//! across the buffer and every segment.
//!
//! The crate is organised bottom-up:
//!
//! * [db] - byte primitives with canonical encodings, revisions, writes.
//! * [bloom] - append-only logging bloom filter.
//! * [seg] - immutable segments, manifests and segment storage.
//! * [buffer] - page-based write-ahead staging.
//! * [store] - read-side aggregation, search and navigation.
//! * [transport] - background movers from buffer to database.
//! * [compact] - segment rewriting.
//! * [atomic] - two-phase atomic operations.
//!
//! Refer to [store::Store] for the assembled engine.

use std::{error, fmt, result};

/// Short form to compose Error values.
///
/// Here are few possible ways:
///
/// ```ignore
/// use crate::Error;
/// err_at!(DecodeFail, msg: "invalid tag {}", tag)
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, fs::read(file_path))
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, fs::read(file_path), "reading {:?}", file_path)
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err(Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err(Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err(Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

pub mod atomic;
pub mod bloom;
pub mod buffer;
pub mod clock;
pub mod coll;
pub mod compact;
mod config;
pub mod db;
pub mod hash;
pub mod seg;
pub mod store;
pub mod transport;
pub mod util;

pub use config::{Config, Durability};

/// Error variants that are returned by this package's API.
///
/// Each variant carries a prefix, typically identifying the error
/// location, followed by a cause description.
#[derive(Clone)]
pub enum Error {
    Fatal(String, String),
    FailConvert(String, String),
    IOError(String, String),
    DecodeFail(String, String),
    InvalidFile(String, String),
    InvalidInput(String, String),
    IPCFail(String, String),
    ThreadFail(String, String),
    Corrupted(String, String),
    DiskFull(String, String),
    KeyNotFound(String, String),
    TimeFail(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            Fatal(p, m) => write!(f, "{} Fatal: {}", p, m),
            FailConvert(p, m) => write!(f, "{} FailConvert: {}", p, m),
            IOError(p, m) => write!(f, "{} IOError: {}", p, m),
            DecodeFail(p, m) => write!(f, "{} DecodeFail: {}", p, m),
            InvalidFile(p, m) => write!(f, "{} InvalidFile: {}", p, m),
            InvalidInput(p, m) => write!(f, "{} InvalidInput: {}", p, m),
            IPCFail(p, m) => write!(f, "{} IPCFail: {}", p, m),
            ThreadFail(p, m) => write!(f, "{} ThreadFail: {}", p, m),
            Corrupted(p, m) => write!(f, "{} Corrupted: {}", p, m),
            DiskFull(p, m) => write!(f, "{} DiskFull: {}", p, m),
            KeyNotFound(p, m) => write!(f, "{} KeyNotFound: {}", p, m),
            TimeFail(p, m) => write!(f, "{} TimeFail: {}", p, m),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl error::Error for Error {}

/// Type alias for Result return type, used by this package.
pub type Result<T> = result::Result<T, Error>;
