use std::{convert::TryFrom, ffi, fmt, path, result};

use crate::{Error, Result};

/// A segment file is uniquely locatable given the database directory and
/// the segment's name. `format!("{}.seg", name)`
#[derive(Clone)]
pub struct SegmentFileName(pub ffi::OsString);

impl From<String> for SegmentFileName {
    fn from(name: String) -> SegmentFileName {
        let file_name = format!("{}.seg", name);
        SegmentFileName(AsRef::<ffi::OsStr>::as_ref(&file_name).to_os_string())
    }
}

impl TryFrom<SegmentFileName> for String {
    type Error = Error;

    fn try_from(fname: SegmentFileName) -> Result<String> {
        let ffpp = path::Path::new(&fname.0);
        let fname = || -> Option<&str> {
            let fname = ffpp.file_name()?;
            if fname.to_str()?.ends_with(".seg") {
                path::Path::new(fname).file_stem()?.to_str()
            } else {
                None
            }
        }();

        match fname {
            Some(fname) => Ok(fname.to_string()),
            None => err_at!(InvalidFile, msg: "{:?}", ffpp),
        }
    }
}

impl From<SegmentFileName> for ffi::OsString {
    fn from(name: SegmentFileName) -> ffi::OsString {
        name.0
    }
}

impl fmt::Display for SegmentFileName {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self.0.to_str() {
            Some(s) => write!(f, "{}", s),
            None => write!(f, "{:?}", self.0),
        }
    }
}

/// A bloom filter file is uniquely locatable given the bloom directory
/// and the owning segment's name. `format!("{}.blm", name)`
#[derive(Clone)]
pub struct BloomFileName(pub ffi::OsString);

impl From<String> for BloomFileName {
    fn from(name: String) -> BloomFileName {
        let file_name = format!("{}.blm", name);
        BloomFileName(AsRef::<ffi::OsStr>::as_ref(&file_name).to_os_string())
    }
}

impl TryFrom<BloomFileName> for String {
    type Error = Error;

    fn try_from(fname: BloomFileName) -> Result<String> {
        let ffpp = path::Path::new(&fname.0);
        let fname = || -> Option<&str> {
            let fname = ffpp.file_name()?;
            if fname.to_str()?.ends_with(".blm") {
                path::Path::new(fname).file_stem()?.to_str()
            } else {
                None
            }
        }();

        match fname {
            Some(fname) => Ok(fname.to_string()),
            None => err_at!(InvalidFile, msg: "{:?}", ffpp),
        }
    }
}

impl From<BloomFileName> for ffi::OsString {
    fn from(name: BloomFileName) -> ffi::OsString {
        name.0
    }
}

impl fmt::Display for BloomFileName {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self.0.to_str() {
            Some(s) => write!(f, "{}", s),
            None => write!(f, "{:?}", self.0),
        }
    }
}

/// Compose the path of segment `name` under `dir`.
pub fn to_segment_location(dir: &ffi::OsStr, name: &str) -> ffi::OsString {
    let loc: path::PathBuf = [
        dir.to_os_string(),
        SegmentFileName::from(name.to_string()).into(),
    ]
    .iter()
    .collect();
    loc.into_os_string()
}

/// Compose the path of segment `name`'s bloom filter under `dir`.
pub fn to_bloom_location(dir: &ffi::OsStr, name: &str) -> ffi::OsString {
    let loc: path::PathBuf = [
        dir.to_os_string(),
        BloomFileName::from(name.to_string()).into(),
    ]
    .iter()
    .collect();
    loc.into_os_string()
}

#[cfg(test)]
#[path = "files_test.rs"]
mod files_test;
