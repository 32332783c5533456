//! Engine configuration.

use serde::Deserialize;

use std::{convert::TryFrom, ffi, fs, path};

use crate::{buffer, Error, Result};

/// Durability mode for buffer writes.
///
/// * `SyncEach` fsync the page file after every write.
/// * `Batched` fsync once per flushed batch of writes.
/// * `Os` leave it to the operating system's page cache.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    SyncEach,
    Batched,
    Os,
}

impl Default for Durability {
    fn default() -> Durability {
        Durability::Batched
    }
}

/// Configuration for the assembled engine, refer [crate::store::Store].
///
/// Can be built programmatically via the `set_*` methods or loaded from a
/// TOML file via [Config::from_file].
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Environment directory; the buffer and database layouts live under
    /// `<dir>/buffer` and `<dir>/database`.
    pub dir: String,
    /// Durability mode for buffer writes. Default: `batched`.
    #[serde(default)]
    pub durability: Durability,
    /// Buffer page size in bytes, beyond which the page is turned.
    /// Default: [buffer::PAGE_SIZE].
    #[serde(default = "Config::default_page_size")]
    pub page_size: usize,
    /// Heap budget for the read-side lookup caches, in bytes.
    /// Default: 64MB.
    #[serde(default = "Config::default_cache_budget")]
    pub cache_budget: usize,
    /// Keys whose text values feed the full-text corpus. `None` marks
    /// every key searchable.
    #[serde(default)]
    pub searchable: Option<Vec<String>>,
    /// Compaction strategy, `"noop"` or `"mergesort"`. Default: `"noop"`.
    #[serde(default = "Config::default_compactor")]
    pub compactor: String,
}

impl Config {
    fn default_page_size() -> usize {
        buffer::PAGE_SIZE
    }

    fn default_cache_budget() -> usize {
        64 * 1024 * 1024
    }

    fn default_compactor() -> String {
        "noop".to_string()
    }

    /// Create a new configuration rooted at `dir`, with defaults for
    /// everything else.
    pub fn new(dir: &ffi::OsStr) -> Config {
        Config {
            dir: dir.to_string_lossy().to_string(),
            durability: Durability::default(),
            page_size: Self::default_page_size(),
            cache_budget: Self::default_cache_budget(),
            searchable: None,
            compactor: Self::default_compactor(),
        }
    }

    /// Load configuration from `loc`, a TOML file.
    pub fn from_file(loc: &ffi::OsStr) -> Result<Config> {
        let data = err_at!(IOError, fs::read(loc), "config file {:?}", loc)?;
        let text = err_at!(FailConvert, std::str::from_utf8(&data))?;
        let config: Config = err_at!(InvalidFile, toml::from_str(text))?;
        config.validate()
    }

    pub fn set_durability(mut self, durability: Durability) -> Config {
        self.durability = durability;
        self
    }

    pub fn set_page_size(mut self, page_size: usize) -> Config {
        self.page_size = page_size;
        self
    }

    pub fn set_cache_budget(mut self, cache_budget: usize) -> Config {
        self.cache_budget = cache_budget;
        self
    }

    pub fn set_searchable(mut self, keys: Vec<String>) -> Config {
        self.searchable = Some(keys);
        self
    }

    pub fn set_compactor(mut self, compactor: &str) -> Config {
        self.compactor = compactor.to_string();
        self
    }

    fn validate(self) -> Result<Config> {
        if self.page_size < 1024 {
            err_at!(InvalidInput, msg: "page_size {} below 1024", self.page_size)?;
        }
        match self.compactor.as_str() {
            "noop" | "mergesort" => Ok(self),
            name => err_at!(InvalidInput, msg: "unknown compactor {:?}", name),
        }
    }
}

impl Config {
    /// Directory holding buffer pages.
    pub fn to_buffer_dir(&self) -> ffi::OsString {
        let loc: path::PathBuf = [self.dir.as_str(), "buffer"].iter().collect();
        loc.into_os_string()
    }

    /// Directory holding sealed segment files.
    pub fn to_segments_dir(&self) -> ffi::OsString {
        let loc: path::PathBuf = [self.dir.as_str(), "database", "segments"].iter().collect();
        loc.into_os_string()
    }

    /// Directory holding bloom filter files.
    pub fn to_bloom_dir(&self) -> ffi::OsString {
        let loc: path::PathBuf = [self.dir.as_str(), "database", "bloom"].iter().collect();
        loc.into_os_string()
    }

    /// Whether `key`'s text values are tokenised into the corpus.
    pub fn is_searchable(&self, key: &str) -> bool {
        match &self.searchable {
            Some(keys) => keys.iter().any(|k| k == key),
            None => true,
        }
    }
}

impl TryFrom<&str> for Config {
    type Error = Error;

    fn try_from(text: &str) -> Result<Config> {
        let config: Config = err_at!(InvalidFile, toml::from_str(text))?;
        config.validate()
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
