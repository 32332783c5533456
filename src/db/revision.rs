use std::{cmp, convert::TryFrom, fmt, result};

use crate::{
    check_remaining,
    db::{
        decode_framed, encode_framed, Byteable, Composite, Identifier, Position, Text,
        Value,
    },
    hash, util, Error, Result,
};

/// The three revision streams of a segment. Every revision belongs to
/// exactly one stream, determined by its `(locator, key, value)` typing.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Stream {
    Table,
    Index,
    Corpus,
}

impl Stream {
    pub const ALL: [Stream; 3] = [Stream::Table, Stream::Index, Stream::Corpus];
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self {
            Stream::Table => write!(f, "table"),
            Stream::Index => write!(f, "index"),
            Stream::Corpus => write!(f, "corpus"),
        }
    }
}

/// A single versioned `(locator, key, value)` tuple.
///
/// Three concrete typings exist:
///
/// * `Table` maps record -> key -> value, the primary orientation.
/// * `Index` maps key -> value -> record, the inverted orientation.
/// * `Corpus` maps key -> word -> position, one per word position of a
///   tokenised text value.
///
/// The ADD/REMOVE action is deliberately not part of a revision; logical
/// presence is the parity of equal revisions at the same locator, key
/// and value. An even count nets absent, odd nets present.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Revision {
    Table {
        record: Identifier,
        key: Text,
        value: Value,
        version: u64,
    },
    Index {
        key: Text,
        value: Value,
        record: Identifier,
        version: u64,
    },
    Corpus {
        key: Text,
        word: Text,
        position: Position,
        version: u64,
    },
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self {
            Revision::Table {
                record,
                key,
                value,
                version,
            } => write!(f, "table<{}:{}={} v:{}>", record, key, value, version),
            Revision::Index {
                key,
                value,
                record,
                version,
            } => write!(f, "index<{}:{}->{} v:{}>", key, value, record, version),
            Revision::Corpus {
                key,
                word,
                position,
                version,
            } => write!(f, "corpus<{}:{}@{} v:{}>", key, word, position, version),
        }
    }
}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Revision {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        use Revision::{Corpus, Index, Table};

        match (self, other) {
            (
                Table {
                    record: r1,
                    key: k1,
                    value: v1,
                    version: n1,
                },
                Table {
                    record: r2,
                    key: k2,
                    value: v2,
                    version: n2,
                },
            ) => r1
                .cmp(r2)
                .then_with(|| k1.cmp(k2))
                .then_with(|| v1.cmp(v2))
                .then_with(|| n1.cmp(n2)),
            (
                Index {
                    key: k1,
                    value: v1,
                    record: r1,
                    version: n1,
                },
                Index {
                    key: k2,
                    value: v2,
                    record: r2,
                    version: n2,
                },
            ) => k1
                .cmp(k2)
                .then_with(|| v1.cmp(v2))
                .then_with(|| r1.cmp(r2))
                .then_with(|| n1.cmp(n2)),
            (
                Corpus {
                    key: k1,
                    word: w1,
                    position: p1,
                    version: n1,
                },
                Corpus {
                    key: k2,
                    word: w2,
                    position: p2,
                    version: n2,
                },
            ) => k1
                .cmp(k2)
                .then_with(|| w1.cmp(w2))
                .then_with(|| p1.cmp(p2))
                .then_with(|| n1.cmp(n2)),
            (a, b) => a.to_stream().cmp(&b.to_stream()),
        }
    }
}

impl Revision {
    pub fn to_stream(&self) -> Stream {
        match self {
            Revision::Table { .. } => Stream::Table,
            Revision::Index { .. } => Stream::Index,
            Revision::Corpus { .. } => Stream::Corpus,
        }
    }

    pub fn to_version(&self) -> u64 {
        match self {
            Revision::Table { version, .. } => *version,
            Revision::Index { version, .. } => *version,
            Revision::Corpus { version, .. } => *version,
        }
    }

    /// True when `other` carries the same locator, key and value,
    /// regardless of version. This is the unit over which parity is
    /// computed.
    pub fn same_triple(&self, other: &Revision) -> bool {
        use Revision::{Corpus, Index, Table};

        match (self, other) {
            (
                Table {
                    record: r1,
                    key: k1,
                    value: v1,
                    ..
                },
                Table {
                    record: r2,
                    key: k2,
                    value: v2,
                    ..
                },
            ) => r1 == r2 && k1 == k2 && v1 == v2,
            (
                Index {
                    key: k1,
                    value: v1,
                    record: r1,
                    ..
                },
                Index {
                    key: k2,
                    value: v2,
                    record: r2,
                    ..
                },
            ) => k1 == k2 && v1 == v2 && r1 == r2,
            (
                Corpus {
                    key: k1,
                    word: w1,
                    position: p1,
                    ..
                },
                Corpus {
                    key: k2,
                    word: w2,
                    position: p2,
                    ..
                },
            ) => k1 == k2 && w1 == w2 && p1 == p2,
            (_, _) => false,
        }
    }

    /// Fingerprint of the full `(locator, key, value)` triple.
    pub fn fingerprint(&self) -> Result<Composite> {
        match self {
            Revision::Table {
                record, key, value, ..
            } => Composite::of3(record, key, value),
            Revision::Index {
                key, value, record, ..
            } => Composite::of3(key, value, record),
            Revision::Corpus {
                key, word, position, ..
            } => Composite::of3(key, word, position),
        }
    }

    /// Fingerprint of the `(locator, key)` pair.
    pub fn locator_key_fingerprint(&self) -> Result<Composite> {
        match self {
            Revision::Table { record, key, .. } => Composite::of2(record, key),
            Revision::Index { key, value, .. } => Composite::of2(key, value),
            Revision::Corpus { key, word, .. } => Composite::of2(key, word),
        }
    }

    /// Fingerprint of the locator alone.
    pub fn locator_fingerprint(&self) -> Result<Composite> {
        match self {
            Revision::Table { record, .. } => Composite::of(record),
            Revision::Index { key, .. } => Composite::of(key),
            Revision::Corpus { key, .. } => Composite::of(key),
        }
    }

    /// Murmur digest of the locator's canonical bytes; the manifest's
    /// fixed-size search key.
    pub fn locator_digest(&self) -> Result<u128> {
        let mut buf = vec![];
        match self {
            Revision::Table { record, .. } => record.encode(&mut buf)?,
            Revision::Index { key, .. } => key.encode(&mut buf)?,
            Revision::Corpus { key, .. } => key.encode(&mut buf)?,
        };
        hash::murmur3_128(&buf)
    }
}

impl Revision {
    /// Encode as a stream record:
    /// `size:4 || version:8 || locator || key || value`, where variable
    /// size components carry their own `size:4` prefix. `size` counts the
    /// bytes that follow it.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<usize> {
        let off = buf.len();
        buf.extend_from_slice(&0_u32.to_le_bytes());
        buf.extend_from_slice(&self.to_version().to_le_bytes());

        let mut n = 8;
        n += match self {
            Revision::Table {
                record, key, value, ..
            } => {
                encode_framed(record, buf)?
                    + encode_framed(key, buf)?
                    + encode_framed(value, buf)?
            }
            Revision::Index {
                key, value, record, ..
            } => {
                encode_framed(key, buf)?
                    + encode_framed(value, buf)?
                    + encode_framed(record, buf)?
            }
            Revision::Corpus {
                key, word, position, ..
            } => {
                encode_framed(key, buf)?
                    + encode_framed(word, buf)?
                    + encode_framed(position, buf)?
            }
        };

        let size = err_at!(FailConvert, u32::try_from(n), "revision size")?;
        buf[off..off + 4].copy_from_slice(&size.to_le_bytes());
        Ok(n + 4)
    }

    /// Decode a stream record written by [Revision::encode]. The stream
    /// determines the `(locator, key, value)` typing.
    pub fn decode(stream: Stream, buf: &[u8]) -> Result<(Revision, usize)> {
        let size = util::decode_u32(buf, "revision size")?;
        let size = err_at!(FailConvert, usize::try_from(size))?;
        check_remaining!(buf, 4 + size, "revision record")?;

        let body = &buf[4..4 + size];
        let version = util::decode_u64(body, "revision version")?;
        let mut off = 8;

        let revision = match stream {
            Stream::Table => {
                let (record, n) = decode_framed::<Identifier>(&body[off..])?;
                off += n;
                let (key, n) = decode_framed::<Text>(&body[off..])?;
                off += n;
                let (value, n) = decode_framed::<Value>(&body[off..])?;
                off += n;
                Revision::Table {
                    record,
                    key,
                    value,
                    version,
                }
            }
            Stream::Index => {
                let (key, n) = decode_framed::<Text>(&body[off..])?;
                off += n;
                let (value, n) = decode_framed::<Value>(&body[off..])?;
                off += n;
                let (record, n) = decode_framed::<Identifier>(&body[off..])?;
                off += n;
                Revision::Index {
                    key,
                    value,
                    record,
                    version,
                }
            }
            Stream::Corpus => {
                let (key, n) = decode_framed::<Text>(&body[off..])?;
                off += n;
                let (word, n) = decode_framed::<Text>(&body[off..])?;
                off += n;
                let (position, n) = decode_framed::<Position>(&body[off..])?;
                off += n;
                Revision::Corpus {
                    key,
                    word,
                    position,
                    version,
                }
            }
        };

        if off != size {
            err_at!(DecodeFail, msg: "revision trailing bytes {}/{}", off, size)?;
        }
        Ok((revision, 4 + size))
    }
}

#[cfg(test)]
#[path = "revision_test.rs"]
mod revision_test;
