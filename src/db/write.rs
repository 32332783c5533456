use std::{cmp, convert::TryFrom, fmt, result};

use crate::{
    check_remaining,
    db::{Byteable, Composite, Identifier, Position, Revision, Text, Value},
    util, Error, Result,
};

/// Cap on corpus positions derived from a single text value.
pub const MAX_TOKENS: usize = 512;

/// Whether a write asserts or retracts its triple.
///
/// The action never reaches a segment; it participates only in the
/// buffer's page format and in the parity fold on the read path.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Action {
    Add,
    Remove,
}

impl Action {
    pub fn to_byte(&self) -> u8 {
        match self {
            Action::Add => 1,
            Action::Remove => 0,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Action> {
        match byte {
            1 => Ok(Action::Add),
            0 => Ok(Action::Remove),
            byte => err_at!(DecodeFail, msg: "invalid action byte {}", byte),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self {
            Action::Add => write!(f, "ADD"),
            Action::Remove => write!(f, "REMOVE"),
        }
    }
}

/// A single mutation queued in the buffer.
///
/// Carries the `(key, value, record)` triple, the version assigned at
/// insert time and the [Action]. From one write the database derives one
/// Table revision, one Index revision and, for searchable keys holding
/// text, up to [MAX_TOKENS] Corpus revisions.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Write {
    pub key: Text,
    pub value: Value,
    pub record: Identifier,
    pub version: u64,
    pub action: Action,
}

impl fmt::Display for Write {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(
            f,
            "write<{} {}:{}={} v:{}>",
            self.action, self.record, self.key, self.value, self.version
        )
    }
}

impl PartialOrd for Write {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Write {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.version.cmp(&other.version)
    }
}

impl Write {
    pub fn new(
        key: Text,
        value: Value,
        record: Identifier,
        version: u64,
        action: Action,
    ) -> Write {
        Write {
            key,
            value,
            record,
            version,
            action,
        }
    }

    /// Fingerprint of the `(record, key, value)` triple, the unit over
    /// which parity and atomic locking happen.
    pub fn fingerprint(&self) -> Result<Composite> {
        Composite::of3(&self.record, &self.key, &self.value)
    }

    /// Derive the revisions this write contributes to a segment. One
    /// Table and one Index revision always; Corpus revisions when
    /// `searchable` and the value is text.
    pub fn to_revisions(&self, searchable: bool) -> Result<Vec<Revision>> {
        let mut revisions = vec![
            Revision::Table {
                record: self.record,
                key: self.key.clone(),
                value: self.value.clone(),
                version: self.version,
            },
            Revision::Index {
                key: self.key.clone(),
                value: self.value.clone(),
                record: self.record,
                version: self.version,
            },
        ];

        if searchable {
            if let Value::Str(text) = &self.value {
                for (index, word) in tokenize(text.as_str()).into_iter().enumerate() {
                    let index = err_at!(FailConvert, u32::try_from(index))?;
                    revisions.push(Revision::Corpus {
                        key: self.key.clone(),
                        word: Text::from(word),
                        position: Position::new(self.record, index),
                        version: self.version,
                    });
                }
            }
        }

        Ok(revisions)
    }

    /// Encode in the buffer page format:
    /// `size:4 || action:1 || version:8 || key_len:4 || key_bytes ||
    /// value_type:1 || value_len:4 || value_bytes || record:8`.
    /// `size` counts the bytes that follow it.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<usize> {
        let off = buf.len();
        buf.extend_from_slice(&0_u32.to_le_bytes());

        buf.push(self.action.to_byte());
        buf.extend_from_slice(&self.version.to_le_bytes());

        let key_len = err_at!(FailConvert, u32::try_from(self.key.byte_count()))?;
        buf.extend_from_slice(&key_len.to_le_bytes());
        buf.extend_from_slice(self.key.as_bytes());

        let mut value_bytes = vec![];
        self.value.encode(&mut value_bytes)?;
        buf.push(value_bytes[0]); // type tag
        let value_len = err_at!(FailConvert, u32::try_from(value_bytes.len() - 1))?;
        buf.extend_from_slice(&value_len.to_le_bytes());
        buf.extend_from_slice(&value_bytes[1..]);

        buf.extend_from_slice(&self.record.0.to_le_bytes());

        let n = buf.len() - off - 4;
        let size = err_at!(FailConvert, u32::try_from(n), "write size")?;
        buf[off..off + 4].copy_from_slice(&size.to_le_bytes());
        Ok(n + 4)
    }

    /// Decode a write written by [Write::encode]. Return the write and
    /// the number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Write, usize)> {
        let size = util::decode_u32(buf, "write size")?;
        let size = err_at!(FailConvert, usize::try_from(size))?;
        check_remaining!(buf, 4 + size, "write record")?;
        let body = &buf[4..4 + size];

        check_remaining!(body, 13, "write header")?;
        let action = Action::from_byte(body[0])?;
        let version = util::decode_u64(&body[1..], "write version")?;
        let key_len = util::decode_u32(&body[9..], "write key_len")?;
        let key_len = err_at!(FailConvert, usize::try_from(key_len))?;

        let mut off = 13;
        check_remaining!(body, off + key_len, "write key")?;
        let key = Text::from_utf8(body[off..off + key_len].to_vec())?;
        off += key_len;

        check_remaining!(body, off + 5, "write value header")?;
        let value_type = body[off];
        let value_len = util::decode_u32(&body[off + 1..], "write value_len")?;
        let value_len = err_at!(FailConvert, usize::try_from(value_len))?;
        off += 5;

        check_remaining!(body, off + value_len, "write value")?;
        let value = {
            let mut value_bytes = Vec::with_capacity(1 + value_len);
            value_bytes.push(value_type);
            value_bytes.extend_from_slice(&body[off..off + value_len]);
            let (value, _) = Value::decode(&value_bytes)?;
            value
        };
        off += value_len;

        check_remaining!(body, off + 8, "write record id")?;
        let record = Identifier(util::decode_u64(&body[off..], "write record")?);
        off += 8;

        if off != size {
            err_at!(DecodeFail, msg: "write trailing bytes {}/{}", off, size)?;
        }

        let write = Write {
            key,
            value,
            record,
            version,
            action,
        };
        Ok((write, 4 + size))
    }
}

/// Split a text value into its corpus words: lowercased runs of
/// alphanumeric characters, capped at [MAX_TOKENS].
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .take(MAX_TOKENS)
        .map(|word| word.to_lowercase())
        .collect()
}

#[cfg(test)]
#[path = "write_test.rs"]
mod write_test;
