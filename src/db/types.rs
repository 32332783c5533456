use arbitrary::Arbitrary;

use std::{
    cmp,
    convert::TryInto,
    fmt::{self, Display},
    result,
};

use crate::{
    check_remaining,
    db::{Byteable, Footprint},
    Error, Result,
};

/// An unsigned 64-bit record id. Sorts by unsigned order, encodes as a
/// fixed 8-byte little-endian quantity.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Arbitrary)]
pub struct Identifier(pub u64);

impl Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "@{}", self.0)
    }
}

impl From<u64> for Identifier {
    fn from(id: u64) -> Identifier {
        Identifier(id)
    }
}

impl From<Identifier> for u64 {
    fn from(id: Identifier) -> u64 {
        id.0
    }
}

impl Footprint for Identifier {
    fn footprint(&self) -> Result<isize> {
        Ok(8)
    }
}

impl Byteable for Identifier {
    const FIXED_SIZE: Option<usize> = Some(8);

    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize> {
        buf.extend_from_slice(&self.0.to_le_bytes());
        Ok(8)
    }

    fn decode(buf: &[u8]) -> Result<(Identifier, usize)> {
        check_remaining!(buf, 8, "identifier")?;
        let bytes: [u8; 8] = buf[..8].try_into().unwrap();
        Ok((Identifier(u64::from_le_bytes(bytes)), 8))
    }
}

/// UTF-8 character sequence, sortable by codepoint order.
///
/// The two construction paths, from raw bytes and from a string view,
/// yield equal values with equal hashes and equal encodings. Canonical
/// length is the byte count.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct Text(String);

impl Text {
    /// Construct from a string view.
    pub fn from_str(s: &str) -> Text {
        Text(s.to_string())
    }

    /// Construct from raw bytes, which must be valid UTF-8.
    pub fn from_utf8(bytes: Vec<u8>) -> Result<Text> {
        Ok(Text(err_at!(FailConvert, String::from_utf8(bytes))?))
    }

    /// Canonical length, in bytes.
    pub fn byte_count(&self) -> usize {
        self.0.len()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Text {
    fn from(s: String) -> Text {
        Text(s)
    }
}

impl From<&str> for Text {
    fn from(s: &str) -> Text {
        Text::from_str(s)
    }
}

impl PartialOrd for Text {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Text {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        // UTF-8 byte order coincides with codepoint order.
        self.0.as_bytes().cmp(other.0.as_bytes())
    }
}

impl<'a> Arbitrary<'a> for Text {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let s: String = u.arbitrary()?;
        Ok(Text(s))
    }
}

impl Footprint for Text {
    fn footprint(&self) -> Result<isize> {
        use std::convert::TryFrom;

        let size = std::mem::size_of::<Text>() + self.0.len();
        err_at!(FailConvert, isize::try_from(size))
    }
}

impl Byteable for Text {
    const FIXED_SIZE: Option<usize> = None;

    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize> {
        buf.extend_from_slice(self.0.as_bytes());
        Ok(self.0.len())
    }

    fn decode(buf: &[u8]) -> Result<(Text, usize)> {
        let text = Text::from_utf8(buf.to_vec())?;
        Ok((text, buf.len()))
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
