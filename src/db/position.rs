use arbitrary::Arbitrary;

use std::{
    cmp,
    convert::TryInto,
    fmt::{self, Display},
    result,
};

use crate::{
    check_remaining,
    db::{Byteable, Footprint, Identifier},
    Error, Result,
};

/// A word position within a record's tokenised text value.
///
/// Pair of `(record, index)` with a fixed encoding
/// `identifier:8 || index:4`; sorts by identifier then index.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Arbitrary)]
pub struct Position {
    pub record: Identifier,
    pub index: u32,
}

impl Position {
    pub fn new(record: Identifier, index: u32) -> Position {
        Position { record, index }
    }

    /// Position of the word immediately after this one, None at u32::MAX.
    pub fn successor(&self) -> Option<Position> {
        let index = self.index.checked_add(1)?;
        Some(Position {
            record: self.record,
            index,
        })
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}#{}", self.record, self.index)
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.record
            .cmp(&other.record)
            .then_with(|| self.index.cmp(&other.index))
    }
}

impl Footprint for Position {
    fn footprint(&self) -> Result<isize> {
        Ok(12)
    }
}

impl Byteable for Position {
    const FIXED_SIZE: Option<usize> = Some(12);

    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize> {
        self.record.encode(buf)?;
        buf.extend_from_slice(&self.index.to_le_bytes());
        Ok(12)
    }

    fn decode(buf: &[u8]) -> Result<(Position, usize)> {
        check_remaining!(buf, 12, "position")?;
        let (record, _) = Identifier::decode(&buf[..8])?;
        let bytes: [u8; 4] = buf[8..12].try_into().unwrap();
        let index = u32::from_le_bytes(bytes);
        Ok((Position { record, index }, 12))
    }
}

#[cfg(test)]
#[path = "position_test.rs"]
mod position_test;
