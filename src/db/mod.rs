//! Traits and types for the record model, required by rest of the
//! plinth-modules.
//!
//! Everything that reaches disk passes through the [Byteable] trait,
//! which fixes a canonical little-endian byte layout per type. Two values
//! are equal exactly when their canonical encodings are equal; every
//! fingerprint, bloom entry and manifest record is derived from these
//! bytes, so the layouts must never change.

use crate::{check_remaining, util, Error, Result};

mod composite;
mod position;
mod revision;
mod types;
mod value;
mod write;

pub use composite::{Composite, CompositeBuilder, COMPOSITE_MAX_SIZE};
pub use position::Position;
pub use revision::{Revision, Stream};
pub use types::{Identifier, Text};
pub use value::Value;
pub use write::{tokenize, Action, Write, MAX_TOKENS};

/// Trait for values with a canonical byte layout.
///
/// Fixed-size types report their width via `FIXED_SIZE` and are stored
/// bare; variable-size types report `None` and are stored behind a
/// `size:4` prefix by their containers.
pub trait Byteable: Clone + Ord {
    /// Encoded width for fixed-size types, None otherwise.
    const FIXED_SIZE: Option<usize>;

    /// Append this value's canonical encoding to `buf`, return the
    /// number of bytes appended.
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize>;

    /// Decode a value from `buf`. Fixed-size types consume exactly
    /// `FIXED_SIZE` bytes; variable-size types consume the entire slice.
    /// Return the value and the number of bytes consumed.
    fn decode(buf: &[u8]) -> Result<(Self, usize)>;
}

/// Trait to compute the memory foot-print for cache-resident types.
///
/// **Note: This can be an approximate measure.**
pub trait Footprint {
    /// Return the approximate size of the underlying type, when held in
    /// memory. `isize` because evictions subtract.
    fn footprint(&self) -> Result<isize>;
}

impl Footprint for u64 {
    fn footprint(&self) -> Result<isize> {
        Ok(8)
    }
}

/// Encode a [Byteable], honouring the fixed/variable discipline: fixed
/// types bare, variable types behind a `size:4` prefix.
pub fn encode_framed<B>(part: &B, buf: &mut Vec<u8>) -> Result<usize>
where
    B: Byteable,
{
    use std::convert::TryFrom;

    match B::FIXED_SIZE {
        Some(_) => part.encode(buf),
        None => {
            let off = buf.len();
            buf.extend_from_slice(&0_u32.to_le_bytes());
            let n = part.encode(buf)?;
            let size = err_at!(FailConvert, u32::try_from(n), "framed size")?;
            buf[off..off + 4].copy_from_slice(&size.to_le_bytes());
            Ok(n + 4)
        }
    }
}

/// Inverse of [encode_framed]. Return the value and bytes consumed.
pub fn decode_framed<B>(buf: &[u8]) -> Result<(B, usize)>
where
    B: Byteable,
{
    use std::convert::TryFrom;

    match B::FIXED_SIZE {
        Some(width) => {
            check_remaining!(buf, width, "framed fixed")?;
            B::decode(&buf[..width])
        }
        None => {
            let size = util::decode_u32(buf, "framed size")?;
            let size = err_at!(FailConvert, usize::try_from(size))?;
            check_remaining!(buf, 4 + size, "framed payload")?;
            let (part, n) = B::decode(&buf[4..4 + size])?;
            Ok((part, n + 4))
        }
    }
}
