use std::{
    cmp,
    convert::{TryFrom, TryInto},
    fmt::{self, Display},
    hash::{Hash, Hasher},
    result,
};

use crate::{check_remaining, db::Byteable, hash, util, Error, Result};

/// Concatenated-payload budget beyond which a composite degrades to its
/// 16-byte digest.
pub const COMPOSITE_MAX_SIZE: usize = 64;

const FORM_LITERAL: u8 = 0x0;
const FORM_HASHED: u8 = 0x1;

/// A fingerprint of one or more byteables.
///
/// Built by concatenating canonical bytes with length prefixes, so
/// `Composite(Text("ab"))` can never equal `Composite(Text("a"),
/// Text("b"))`. When the stream outgrows [COMPOSITE_MAX_SIZE] only the
/// 16-byte murmur digest is kept; the hashed form is tagged and can
/// never compare equal to a literal form. Composites compare equal iff
/// their canonical byte streams compare equal.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Composite {
    Literal(Vec<u8>),
    Hashed([u8; 16]),
}

impl Composite {
    /// Fingerprint a single byteable.
    pub fn of<A>(a: &A) -> Result<Composite>
    where
        A: Byteable,
    {
        let mut builder = CompositeBuilder::default();
        builder.push(a)?;
        builder.finish()
    }

    /// Fingerprint a pair.
    pub fn of2<A, B>(a: &A, b: &B) -> Result<Composite>
    where
        A: Byteable,
        B: Byteable,
    {
        let mut builder = CompositeBuilder::default();
        builder.push(a)?;
        builder.push(b)?;
        builder.finish()
    }

    /// Fingerprint a triple.
    pub fn of3<A, B, C>(a: &A, b: &B, c: &C) -> Result<Composite>
    where
        A: Byteable,
        B: Byteable,
        C: Byteable,
    {
        let mut builder = CompositeBuilder::default();
        builder.push(a)?;
        builder.push(b)?;
        builder.push(c)?;
        builder.finish()
    }

    /// The canonical encoded form, fed to bloom filters and lock tables.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![];
        match self {
            Composite::Literal(stream) => {
                buf.push(FORM_LITERAL);
                buf.extend_from_slice(&(stream.len() as u32).to_le_bytes());
                buf.extend_from_slice(stream);
            }
            Composite::Hashed(digest) => {
                buf.push(FORM_HASHED);
                buf.extend_from_slice(digest);
            }
        }
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<(Composite, usize)> {
        check_remaining!(buf, 1, "composite form")?;
        match buf[0] {
            FORM_LITERAL => {
                let size = util::decode_u32(&buf[1..], "composite size")?;
                let size = err_at!(FailConvert, usize::try_from(size))?;
                check_remaining!(buf, 5 + size, "composite stream")?;
                Ok((Composite::Literal(buf[5..5 + size].to_vec()), 5 + size))
            }
            FORM_HASHED => {
                check_remaining!(buf, 17, "composite digest")?;
                let digest: [u8; 16] = buf[1..17].try_into().unwrap();
                Ok((Composite::Hashed(digest), 17))
            }
            form => err_at!(DecodeFail, msg: "invalid composite form {}", form),
        }
    }
}

impl Display for Composite {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self {
            Composite::Literal(stream) => write!(f, "composite<lit:{}>", stream.len()),
            Composite::Hashed(_) => write!(f, "composite<hashed>"),
        }
    }
}

impl Hash for Composite {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state)
    }
}

impl PartialOrd for Composite {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Composite {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

/// Incrementally assemble a [Composite] from byteable parts.
#[derive(Default)]
pub struct CompositeBuilder {
    stream: Vec<u8>,
}

impl CompositeBuilder {
    /// Append one part's length-prefixed canonical bytes.
    pub fn push<B>(&mut self, part: &B) -> Result<&mut Self>
    where
        B: Byteable,
    {
        // length prefix regardless of the part's fixed/variable nature,
        // concatenation must be unambiguous.
        let mut payload = vec![];
        part.encode(&mut payload)?;
        let size = err_at!(FailConvert, u32::try_from(payload.len()))?;
        self.stream.extend_from_slice(&size.to_le_bytes());
        self.stream.extend_from_slice(&payload);
        Ok(self)
    }

    /// Seal the stream into its literal or hashed form.
    pub fn finish(self) -> Result<Composite> {
        if self.stream.len() > COMPOSITE_MAX_SIZE {
            let digest = hash::murmur3_128(&self.stream)?;
            Ok(Composite::Hashed(digest.to_le_bytes()))
        } else {
            Ok(Composite::Literal(self.stream))
        }
    }
}

#[cfg(test)]
#[path = "composite_test.rs"]
mod composite_test;
