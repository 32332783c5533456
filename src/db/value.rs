use std::{
    cmp,
    convert::TryInto,
    fmt::{self, Display},
    hash::{Hash, Hasher},
    result,
};

use crate::{
    check_remaining,
    db::{Byteable, Footprint, Identifier, Text},
    Error, Result,
};

/// A tagged scalar, the value half of every stored triple.
///
/// Comparison is weakly typed: when both sides are numeric they compare
/// in numeric order, otherwise both compare by their canonical string
/// form. Values of different types never compare equal; the weak order
/// is refined by the type tag so the full order stays total.
///
/// The two sentinels [Value::NegInfinity] and [Value::PosInfinity] sort
/// below/above any real value and cannot be encoded.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Link(Identifier),
    Str(Text),
    NegInfinity,
    PosInfinity,
}

const TAG_BOOL: u8 = 1;
const TAG_I32: u8 = 2;
const TAG_I64: u8 = 3;
const TAG_F32: u8 = 4;
const TAG_F64: u8 = 5;
const TAG_LINK: u8 = 6;
const TAG_STR: u8 = 7;

impl Value {
    /// The encoding's leading type tag.
    pub fn to_type_tag(&self) -> Result<u8> {
        match self {
            Value::Bool(_) => Ok(TAG_BOOL),
            Value::I32(_) => Ok(TAG_I32),
            Value::I64(_) => Ok(TAG_I64),
            Value::F32(_) => Ok(TAG_F32),
            Value::F64(_) => Ok(TAG_F64),
            Value::Link(_) => Ok(TAG_LINK),
            Value::Str(_) => Ok(TAG_STR),
            Value::NegInfinity | Value::PosInfinity => {
                err_at!(InvalidInput, msg: "sentinel has no tag")
            }
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::I32(_) | Value::I64(_) | Value::F32(_) | Value::F64(_)
        )
    }

    fn as_f64(&self) -> f64 {
        match self {
            Value::I32(v) => *v as f64,
            Value::I64(v) => *v as f64,
            Value::F32(v) => *v as f64,
            Value::F64(v) => *v,
            _ => unreachable!(),
        }
    }

    /// Canonical string form, the basis of non-numeric comparison.
    pub fn to_text_form(&self) -> String {
        match self {
            Value::Bool(v) => v.to_string(),
            Value::I32(v) => v.to_string(),
            Value::I64(v) => v.to_string(),
            Value::F32(v) => v.to_string(),
            Value::F64(v) => v.to_string(),
            Value::Link(id) => id.to_string(),
            Value::Str(text) => text.to_string(),
            Value::NegInfinity => "-inf".to_string(),
            Value::PosInfinity => "+inf".to_string(),
        }
    }

    /// The weakly-typed comparison alone, without the type-tag
    /// refinement; the basis of every find operator.
    pub fn compare_weak(&self, other: &Self) -> cmp::Ordering {
        use cmp::Ordering::{Equal, Greater, Less};
        use Value::{NegInfinity, PosInfinity};

        match (self, other) {
            (NegInfinity, NegInfinity) => Equal,
            (NegInfinity, _) => Less,
            (_, NegInfinity) => Greater,
            (PosInfinity, PosInfinity) => Equal,
            (PosInfinity, _) => Greater,
            (_, PosInfinity) => Less,
            (a, b) if a.is_numeric() && b.is_numeric() => {
                a.as_f64().total_cmp(&b.as_f64())
            }
            (a, b) => a.to_text_form().cmp(&b.to_text_form()),
        }
    }

    // payload bytes, used by cmp tie-break; sentinels have none.
    fn payload(&self) -> Vec<u8> {
        match self {
            Value::Bool(v) => vec![*v as u8],
            Value::I32(v) => v.to_le_bytes().to_vec(),
            Value::I64(v) => v.to_le_bytes().to_vec(),
            Value::F32(v) => v.to_bits().to_le_bytes().to_vec(),
            Value::F64(v) => v.to_bits().to_le_bytes().to_vec(),
            Value::Link(id) => id.0.to_le_bytes().to_vec(),
            Value::Str(text) => text.as_bytes().to_vec(),
            Value::NegInfinity | Value::PosInfinity => vec![],
        }
    }

    fn tag_rank(&self) -> u8 {
        match self {
            Value::NegInfinity => 0,
            Value::PosInfinity => u8::MAX,
            value => value.to_type_tag().unwrap_or(0),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self.to_text_form())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.tag_rank() == other.tag_rank() && self.payload() == other.payload()
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag_rank().hash(state);
        self.payload().hash(state);
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.compare_weak(other)
            .then_with(|| self.tag_rank().cmp(&other.tag_rank()))
            .then_with(|| self.payload().cmp(&other.payload()))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(Text::from_str(s))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::I64(v)
    }
}

impl From<Identifier> for Value {
    fn from(id: Identifier) -> Value {
        Value::Link(id)
    }
}

impl<'a> arbitrary::Arbitrary<'a> for Value {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let value = match u.arbitrary::<u8>()? % 7 {
            0 => Value::Bool(u.arbitrary()?),
            1 => Value::I32(u.arbitrary()?),
            2 => Value::I64(u.arbitrary()?),
            3 => Value::F32(u.arbitrary()?),
            4 => Value::F64(u.arbitrary()?),
            5 => Value::Link(u.arbitrary()?),
            _ => Value::Str(u.arbitrary()?),
        };
        Ok(value)
    }
}

impl Footprint for Value {
    fn footprint(&self) -> Result<isize> {
        use std::convert::TryFrom;

        let size = std::mem::size_of::<Value>() + self.payload().len();
        err_at!(FailConvert, isize::try_from(size))
    }
}

impl Byteable for Value {
    const FIXED_SIZE: Option<usize> = None;

    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize> {
        let tag = self.to_type_tag()?;
        buf.push(tag);
        let payload = self.payload();
        buf.extend_from_slice(&payload);
        Ok(1 + payload.len())
    }

    fn decode(buf: &[u8]) -> Result<(Value, usize)> {
        check_remaining!(buf, 1, "value tag")?;
        let (tag, buf) = (buf[0], &buf[1..]);
        let (value, n) = match tag {
            TAG_BOOL => {
                check_remaining!(buf, 1, "value bool")?;
                (Value::Bool(buf[0] != 0), 1)
            }
            TAG_I32 => {
                check_remaining!(buf, 4, "value i32")?;
                let bytes: [u8; 4] = buf[..4].try_into().unwrap();
                (Value::I32(i32::from_le_bytes(bytes)), 4)
            }
            TAG_I64 => {
                check_remaining!(buf, 8, "value i64")?;
                let bytes: [u8; 8] = buf[..8].try_into().unwrap();
                (Value::I64(i64::from_le_bytes(bytes)), 8)
            }
            TAG_F32 => {
                check_remaining!(buf, 4, "value f32")?;
                let bytes: [u8; 4] = buf[..4].try_into().unwrap();
                (Value::F32(f32::from_bits(u32::from_le_bytes(bytes))), 4)
            }
            TAG_F64 => {
                check_remaining!(buf, 8, "value f64")?;
                let bytes: [u8; 8] = buf[..8].try_into().unwrap();
                (Value::F64(f64::from_bits(u64::from_le_bytes(bytes))), 8)
            }
            TAG_LINK => {
                let (id, n) = Identifier::decode(buf)?;
                (Value::Link(id), n)
            }
            TAG_STR => {
                let (text, n) = Text::decode(buf)?;
                (Value::Str(text), n)
            }
            tag => err_at!(DecodeFail, msg: "invalid value tag {}", tag)?,
        };
        Ok((value, n + 1))
    }
}

#[cfg(test)]
#[path = "value_test.rs"]
mod value_test;
