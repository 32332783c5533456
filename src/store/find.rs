use regex::Regex;

use std::{cmp::Ordering, fmt, result};

use crate::{db::Value, Error, Result};

/// Range and pattern operators accepted by `find`.
///
/// Comparison operators use the weakly-typed value order; pattern
/// operators match against the candidate's canonical string form.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    /// `values[0] <= candidate <= values[1]`, with either bound
    /// exclusive when the flag is false.
    Between {
        low_inclusive: bool,
        high_inclusive: bool,
    },
    Regex,
    NotRegex,
    Like,
    NotLike,
    /// Candidate is a link to the record named by the operand.
    LinksTo,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self {
            Operator::Eq => write!(f, "EQ"),
            Operator::Neq => write!(f, "NEQ"),
            Operator::Lt => write!(f, "LT"),
            Operator::Lte => write!(f, "LTE"),
            Operator::Gt => write!(f, "GT"),
            Operator::Gte => write!(f, "GTE"),
            Operator::Between { .. } => write!(f, "BETWEEN"),
            Operator::Regex => write!(f, "REGEX"),
            Operator::NotRegex => write!(f, "NOT_REGEX"),
            Operator::Like => write!(f, "LIKE"),
            Operator::NotLike => write!(f, "NOT_LIKE"),
            Operator::LinksTo => write!(f, "LINKS_TO"),
        }
    }
}

impl Operator {
    /// Whether `candidate` satisfies this operator over `operands`.
    pub fn matches(&self, candidate: &Value, operands: &[Value]) -> Result<bool> {
        let first = || -> Result<&Value> {
            match operands.first() {
                Some(value) => Ok(value),
                None => err_at!(InvalidInput, msg: "{} needs an operand", self),
            }
        };

        let res = match self {
            Operator::Eq => candidate.compare_weak(first()?) == Ordering::Equal,
            Operator::Neq => candidate.compare_weak(first()?) != Ordering::Equal,
            Operator::Lt => candidate.compare_weak(first()?) == Ordering::Less,
            Operator::Lte => candidate.compare_weak(first()?) != Ordering::Greater,
            Operator::Gt => candidate.compare_weak(first()?) == Ordering::Greater,
            Operator::Gte => candidate.compare_weak(first()?) != Ordering::Less,
            Operator::Between {
                low_inclusive,
                high_inclusive,
            } => {
                let (low, high) = match operands {
                    [low, high, ..] => (low, high),
                    _ => err_at!(InvalidInput, msg: "BETWEEN needs two operands")?,
                };
                let lo = match candidate.compare_weak(low) {
                    Ordering::Greater => true,
                    Ordering::Equal => *low_inclusive,
                    Ordering::Less => false,
                };
                let hi = match candidate.compare_weak(high) {
                    Ordering::Less => true,
                    Ordering::Equal => *high_inclusive,
                    Ordering::Greater => false,
                };
                lo && hi
            }
            Operator::Regex => {
                let re = compile_regex(&first()?.to_text_form())?;
                re.is_match(&candidate.to_text_form())
            }
            Operator::NotRegex => {
                let re = compile_regex(&first()?.to_text_form())?;
                !re.is_match(&candidate.to_text_form())
            }
            Operator::Like => {
                let re = compile_regex(&like_to_regex(&first()?.to_text_form()))?;
                re.is_match(&candidate.to_text_form())
            }
            Operator::NotLike => {
                let re = compile_regex(&like_to_regex(&first()?.to_text_form()))?;
                !re.is_match(&candidate.to_text_form())
            }
            Operator::LinksTo => match (candidate, first()?) {
                (Value::Link(link), Value::Link(target)) => link == target,
                (Value::Link(link), Value::I64(target)) => link.0 == *target as u64,
                (_, _) => false,
            },
        };
        Ok(res)
    }
}

fn compile_regex(pattern: &str) -> Result<Regex> {
    err_at!(InvalidInput, Regex::new(pattern), "pattern {:?}", pattern)
}

// translate a SQL-LIKE pattern into an anchored regex: `%` spans any
// run, `_` any single character, everything else is literal.
fn like_to_regex(pattern: &str) -> String {
    let escaped = regex::escape(pattern);
    let translated = escaped.replace('%', ".*").replace('_', ".");
    format!("^{}$", translated)
}

#[cfg(test)]
#[path = "find_test.rs"]
mod find_test;
