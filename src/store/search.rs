use std::collections::{BTreeMap, BTreeSet};

use crate::db::{tokenize, Identifier, Position, Text};

/// Precompiled Boyer-Moore-Horspool table for one search token,
/// used for substring match against corpus words.
pub struct BoyerMoore {
    needle: Vec<u8>,
    shift: [usize; 256],
}

impl BoyerMoore {
    pub fn new(needle: &str) -> BoyerMoore {
        let needle = needle.as_bytes().to_vec();
        let mut shift = [needle.len().max(1); 256];
        for (i, byte) in needle.iter().enumerate().take(needle.len().saturating_sub(1)) {
            shift[*byte as usize] = needle.len() - 1 - i;
        }
        BoyerMoore { needle, shift }
    }

    /// Whether the needle occurs anywhere in `haystack`.
    pub fn is_substring_of(&self, haystack: &str) -> bool {
        let haystack = haystack.as_bytes();
        let n = self.needle.len();
        if n == 0 {
            return true;
        }
        if haystack.len() < n {
            return false;
        }

        let mut pos = 0;
        while pos + n <= haystack.len() {
            let mut i = n;
            while i > 0 && self.needle[i - 1] == haystack[pos + i - 1] {
                i -= 1;
            }
            if i == 0 {
                return true;
            }
            pos += self.shift[haystack[pos + n - 1] as usize];
        }
        false
    }
}

/// Match records against a multi-word query over a posting map of
/// `word -> present positions`.
///
/// Each query token matches a corpus word by substring (prefix or
/// infix); a multi-token query requires its tokens to match words at
/// adjacent positions within the same record, AND-combined.
pub fn matching_records(
    postings: &BTreeMap<Text, BTreeSet<Position>>,
    query: &str,
) -> BTreeSet<Identifier> {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return BTreeSet::new();
    }

    // per-token position hits, via one precompiled table per token.
    let mut hits: Vec<BTreeSet<Position>> = vec![];
    for token in tokens.iter() {
        let matcher = BoyerMoore::new(token);
        let mut positions = BTreeSet::new();
        for (word, word_positions) in postings.iter() {
            if matcher.is_substring_of(word.as_str()) {
                positions.extend(word_positions.iter().copied());
            }
        }
        if positions.is_empty() {
            return BTreeSet::new(); // AND semantics
        }
        hits.push(positions);
    }

    let mut records = BTreeSet::new();
    'anchor: for anchor in hits[0].iter() {
        let mut cursor = *anchor;
        for token_hits in hits[1..].iter() {
            cursor = match cursor.successor() {
                Some(next) if token_hits.contains(&next) => next,
                _ => continue 'anchor,
            };
        }
        records.insert(anchor.record);
    }
    records
}

#[cfg(test)]
#[path = "search_test.rs"]
mod search_test;
