use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use crate::{
    db::{Identifier, Revision, Text, Value},
    seg::Segment,
    store::{database::Database, Operator},
    Result,
};

/// Navigate a dotted key path `k0.k1...kN`: follow outgoing link values
/// at every step and apply `op` over `operands` at `kN`. Return the
/// records at the head of the chain, restricted to `start` when
/// non-empty.
///
/// Two strategies exist; a cost estimator chooses per query. Forward
/// resolution fans out link-by-link from the start set. The reverse
/// ad-hoc index resolves the final condition first and walks the link
/// graph backward, which wins when the condition is selective.
pub(crate) fn navigate_in(
    db: &Database,
    segments: &[Arc<Segment>],
    extra: &[Revision],
    path: &str,
    start: &BTreeSet<Identifier>,
    op: Operator,
    operands: &[Value],
    version: u64,
) -> Result<BTreeSet<Identifier>> {
    let keys: Vec<Text> = path
        .split('.')
        .filter(|k| !k.is_empty())
        .map(Text::from)
        .collect();

    match keys.len() {
        0 => Ok(BTreeSet::new()),
        1 => {
            let mut records = db.find_in(segments, extra, &keys[0], op, operands, version)?;
            if !start.is_empty() {
                records = records.intersection(start).copied().collect();
            }
            Ok(records)
        }
        _ => {
            // expected fan-out at the first step vs expected matches at
            // the last; without a clear win, the ad-hoc index path.
            let fan_out = match start.is_empty() {
                true => db.cardinality_hint(segments, &keys[0])?,
                false => start.len() as u64,
            };
            let matches = db.cardinality_hint(segments, keys.last().unwrap())?;

            if fan_out < matches {
                forward(db, segments, extra, &keys, start, op, operands, version)
            } else {
                reverse(db, segments, extra, &keys, start, op, operands, version)
            }
        }
    }
}

// resolve records to values step by step; cheap when the start set is
// small.
#[allow(clippy::too_many_arguments)]
pub(crate) fn forward(
    db: &Database,
    segments: &[Arc<Segment>],
    extra: &[Revision],
    keys: &[Text],
    start: &BTreeSet<Identifier>,
    op: Operator,
    operands: &[Value],
    version: u64,
) -> Result<BTreeSet<Identifier>> {
    let origins: BTreeSet<Identifier> = match start.is_empty() {
        false => start.clone(),
        true => {
            // every record holding k0.
            let browse = db.browse_in(segments, extra, &keys[0], version)?;
            browse.into_iter().flat_map(|(_, records)| records).collect()
        }
    };

    let mut matched = BTreeSet::new();
    for origin in origins.into_iter() {
        let mut frontier: BTreeSet<Identifier> = BTreeSet::new();
        frontier.insert(origin);

        // follow links through the intermediate keys.
        for key in keys[..keys.len() - 1].iter() {
            let mut next = BTreeSet::new();
            for record in frontier.iter() {
                for value in db.select_key_in(segments, extra, key, *record, version)? {
                    if let Value::Link(target) = value {
                        next.insert(target);
                    }
                }
            }
            frontier = next;
            if frontier.is_empty() {
                break;
            }
        }

        // the final step applies the operator.
        let last = keys.last().unwrap();
        'probe: for record in frontier.into_iter() {
            for value in db.select_key_in(segments, extra, last, record, version)? {
                if op.matches(&value, operands)? {
                    matched.insert(origin);
                    break 'probe;
                }
            }
        }
    }
    Ok(matched)
}

// resolve the final condition first, then walk the link graph backward;
// cheap when the condition is selective.
#[allow(clippy::too_many_arguments)]
pub(crate) fn reverse(
    db: &Database,
    segments: &[Arc<Segment>],
    extra: &[Revision],
    keys: &[Text],
    start: &BTreeSet<Identifier>,
    op: Operator,
    operands: &[Value],
    version: u64,
) -> Result<BTreeSet<Identifier>> {
    let last = keys.last().unwrap();
    let mut holders = db.find_in(segments, extra, last, op, operands, version)?;

    // records linking into `holders` via each intermediate key, from
    // the tail of the path back to its head.
    for key in keys[..keys.len() - 1].iter().rev() {
        if holders.is_empty() {
            return Ok(BTreeSet::new());
        }
        let browse: BTreeMap<Value, BTreeSet<Identifier>> =
            db.browse_in(segments, extra, key, version)?;

        let mut sources = BTreeSet::new();
        for (value, records) in browse.into_iter() {
            if let Value::Link(target) = value {
                if holders.contains(&target) {
                    sources.extend(records);
                }
            }
        }
        holders = sources;
    }

    if !start.is_empty() {
        holders = holders.intersection(start).copied().collect();
    }
    Ok(holders)
}

#[cfg(test)]
#[path = "navigate_test.rs"]
mod navigate_test;
