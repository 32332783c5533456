use std::collections::BTreeMap;

/// A sorted-view wrapper over a run asserted to already be in sort
/// order.
///
/// Insertions that preserve the primary run's order are appended to it;
/// late arrivals go into an auxiliary tree, and iteration bridges the
/// two sorted streams in O(n). Sub-range views (subMap/headMap/tailMap
/// of the source design) are deliberately not offered; iterate and
/// filter instead.
#[derive(Debug, Default)]
pub struct BridgeSortMap<K, V>
where
    K: Ord,
{
    primary: Vec<(K, V)>,
    bridge: BTreeMap<K, V>,
}

impl<K, V> BridgeSortMap<K, V>
where
    K: Ord,
{
    pub fn new() -> BridgeSortMap<K, V> {
        BridgeSortMap {
            primary: Vec::default(),
            bridge: BTreeMap::default(),
        }
    }

    /// Insert `(key, value)`. Keys arriving in sort order stay in the
    /// primary run; others bridge through the auxiliary tree. Replaces
    /// and returns any previous value for an equal key. Re-inserting an
    /// interior key of the primary run is not supported.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.primary.last() {
            Some((last, _)) if *last < key => {
                self.primary.push((key, value));
                None
            }
            None if self.bridge.is_empty() => {
                self.primary.push((key, value));
                None
            }
            Some((last, _)) if *last == key => {
                let (_, old) = self.primary.pop().unwrap();
                self.primary.push((key, value));
                Some(old)
            }
            _ => self.bridge.insert(key, value),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        match self.primary.binary_search_by(|(k, _)| k.cmp(key)) {
            Ok(off) => Some(&self.primary[off].1),
            Err(_) => self.bridge.get(key),
        }
    }

    pub fn len(&self) -> usize {
        self.primary.len() + self.bridge.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.bridge.is_empty()
    }

    /// Merged iteration over both streams, in key order.
    pub fn iter(&self) -> Iter<K, V> {
        Iter {
            primary: self.primary.iter().peekable(),
            bridge: self.bridge.iter().peekable(),
        }
    }

    /// Consume into a sorted vector of `(key, value)`.
    pub fn unwrap(mut self) -> Vec<(K, V)> {
        let mut items = std::mem::take(&mut self.primary);
        let mut late: Vec<(K, V)> = self.bridge.into_iter().collect();
        if late.is_empty() {
            return items;
        }
        items.append(&mut late);
        items.sort_by(|(a, _), (b, _)| a.cmp(b));
        items
    }
}

pub struct Iter<'a, K, V>
where
    K: Ord,
{
    primary: std::iter::Peekable<std::slice::Iter<'a, (K, V)>>,
    bridge: std::iter::Peekable<std::collections::btree_map::Iter<'a, K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V>
where
    K: Ord,
{
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let take_primary = match (self.primary.peek(), self.bridge.peek()) {
            (Some((pk, _)), Some((bk, _))) => pk <= *bk,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => return None,
        };
        if take_primary {
            self.primary.next().map(|(k, v)| (k, v))
        } else {
            self.bridge.next()
        }
    }
}

#[cfg(test)]
#[path = "bridge_test.rs"]
mod bridge_test;
