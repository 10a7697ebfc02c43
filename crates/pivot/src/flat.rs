//! Flat row index.
//!
//! Orders the live rows of an unpivoted view by its sort columns, then by
//! primary key. Rows enter, move and leave one key at a time.

use crate::config::SortOrder;
use core::cmp::Ordering;
use hashbrown::HashMap;
use tessera_core::Scalar;

#[derive(Clone, Debug, PartialEq)]
struct Entry {
    keys: Vec<Scalar>,
    pkey: Scalar,
}

/// Sorted primary keys of a flat view.
#[derive(Clone, Debug, Default)]
pub struct FlatIndex {
    orders: Vec<SortOrder>,
    entries: Vec<Entry>,
    keys: HashMap<Scalar, Vec<Scalar>>,
}

impl FlatIndex {
    /// Creates an index sorting by one key per entry of `orders`.
    pub fn new(orders: Vec<SortOrder>) -> Self {
        Self {
            orders,
            entries: Vec::new(),
            keys: HashMap::new(),
        }
    }

    fn cmp(&self, a: &Entry, b: &Entry) -> Ordering {
        for (i, order) in self.orders.iter().enumerate() {
            let ord = a.keys.get(i).cmp(&b.keys.get(i));
            let ord = match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.pkey.cmp(&b.pkey)
    }

    fn search(&self, entry: &Entry) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| self.cmp(e, entry))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the primary key at `idx`.
    pub fn get(&self, idx: usize) -> Option<&Scalar> {
        self.entries.get(idx).map(|e| &e.pkey)
    }

    pub fn contains(&self, pkey: &Scalar) -> bool {
        self.keys.contains_key(pkey)
    }

    /// Returns the position of a row.
    pub fn position(&self, pkey: &Scalar) -> Option<usize> {
        let keys = self.keys.get(pkey)?;
        let needle = Entry {
            keys: keys.clone(),
            pkey: pkey.clone(),
        };
        self.search(&needle).ok()
    }

    /// Primary keys in a row range, clamped to the index.
    pub fn range(&self, start: usize, end: usize) -> Vec<Scalar> {
        let end = end.min(self.entries.len());
        let start = start.min(end);
        self.entries[start..end].iter().map(|e| e.pkey.clone()).collect()
    }

    /// Places, moves or removes (`None`) one row.
    pub fn update(&mut self, pkey: &Scalar, keys: Option<Vec<Scalar>>) {
        if let Some(old) = self.keys.remove(pkey) {
            let needle = Entry {
                keys: old,
                pkey: pkey.clone(),
            };
            if let Ok(idx) = self.search(&needle) {
                self.entries.remove(idx);
            }
        }
        if let Some(keys) = keys {
            let entry = Entry {
                keys: keys.clone(),
                pkey: pkey.clone(),
            };
            let idx = match self.search(&entry) {
                Ok(idx) | Err(idx) => idx,
            };
            self.entries.insert(idx, entry);
            self.keys.insert(pkey.clone(), keys);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkeys(index: &FlatIndex) -> Vec<Scalar> {
        index.range(0, index.len())
    }

    #[test]
    fn test_pkey_order_without_sorts() {
        let mut index = FlatIndex::new(Vec::new());
        for k in [3i64, 1, 2] {
            index.update(&Scalar::Int64(k), Some(Vec::new()));
        }
        assert_eq!(pkeys(&index), vec![Scalar::Int64(1), Scalar::Int64(2), Scalar::Int64(3)]);
        assert_eq!(index.position(&Scalar::Int64(3)), Some(2));
    }

    #[test]
    fn test_move_and_remove() {
        let mut index = FlatIndex::new(vec![SortOrder::Desc]);
        index.update(&Scalar::Int64(1), Some(vec![Scalar::Int64(10)]));
        index.update(&Scalar::Int64(2), Some(vec![Scalar::Int64(20)]));
        assert_eq!(index.get(0), Some(&Scalar::Int64(2)));

        index.update(&Scalar::Int64(1), Some(vec![Scalar::Int64(30)]));
        assert_eq!(index.get(0), Some(&Scalar::Int64(1)));
        assert_eq!(index.len(), 2);

        index.update(&Scalar::Int64(1), None);
        assert_eq!(pkeys(&index), vec![Scalar::Int64(2)]);
        assert!(!index.contains(&Scalar::Int64(1)));
        assert!(index.position(&Scalar::Int64(1)).is_none());
    }

    #[test]
    fn test_range_clamped() {
        let mut index = FlatIndex::new(Vec::new());
        index.update(&Scalar::Int64(1), Some(Vec::new()));
        assert_eq!(index.range(0, 10).len(), 1);
        assert!(index.range(5, 10).is_empty());
        assert!(index.get(3).is_none());
    }
}
