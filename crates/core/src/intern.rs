//! String interning.
//!
//! A `StringPool` hands out one shared allocation per distinct string, so
//! string scalars read from the same table compare by pointer before falling
//! back to content.

use crate::scalar::Scalar;
use hashbrown::HashMap;
use std::sync::Arc;

/// Identifier of an interned string within one pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrId(u32);

impl StrId {
    /// Returns the raw index of this id.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Append-only string interner.
#[derive(Debug, Default)]
pub struct StringPool {
    strings: Vec<Arc<str>>,
    ids: HashMap<Arc<str>, StrId>,
}

impl StringPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a string, returning its id.
    pub fn intern(&mut self, s: &str) -> StrId {
        if let Some(id) = self.ids.get(s) {
            return *id;
        }
        let id = StrId(self.strings.len() as u32);
        let shared: Arc<str> = Arc::from(s);
        self.strings.push(shared.clone());
        self.ids.insert(shared, id);
        id
    }

    /// Returns the string for an id, or `None` if the id is from another pool.
    pub fn unintern(&self, id: StrId) -> Option<&str> {
        self.strings.get(id.index()).map(|s| s.as_ref())
    }

    /// Rewrites a string scalar so it points at this pool's allocation.
    ///
    /// Other variants pass through unchanged.
    pub fn intern_scalar(&mut self, value: Scalar) -> Scalar {
        match value {
            Scalar::Str(s) => {
                let id = self.intern(&s);
                Scalar::Str(self.strings[id.index()].clone())
            }
            other => other,
        }
    }

    /// Returns the number of distinct strings.
    #[inline]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Returns true if no string has been interned.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_dedup() {
        let mut pool = StringPool::new();
        let a = pool.intern("NY");
        let b = pool.intern("LA");
        let c = pool.intern("NY");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.unintern(b), Some("LA"));
    }

    #[test]
    fn test_intern_scalar_shares_allocation() {
        let mut pool = StringPool::new();
        let x = pool.intern_scalar(Scalar::from("NY"));
        let y = pool.intern_scalar(Scalar::from("NY"));
        match (&x, &y) {
            (Scalar::Str(a), Scalar::Str(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("expected strings"),
        }
        assert_eq!(pool.intern_scalar(Scalar::Int32(1)), Scalar::Int32(1));
    }

    #[test]
    fn test_unintern_unknown() {
        let pool = StringPool::new();
        assert_eq!(pool.unintern(StrId(3)), None);
    }
}
