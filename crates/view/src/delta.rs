//! Row deltas.
//!
//! Every context records the primary keys a step touched in its view, with
//! the post-step row image. The set accumulates across steps until a caller
//! drains it with `take`.

use std::collections::BTreeMap;
use tessera_core::Scalar;
use tessera_incremental::FlattenedBatch;
use tessera_pivot::Strand;
use tracing::debug;

/// Rows changed since the last drain.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowDelta {
    /// True if anything changed
    pub changed: bool,
    /// Changed primary keys, ascending
    pub pkeys: Vec<Scalar>,
    /// Row image per changed key, in schema order; all `None` past the key
    /// for removed rows
    pub data: Vec<Vec<Scalar>>,
}

impl RowDelta {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pkeys.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pkeys.len()
    }
}

/// Per-context step bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct StepTracker {
    rows: BTreeMap<Scalar, Vec<Scalar>>,
    added: usize,
    removed: usize,
    updated: usize,
    step_changed: bool,
}

impl StepTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a step, clearing the per-step counters.
    pub fn step_begin(&mut self) {
        self.added = 0;
        self.removed = 0;
        self.updated = 0;
        self.step_changed = false;
    }

    /// Records a row entering the view.
    pub fn add(&mut self, pkey: Scalar, image: Vec<Scalar>) {
        self.added += 1;
        self.rows.insert(pkey, image);
    }

    /// Records a row leaving the view.
    pub fn remove(&mut self, pkey: Scalar, image: Vec<Scalar>) {
        self.removed += 1;
        self.rows.insert(pkey, image);
    }

    /// Records a row changing in place.
    pub fn update(&mut self, pkey: Scalar, image: Vec<Scalar>) {
        self.updated += 1;
        self.rows.insert(pkey, image);
    }

    /// Records the rows behind a set of strands.
    ///
    /// A row with only an entering strand was added, one with only a leaving
    /// strand was removed, anything else was updated.
    pub fn record_strands(&mut self, batch: &FlattenedBatch, strands: &[Strand]) {
        let mut rows: BTreeMap<usize, (bool, bool)> = BTreeMap::new();
        for strand in strands {
            let entry = rows.entry(strand.row).or_default();
            entry.0 |= strand.count >= 0;
            entry.1 |= strand.count <= 0;
        }
        for (row, flags) in rows {
            let pkey = batch.pkey(row);
            let image = batch.current.row(row);
            match flags {
                (true, false) => self.add(pkey, image),
                (false, true) => self.remove(pkey, image),
                _ => self.update(pkey, image),
            }
        }
    }

    /// Finishes a step.
    pub fn step_end(&mut self, context: &str) {
        self.step_changed |= self.added + self.removed + self.updated > 0;
        debug!(
            context,
            added = self.added,
            removed = self.removed,
            updated = self.updated,
            pending = self.rows.len(),
            "step finished"
        );
    }

    /// Returns true if the last step changed the view.
    #[inline]
    pub fn has_deltas(&self) -> bool {
        self.step_changed
    }

    /// Returns (added, removed, updated) for the last step.
    pub fn step_counts(&self) -> (usize, usize, usize) {
        (self.added, self.removed, self.updated)
    }

    /// Drains the accumulated delta.
    pub fn take(&mut self) -> RowDelta {
        let rows = std::mem::take(&mut self.rows);
        let mut delta = RowDelta {
            changed: !rows.is_empty(),
            pkeys: Vec::with_capacity(rows.len()),
            data: Vec::with_capacity(rows.len()),
        };
        for (pkey, image) in rows {
            delta.pkeys.push(pkey);
            delta.data.push(image);
        }
        delta
    }

    /// Drops everything.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.step_begin();
    }
}
