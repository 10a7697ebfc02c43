//! Flat views.
//!
//! A `Context0` shows the filtered rows of the table itself, one view row per
//! primary key, ordered by its sort columns and then by key. Only the ordered
//! key index is kept; cells are read from the master state through the
//! handle received at registration.

use crate::delta::{RowDelta, StepTracker};
use crate::view::{clamp, min_max, Presentation};
use core::ops::Range;
use tessera_core::schema::Schema;
use tessera_core::{Result, Scalar};
use tessera_incremental::{Context, FlattenedBatch};
use tessera_pivot::{Config, FlatIndex, Resolved, SortSpec};
use tessera_storage::{MasterHandle, MasterState};
use tracing::warn;

/// A view with no pivots.
#[derive(Clone, Debug)]
pub struct Context0 {
    config: Config,
    schema: Schema,
    resolved: Resolved,
    index: FlatIndex,
    master: Option<MasterHandle>,
    tracker: StepTracker,
}

impl Context0 {
    pub fn new(schema: &Schema, config: Config) -> Result<Self> {
        let resolved = config.resolve_flat(schema)?;
        let orders = resolved.sorts.iter().map(|(_, o)| *o).collect();
        Ok(Self {
            config,
            schema: schema.clone(),
            resolved,
            index: FlatIndex::new(orders),
            master: None,
            tracker: StepTracker::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn sort_keys(&self, image: &[Scalar]) -> Vec<Scalar> {
        self.resolved
            .sorts
            .iter()
            .map(|(col, _)| image.get(*col).cloned().unwrap_or_default())
            .collect()
    }

    /// Rebuilds the key index under the current sorts.
    fn reindex(&mut self) {
        let pkeys = self.index.range(0, self.index.len());
        let mut index = FlatIndex::new(self.resolved.sorts.iter().map(|(_, o)| *o).collect());
        let state = self.master.as_ref().map(|m| m.read());
        for pkey in &pkeys {
            let keys = self
                .resolved
                .sorts
                .iter()
                .map(|(col, _)| {
                    state
                        .as_ref()
                        .map(|s| s.get_at(*col, pkey))
                        .unwrap_or_default()
                })
                .collect();
            index.update(pkey, Some(keys));
        }
        drop(state);
        self.index = index;
    }
}

impl Context for Context0 {
    fn step_begin(&mut self) {
        self.tracker.step_begin();
    }

    fn notify(&mut self, batch: &FlattenedBatch, state: &MasterState) -> Result<()> {
        let filter = &self.resolved.filter;
        for row in 0..batch.len() {
            let was_in = batch.existed[row] && filter.matches(&batch.prev, row);
            let is_in = batch.exists[row] && filter.matches(&batch.current, row);
            match (was_in, is_in) {
                (false, false) => continue,
                (true, true) if !batch.row_changed(row) => continue,
                _ => {}
            }
            let pkey = batch.pkey(row);
            if !is_in {
                self.index.update(&pkey, None);
                self.tracker.remove(pkey, batch.current.row(row));
                continue;
            }
            let image = state.get_row(&pkey).unwrap_or_else(|| batch.current.row(row));
            let keys = self.sort_keys(&image);
            self.index.update(&pkey, Some(keys));
            if was_in {
                self.tracker.update(pkey, image);
            } else {
                self.tracker.add(pkey, image);
            }
        }
        Ok(())
    }

    fn step_end(&mut self) {
        self.tracker.step_end("flat");
    }

    fn has_deltas(&self) -> bool {
        self.tracker.has_deltas()
    }

    fn reset(&mut self) {
        self.index.clear();
        self.tracker.reset();
    }

    fn attach(&mut self, master: &MasterHandle) {
        self.master = Some(master.clone());
    }
}

impl Presentation for Context0 {
    fn num_rows(&self) -> usize {
        self.index.len()
    }

    fn num_columns(&self) -> usize {
        self.resolved.columns.len()
    }

    fn get_data(&self, rows: Range<usize>, cols: Range<usize>) -> Vec<Vec<Scalar>> {
        let rows = clamp(rows, self.num_rows());
        let cols = clamp(cols, self.num_columns());
        let pkeys = self.index.range(rows.start, rows.end);
        let columns = &self.resolved.columns[cols];
        let state = match &self.master {
            Some(master) => master.read(),
            None => return vec![vec![Scalar::None; columns.len()]; pkeys.len()],
        };
        pkeys
            .iter()
            .map(|pkey| columns.iter().map(|c| state.get_at(*c, pkey)).collect())
            .collect()
    }

    /// The path of a flat row is its primary key.
    fn get_row_path(&self, row: usize) -> Vec<Scalar> {
        self.index.get(row).cloned().into_iter().collect()
    }

    fn get_column_path(&self, col: usize) -> Vec<Scalar> {
        self.resolved
            .columns
            .get(col)
            .map(|c| vec![Scalar::from(self.schema.columns()[*c].name())])
            .unwrap_or_default()
    }

    fn expand(&mut self, _row: usize) -> usize {
        0
    }

    fn collapse(&mut self, _row: usize) -> usize {
        0
    }

    fn set_depth(&mut self, _depth: usize) {}

    fn sort_by(&mut self, sorts: &[SortSpec]) {
        let mut resolved = Vec::with_capacity(sorts.len());
        for sort in sorts {
            match self.schema.get_column_index(&sort.target) {
                Some(col) => resolved.push((col, sort.order)),
                None => warn!(target = %sort.target, "ignoring sort on unknown column"),
            }
        }
        self.resolved.sorts = resolved;
        self.reindex();
    }

    fn get_row_delta(&mut self) -> RowDelta {
        self.tracker.take()
    }

    fn get_min_max(&self, col: usize) -> Option<(Scalar, Scalar)> {
        let column = *self.resolved.columns.get(col)?;
        let pkeys = self.index.range(0, self.index.len());
        let state = self.master.as_ref()?.read();
        min_max(pkeys.iter().map(|pkey| state.get_at(column, pkey)))
    }
}
