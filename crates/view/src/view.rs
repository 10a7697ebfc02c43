//! The presentation surface and the `View` enum over the three view shapes.

use crate::delta::RowDelta;
use crate::flat::Context0;
use crate::grid::Context2;
use crate::rows::Context1;
use core::ops::Range;
use tessera_core::schema::Schema;
use tessera_core::{Result, Scalar};
use tessera_incremental::{Context, FlattenedBatch};
use tessera_pivot::{Config, SortSpec};
use tessera_storage::{MasterHandle, MasterState};

/// Read and navigation calls of a view.
///
/// Out-of-range rows and columns yield empty results, never errors.
pub trait Presentation {
    fn num_rows(&self) -> usize;

    fn num_columns(&self) -> usize;

    /// Returns cells row-major; missing cells are `Scalar::None`.
    fn get_data(&self, rows: Range<usize>, cols: Range<usize>) -> Vec<Vec<Scalar>>;

    fn get_row_path(&self, row: usize) -> Vec<Scalar>;

    fn get_column_path(&self, col: usize) -> Vec<Scalar>;

    /// Expands a row, returning the number of rows added.
    fn expand(&mut self, row: usize) -> usize;

    /// Collapses a row, returning the number of rows removed.
    fn collapse(&mut self, row: usize) -> usize;

    fn set_depth(&mut self, depth: usize);

    /// Replaces the sorts. Unknown targets are skipped.
    fn sort_by(&mut self, sorts: &[SortSpec]);

    /// Drains the rows changed since the last call.
    fn get_row_delta(&mut self) -> RowDelta;

    /// Returns the smallest and largest valid value of a column over the
    /// non-total rows.
    fn get_min_max(&self, col: usize) -> Option<(Scalar, Scalar)>;
}

/// Clamps a range to `0..len`.
pub(crate) fn clamp(range: Range<usize>, len: usize) -> Range<usize> {
    let end = range.end.min(len);
    range.start.min(end)..end
}

pub(crate) fn min_max(values: impl IntoIterator<Item = Scalar>) -> Option<(Scalar, Scalar)> {
    values
        .into_iter()
        .filter(|v| v.is_valid())
        .fold(None, |acc, v| match acc {
            None => Some((v.clone(), v)),
            Some((lo, hi)) => Some((lo.min(v.clone()), hi.max(v))),
        })
}

/// A view of one of the three shapes.
#[derive(Clone, Debug)]
pub enum View {
    /// No pivots, no aggregates
    Flat(Context0),
    /// Row pivots and aggregates
    Rows(Context1),
    /// Row and column pivots
    Grid(Context2),
}

macro_rules! dispatch {
    ($self:expr, $ctx:ident => $body:expr) => {
        match $self {
            View::Flat($ctx) => $body,
            View::Rows($ctx) => $body,
            View::Grid($ctx) => $body,
        }
    };
}

impl View {
    /// Builds the view shape matching `config`.
    pub fn new(schema: &Schema, config: Config) -> Result<Self> {
        if config.is_flat() {
            Ok(View::Flat(Context0::new(schema, config)?))
        } else if config.column_pivots().is_empty() {
            Ok(View::Rows(Context1::new(schema, config)?))
        } else {
            Ok(View::Grid(Context2::new(schema, config)?))
        }
    }

    pub fn config(&self) -> &Config {
        dispatch!(self, ctx => ctx.config())
    }
}

impl Context for View {
    fn step_begin(&mut self) {
        dispatch!(self, ctx => ctx.step_begin())
    }

    fn notify(&mut self, batch: &FlattenedBatch, state: &MasterState) -> Result<()> {
        dispatch!(self, ctx => ctx.notify(batch, state))
    }

    fn step_end(&mut self) {
        dispatch!(self, ctx => ctx.step_end())
    }

    fn has_deltas(&self) -> bool {
        dispatch!(self, ctx => ctx.has_deltas())
    }

    fn reset(&mut self) {
        dispatch!(self, ctx => ctx.reset())
    }

    fn attach(&mut self, master: &MasterHandle) {
        dispatch!(self, ctx => ctx.attach(master))
    }
}

impl Presentation for View {
    fn num_rows(&self) -> usize {
        dispatch!(self, ctx => ctx.num_rows())
    }

    fn num_columns(&self) -> usize {
        dispatch!(self, ctx => ctx.num_columns())
    }

    fn get_data(&self, rows: Range<usize>, cols: Range<usize>) -> Vec<Vec<Scalar>> {
        dispatch!(self, ctx => ctx.get_data(rows, cols))
    }

    fn get_row_path(&self, row: usize) -> Vec<Scalar> {
        dispatch!(self, ctx => ctx.get_row_path(row))
    }

    fn get_column_path(&self, col: usize) -> Vec<Scalar> {
        dispatch!(self, ctx => ctx.get_column_path(col))
    }

    fn expand(&mut self, row: usize) -> usize {
        dispatch!(self, ctx => ctx.expand(row))
    }

    fn collapse(&mut self, row: usize) -> usize {
        dispatch!(self, ctx => ctx.collapse(row))
    }

    fn set_depth(&mut self, depth: usize) {
        dispatch!(self, ctx => ctx.set_depth(depth))
    }

    fn sort_by(&mut self, sorts: &[SortSpec]) {
        dispatch!(self, ctx => ctx.sort_by(sorts))
    }

    fn get_row_delta(&mut self) -> RowDelta {
        dispatch!(self, ctx => ctx.get_row_delta())
    }

    fn get_min_max(&self, col: usize) -> Option<(Scalar, Scalar)> {
        dispatch!(self, ctx => ctx.get_min_max(col))
    }
}
