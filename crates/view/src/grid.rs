//! Two-sided views.
//!
//! A `Context2` pivots on both axes. The row axis and the column axis each
//! keep their own tree and traversal. Cell values live in one tree per row
//! depth `d`, grouped by the first `d` row pivots followed by every column
//! pivot, so the cell at row path `r` and column path `c` is the node at
//! `r ++ c` in the tree of depth `r.len()`. Row-total cells come from the
//! column tree itself.
//!
//! View column `c` shows aggregate `c % n` of column-axis row `c / n`, where
//! `n` is the number of aggregates.

use crate::axis::{merge_strands, Axis};
use crate::delta::{RowDelta, StepTracker};
use crate::rows::aggregate_sorts;
use crate::view::{clamp, min_max, Presentation};
use core::ops::Range;
use tessera_core::schema::Schema;
use tessera_core::{Error, Result, Scalar};
use tessera_incremental::{Context, FlattenedBatch};
use tessera_pivot::{
    build_strands, project, Config, Kernel, NodeId, Resolved, STree, SortSpec, StrandSpec,
};
use tessera_storage::MasterState;

/// A view with row and column pivots.
#[derive(Clone, Debug)]
pub struct Context2 {
    config: Config,
    resolved: Resolved,
    kernels: Vec<Kernel>,
    rows: Axis,
    columns: Axis,
    /// `cells[d - 1]` groups by `d` row pivots then all column pivots
    cells: Vec<STree>,
    tracker: StepTracker,
}

impl Context2 {
    pub fn new(schema: &Schema, config: Config) -> Result<Self> {
        let resolved = config.resolve(schema)?;
        if resolved.column_pivots.is_empty() {
            return Err(Error::invalid_config("a grid view needs column pivots"));
        }
        if resolved.aggregates.is_empty() {
            return Err(Error::invalid_config("a grid view needs an aggregate"));
        }
        let kernels = resolved.aggregates.iter().map(|a| a.kernel).collect();
        let nrows = resolved.row_pivots.len();
        let ncols = resolved.column_pivots.len();
        let rows = Axis::new(
            nrows,
            &resolved.aggregates,
            config.row_expand_depth(),
            resolved.sorts.clone(),
            config.totals(),
        );
        let columns = Axis::new(ncols, &resolved.aggregates, ncols, Vec::new(), config.totals());
        let cells = (1..=nrows)
            .map(|d| STree::new(d + ncols, &resolved.aggregates))
            .collect();
        Ok(Self {
            config,
            resolved,
            kernels,
            rows,
            columns,
            cells,
            tracker: StepTracker::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    fn num_aggregates(&self) -> usize {
        self.kernels.len()
    }

    /// Returns the tree and node holding the cell at a row path and a column
    /// path.
    fn cell(&self, rpath: &[Scalar], cpath: &[Scalar]) -> Option<(&STree, NodeId)> {
        if rpath.is_empty() {
            let tree = self.columns.tree();
            return tree.find_path(cpath).map(|id| (tree, id));
        }
        let tree = self.cells.get(rpath.len() - 1)?;
        let mut path = Vec::with_capacity(rpath.len() + cpath.len());
        path.extend_from_slice(rpath);
        path.extend_from_slice(cpath);
        tree.find_path(&path).map(|id| (tree, id))
    }

    /// Returns the aggregate values of one cell; `None` if no live row falls
    /// into it.
    pub fn get_cell_values(&self, rpath: &[Scalar], cpath: &[Scalar]) -> Option<Vec<Scalar>> {
        let (tree, id) = self.cell(rpath, cpath)?;
        Some(
            (0..self.num_aggregates())
                .map(|agg| tree.get_aggregate(id, agg))
                .collect(),
        )
    }

    /// Returns the live row count of one cell; 0 if absent.
    pub fn get_cell_count(&self, rpath: &[Scalar], cpath: &[Scalar]) -> i64 {
        self.cell(rpath, cpath)
            .map(|(tree, id)| tree.count(id))
            .unwrap_or(0)
    }

    pub fn num_column_nodes(&self) -> usize {
        self.columns.len()
    }

    /// Expands the column-axis node behind view column `col`, returning the
    /// number of view columns added.
    pub fn expand_column(&mut self, col: usize) -> usize {
        let n = self.num_aggregates();
        self.columns.expand(col / n) * n
    }

    /// Collapses the column-axis node behind view column `col`, returning the
    /// number of view columns removed.
    pub fn collapse_column(&mut self, col: usize) -> usize {
        let n = self.num_aggregates();
        self.columns.collapse(col / n) * n
    }

    pub fn set_column_depth(&mut self, depth: usize) {
        self.columns.set_depth(depth);
    }

    fn value_at(&self, rpath: &[Scalar], col: usize) -> Scalar {
        let n = self.num_aggregates();
        let cpath = self.columns.path(col / n);
        self.cell(rpath, &cpath)
            .map(|(tree, id)| tree.get_aggregate(id, col % n))
            .unwrap_or_default()
    }
}

impl Context for Context2 {
    fn step_begin(&mut self) {
        self.tracker.step_begin();
    }

    fn notify(&mut self, batch: &FlattenedBatch, _state: &MasterState) -> Result<()> {
        let nrows = self.resolved.row_pivots.len();
        let ncols = self.resolved.column_pivots.len();
        let mut pivots = self.resolved.row_pivots.clone();
        pivots.extend_from_slice(&self.resolved.column_pivots);
        let spec = StrandSpec {
            pivots: &pivots,
            aggregates: &self.resolved.aggregates,
            filter: &self.resolved.filter,
        };
        let strands = build_strands(batch, &spec);
        if strands.is_empty() {
            return Ok(());
        }

        let row_levels: Vec<usize> = (0..nrows).collect();
        let column_levels: Vec<usize> = (nrows..nrows + ncols).collect();
        self.rows.apply(&project(&strands, &row_levels), &self.kernels);
        self.columns
            .apply(&project(&strands, &column_levels), &self.kernels);
        for (d, tree) in self.cells.iter_mut().enumerate() {
            let levels: Vec<usize> = (0..=d).chain(nrows..nrows + ncols).collect();
            merge_strands(tree, &project(&strands, &levels), &self.kernels);
        }
        self.tracker.record_strands(batch, &strands);
        Ok(())
    }

    fn step_end(&mut self) {
        self.tracker.step_end("grid");
    }

    fn has_deltas(&self) -> bool {
        self.tracker.has_deltas()
    }

    fn reset(&mut self) {
        self.rows.clear();
        self.columns.clear();
        for tree in &mut self.cells {
            tree.clear();
        }
        self.tracker.reset();
    }
}

impl Presentation for Context2 {
    fn num_rows(&self) -> usize {
        self.rows.len()
    }

    fn num_columns(&self) -> usize {
        self.columns.len() * self.num_aggregates()
    }

    fn get_data(&self, rows: Range<usize>, cols: Range<usize>) -> Vec<Vec<Scalar>> {
        let rows = clamp(rows, self.num_rows());
        let cols = clamp(cols, self.num_columns());
        rows.map(|r| {
            let rpath = self.rows.path(r);
            cols.clone().map(|c| self.value_at(&rpath, c)).collect()
        })
        .collect()
    }

    fn get_row_path(&self, row: usize) -> Vec<Scalar> {
        self.rows.path(row)
    }

    /// The path of a column is its column-axis path followed by the
    /// aggregate name.
    fn get_column_path(&self, col: usize) -> Vec<Scalar> {
        if col >= self.num_columns() {
            return Vec::new();
        }
        let n = self.num_aggregates();
        let mut path = self.columns.path(col / n);
        path.push(Scalar::from(self.resolved.aggregates[col % n].name.as_str()));
        path
    }

    fn expand(&mut self, row: usize) -> usize {
        self.rows.expand(row)
    }

    fn collapse(&mut self, row: usize) -> usize {
        self.rows.collapse(row)
    }

    fn set_depth(&mut self, depth: usize) {
        self.rows.set_depth(depth);
    }

    /// Sorts rows by their row-total aggregates.
    fn sort_by(&mut self, sorts: &[SortSpec]) {
        let sorts = aggregate_sorts(&self.config, sorts);
        self.resolved.sorts = sorts.clone();
        self.rows.sort_by(sorts);
    }

    fn get_row_delta(&mut self) -> RowDelta {
        self.tracker.take()
    }

    fn get_min_max(&self, col: usize) -> Option<(Scalar, Scalar)> {
        if col >= self.num_columns() || self.columns.is_total(col / self.num_aggregates()) {
            return None;
        }
        min_max(
            (0..self.num_rows())
                .filter(|r| !self.rows.is_total(*r))
                .map(|r| self.value_at(&self.rows.path(r), col)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::schema::SchemaBuilder;
    use tessera_core::DataType;
    use tessera_incremental::{GraphNode, Operation};
    use tessera_pivot::{AggKind, AggSpec, ConfigBuilder, Totals};

    fn schema() -> Schema {
        SchemaBuilder::new("sales")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_column("city", DataType::Str)
            .unwrap()
            .add_column("year", DataType::Int32)
            .unwrap()
            .add_column("sales", DataType::Int64)
            .unwrap()
            .primary_key("id")
            .unwrap()
            .build()
            .unwrap()
    }

    fn config() -> ConfigBuilder {
        Config::builder()
            .row_pivot("city")
            .column_pivot("year")
            .aggregate(AggSpec::new("total", AggKind::Sum, "sales"))
            .aggregate(AggSpec::new("rows", AggKind::Count, "sales"))
    }

    fn loaded(config: Config) -> GraphNode<Context2> {
        let mut node = GraphNode::new(0, schema(), 1).unwrap();
        node.register_context("grid", Context2::new(&schema(), config).unwrap())
            .unwrap();
        node.send(
            0,
            &[
                Operation::insert(1i64).set("city", "NY").set("year", 2020i32).set("sales", 10i64),
                Operation::insert(2i64).set("city", "NY").set("year", 2021i32).set("sales", 20i64),
                Operation::insert(3i64).set("city", "LA").set("year", 2021i32).set("sales", 5i64),
            ],
        )
        .unwrap();
        node.process().unwrap();
        node
    }

    #[test]
    fn test_grid_layout() {
        let node = loaded(config().build().unwrap());
        let ctx = node.context("grid").unwrap();
        // rows: total, LA, NY; columns: total, 2020, 2021
        assert_eq!(ctx.num_rows(), 3);
        assert_eq!(ctx.num_columns(), 6);
        assert_eq!(ctx.get_column_path(0), vec![Scalar::from("total")]);
        assert_eq!(
            ctx.get_column_path(5),
            vec![Scalar::Int32(2021), Scalar::from("rows")]
        );
        assert!(ctx.get_column_path(6).is_empty());
        assert_eq!(ctx.get_row_path(1), vec![Scalar::from("LA")]);
    }

    #[test]
    fn test_grid_cells() {
        let node = loaded(config().build().unwrap());
        let ctx = node.context("grid").unwrap();
        let data = ctx.get_data(0..3, 0..6);
        assert_eq!(
            data[0],
            vec![
                Scalar::Int64(35),
                Scalar::Int64(3),
                Scalar::Int64(10),
                Scalar::Int64(1),
                Scalar::Int64(25),
                Scalar::Int64(2),
            ]
        );
        // LA never sold in 2020
        assert_eq!(data[1][2], Scalar::None);
        assert_eq!(data[1][4], Scalar::Int64(5));
        assert_eq!(data[2][0], Scalar::Int64(30));
        assert_eq!(data[2][4], Scalar::Int64(20));
        assert_eq!(
            ctx.get_cell_values(&[Scalar::from("NY")], &[Scalar::Int32(2020)]),
            Some(vec![Scalar::Int64(10), Scalar::Int64(1)])
        );
        assert_eq!(ctx.get_cell_count(&[Scalar::from("LA")], &[Scalar::Int32(2020)]), 0);
        assert_eq!(
            ctx.get_min_max(4),
            Some((Scalar::Int64(5), Scalar::Int64(20)))
        );
        assert_eq!(ctx.get_min_max(0), None);
    }

    #[test]
    fn test_grid_move_between_columns() {
        let mut node = loaded(config().build().unwrap());
        node.context_mut("grid").unwrap().get_row_delta();
        node.send(0, &[Operation::insert(1i64).set("year", 2021i32)])
            .unwrap();
        node.process().unwrap();
        let ctx = node.context_mut("grid").unwrap();
        // 2020 is gone
        assert_eq!(ctx.num_columns(), 4);
        assert_eq!(
            ctx.get_cell_values(&[Scalar::from("NY")], &[Scalar::Int32(2021)]),
            Some(vec![Scalar::Int64(30), Scalar::Int64(2)])
        );
        let delta = ctx.get_row_delta();
        assert_eq!(delta.pkeys, vec![Scalar::Int64(1)]);
        assert_eq!(delta.data[0][2], Scalar::Int32(2021));
    }

    #[test]
    fn test_grid_collapse_columns_and_hidden_totals() {
        let mut node = loaded(config().totals(Totals::Hidden).build().unwrap());
        let ctx = node.context_mut("grid").unwrap();
        assert_eq!(ctx.num_rows(), 2);
        assert_eq!(ctx.num_columns(), 4);
        assert_eq!(ctx.get_column_path(0), vec![Scalar::Int32(2020), Scalar::from("total")]);
        ctx.set_column_depth(0);
        assert_eq!(ctx.num_columns(), 0);
        ctx.set_column_depth(1);
        assert_eq!(ctx.num_column_nodes(), 2);
        assert_eq!(ctx.expand_column(99), 0);
        assert_eq!(ctx.collapse_column(99), 0);
    }

    #[test]
    fn test_grid_needs_column_pivots() {
        let config = Config::builder()
            .row_pivot("city")
            .aggregate(AggSpec::new("total", AggKind::Sum, "sales"))
            .build()
            .unwrap();
        assert!(Context2::new(&schema(), config).is_err());
    }
}
