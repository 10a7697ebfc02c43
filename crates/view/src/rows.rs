//! Row-pivoted views.
//!
//! A `Context1` groups rows by its row pivots and shows one view row per
//! visible tree node, with one column per aggregate.

use crate::axis::Axis;
use crate::delta::{RowDelta, StepTracker};
use crate::view::{clamp, min_max, Presentation};
use core::ops::Range;
use tessera_core::schema::Schema;
use tessera_core::{Error, Result, Scalar};
use tessera_incremental::{Context, FlattenedBatch};
use tessera_pivot::{build_strands, Config, Kernel, Resolved, SortOrder, SortSpec, StrandSpec};
use tessera_storage::MasterState;
use tracing::warn;

/// Resolves sort targets to aggregate positions, skipping unknown ones.
pub(crate) fn aggregate_sorts(config: &Config, sorts: &[SortSpec]) -> Vec<(usize, SortOrder)> {
    let mut resolved = Vec::with_capacity(sorts.len());
    for sort in sorts {
        match config.aggregates().iter().position(|a| a.name == sort.target) {
            Some(idx) => resolved.push((idx, sort.order)),
            None => warn!(target = %sort.target, "ignoring sort on unknown aggregate"),
        }
    }
    resolved
}

/// A view with row pivots only.
#[derive(Clone, Debug)]
pub struct Context1 {
    config: Config,
    resolved: Resolved,
    kernels: Vec<Kernel>,
    rows: Axis,
    tracker: StepTracker,
}

impl Context1 {
    pub fn new(schema: &Schema, config: Config) -> Result<Self> {
        let resolved = config.resolve(schema)?;
        if !resolved.column_pivots.is_empty() {
            return Err(Error::invalid_config("a row view takes no column pivots"));
        }
        let kernels = resolved.aggregates.iter().map(|a| a.kernel).collect();
        let rows = Axis::new(
            resolved.row_pivots.len(),
            &resolved.aggregates,
            config.row_expand_depth(),
            resolved.sorts.clone(),
            config.totals(),
        );
        Ok(Self {
            config,
            resolved,
            kernels,
            rows,
            tracker: StepTracker::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the aggregate values of the tree node at a pivot path.
    pub fn get_path_values(&self, path: &[Scalar]) -> Option<Vec<Scalar>> {
        let tree = self.rows.tree();
        let id = tree.find_path(path)?;
        Some(
            (0..self.kernels.len())
                .map(|agg| tree.get_aggregate(id, agg))
                .collect(),
        )
    }

    /// Returns the live row count under a pivot path; 0 if absent.
    pub fn get_path_count(&self, path: &[Scalar]) -> i64 {
        let tree = self.rows.tree();
        tree.find_path(path).map(|id| tree.count(id)).unwrap_or(0)
    }

    /// Returns the primary keys under a full-depth pivot path.
    pub fn get_path_pkeys(&self, path: &[Scalar]) -> Vec<Scalar> {
        let tree = self.rows.tree();
        tree.find_path(path)
            .map(|id| tree.pkeys(id))
            .unwrap_or_default()
    }
}

impl Context for Context1 {
    fn step_begin(&mut self) {
        self.tracker.step_begin();
    }

    fn notify(&mut self, batch: &FlattenedBatch, _state: &MasterState) -> Result<()> {
        let spec = StrandSpec {
            pivots: &self.resolved.row_pivots,
            aggregates: &self.resolved.aggregates,
            filter: &self.resolved.filter,
        };
        let strands = build_strands(batch, &spec);
        self.rows.apply(&strands, &self.kernels);
        self.tracker.record_strands(batch, &strands);
        Ok(())
    }

    fn step_end(&mut self) {
        self.tracker.step_end("rows");
    }

    fn has_deltas(&self) -> bool {
        self.tracker.has_deltas()
    }

    fn reset(&mut self) {
        self.rows.clear();
        self.tracker.reset();
    }
}

impl Presentation for Context1 {
    fn num_rows(&self) -> usize {
        self.rows.len()
    }

    fn num_columns(&self) -> usize {
        self.kernels.len()
    }

    fn get_data(&self, rows: Range<usize>, cols: Range<usize>) -> Vec<Vec<Scalar>> {
        let rows = clamp(rows, self.num_rows());
        let cols = clamp(cols, self.num_columns());
        let tree = self.rows.tree();
        rows.filter_map(|r| self.rows.node(r))
            .map(|id| cols.clone().map(|c| tree.get_aggregate(id, c)).collect())
            .collect()
    }

    fn get_row_path(&self, row: usize) -> Vec<Scalar> {
        self.rows.path(row)
    }

    /// The path of a column is its aggregate name.
    fn get_column_path(&self, col: usize) -> Vec<Scalar> {
        self.resolved
            .aggregates
            .get(col)
            .map(|a| vec![Scalar::from(a.name.as_str())])
            .unwrap_or_default()
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

    fn sort_by(&mut self, sorts: &[SortSpec]) {
        let sorts = aggregate_sorts(&self.config, sorts);
        self.resolved.sorts = sorts.clone();
        self.rows.sort_by(sorts);
    }

    fn get_row_delta(&mut self) -> RowDelta {
        self.tracker.take()
    }

    fn get_min_max(&self, col: usize) -> Option<(Scalar, Scalar)> {
        if col >= self.num_columns() {
            return None;
        }
        let tree = self.rows.tree();
        min_max(
            (0..self.num_rows())
                .filter(|r| !self.rows.is_total(*r))
                .filter_map(|r| self.rows.node(r))
                .map(|id| tree.get_aggregate(id, col)),
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
            .add_column("region", DataType::Str)
            .unwrap()
            .add_column("city", DataType::Str)
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
            .row_pivot("region")
            .row_pivot("city")
            .aggregate(AggSpec::new("total", AggKind::Sum, "sales"))
    }

    fn loaded(config: Config) -> GraphNode<Context1> {
        let mut node = GraphNode::new(0, schema(), 1).unwrap();
        node.register_context("rows", Context1::new(&schema(), config).unwrap())
            .unwrap();
        node.send(
            0,
            &[
                Operation::insert(1i64).set("region", "east").set("city", "NY").set("sales", 10i64),
                Operation::insert(2i64).set("region", "east").set("city", "BO").set("sales", 5i64),
                Operation::insert(3i64).set("region", "west").set("city", "LA").set("sales", 7i64),
            ],
        )
        .unwrap();
        node.process().unwrap();
        node
    }

    fn paths(ctx: &Context1) -> Vec<Vec<Scalar>> {
        (0..ctx.num_rows()).map(|r| ctx.get_row_path(r)).collect()
    }

    #[test]
    fn test_layout_and_data() {
        let node = loaded(config().build().unwrap());
        let ctx = node.context("rows").unwrap();
        assert_eq!(ctx.num_rows(), 6);
        assert_eq!(ctx.num_columns(), 1);
        assert_eq!(
            paths(ctx)[..3],
            [
                vec![],
                vec![Scalar::from("east")],
                vec![Scalar::from("east"), Scalar::from("BO")],
            ]
        );
        assert_eq!(ctx.get_data(0..2, 0..1), vec![vec![Scalar::Int64(22)], vec![Scalar::Int64(15)]]);
        assert_eq!(ctx.get_column_path(0), vec![Scalar::from("total")]);
        assert_eq!(
            ctx.get_min_max(0),
            Some((Scalar::Int64(5), Scalar::Int64(15)))
        );
        assert_eq!(
            ctx.get_path_pkeys(&[Scalar::from("east"), Scalar::from("NY")]),
            vec![Scalar::Int64(1)]
        );
        assert_eq!(
            ctx.get_path_values(&[Scalar::from("west")]),
            Some(vec![Scalar::Int64(7)])
        );
        assert_eq!(ctx.get_path_count(&[Scalar::from("east")]), 2);
        assert_eq!(ctx.get_path_count(&[Scalar::from("north")]), 0);
        assert!(ctx.get_row_path(99).is_empty());
        assert!(ctx.get_data(99..100, 0..1).is_empty());
    }

    #[test]
    fn test_hidden_totals_and_depth() {
        let mut node = loaded(
            config()
                .totals(Totals::Hidden)
                .row_expand_depth(1)
                .build()
                .unwrap(),
        );
        let ctx = node.context_mut("rows").unwrap();
        assert_eq!(ctx.num_rows(), 2);
        assert_eq!(ctx.get_row_path(0), vec![Scalar::from("east")]);
        assert_eq!(ctx.expand(0), 2);
        assert_eq!(ctx.num_rows(), 4);
        assert_eq!(ctx.collapse(0), 2);
        ctx.set_depth(2);
        assert_eq!(ctx.num_rows(), 5);
        ctx.set_depth(0);
        assert_eq!(ctx.num_rows(), 0);
    }

    #[test]
    fn test_sort_by_aggregate() {
        let mut node = loaded(config().build().unwrap());
        let ctx = node.context_mut("rows").unwrap();
        ctx.sort_by(&[SortSpec::desc("total")]);
        assert_eq!(ctx.get_row_path(2), vec![Scalar::from("east"), Scalar::from("NY")]);
        ctx.sort_by(&[SortSpec::asc("missing")]);
        assert_eq!(ctx.get_row_path(2), vec![Scalar::from("east"), Scalar::from("BO")]);
    }

    #[test]
    fn test_column_pivots_rejected() {
        let config = config().column_pivot("city").build().unwrap();
        assert!(Context1::new(&schema(), config).is_err());
    }
}
