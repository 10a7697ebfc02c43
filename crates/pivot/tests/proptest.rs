//! Property-based tests for tessera-pivot using proptest.

use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tessera_core::schema::{Schema, SchemaBuilder};
use tessera_core::{DataType, Scalar};
use tessera_incremental::{flatten, Operation};
use tessera_pivot::{
    build_strands, compute, AggKind, AggSpec, Config, DenseTree, Kernel, Resolved, STree,
    SortOrder, StrandSpec, Traversal,
};
use tessera_storage::MasterState;

const CITIES: [&str; 3] = ["LA", "NY", "SF"];
const SUBS: [&str; 2] = ["x", "y"];

fn schema() -> Schema {
    SchemaBuilder::new("sales")
        .unwrap()
        .add_column("id", DataType::Int32)
        .unwrap()
        .add_column("city", DataType::Str)
        .unwrap()
        .add_column("sub", DataType::Str)
        .unwrap()
        .add_column("sales", DataType::Int64)
        .unwrap()
        .primary_key("id")
        .unwrap()
        .build()
        .unwrap()
}

fn sorts() -> Vec<(usize, SortOrder)> {
    vec![(0, SortOrder::Desc)]
}

struct Pipeline {
    state: MasterState,
    resolved: Resolved,
    tree: STree,
    trav: Traversal,
}

impl Pipeline {
    fn new() -> Self {
        let config = Config::builder()
            .row_pivot("city")
            .row_pivot("sub")
            .aggregate(AggSpec::new("sum", AggKind::Sum, "sales"))
            .aggregate(AggSpec::new("count", AggKind::Count, "sales"))
            .aggregate(AggSpec::new("max", AggKind::HighWaterMark, "sales"))
            .build()
            .unwrap();
        let resolved = config.resolve(&schema()).unwrap();
        let tree = STree::new(2, &resolved.aggregates);
        let trav = Traversal::new(&tree, 2, sorts());
        Self {
            state: MasterState::new(schema()),
            resolved,
            tree,
            trav,
        }
    }

    fn apply(&mut self, ops: &[Operation]) {
        let resolved_ops: Vec<_> = ops
            .iter()
            .map(|op| op.resolve(self.state.schema()).unwrap())
            .collect();
        let batch = flatten(&resolved_ops, &self.state).unwrap();
        self.state
            .update_master_table(&batch.current, &batch.exists)
            .unwrap();
        let spec = StrandSpec {
            pivots: &self.resolved.row_pivots,
            aggregates: &self.resolved.aggregates,
            filter: &self.resolved.filter,
        };
        let strands = build_strands(&batch, &spec);
        let dtree = DenseTree::build(&strands, 2);
        let kernels: Vec<Kernel> = self.resolved.aggregates.iter().map(|a| a.kernel).collect();
        let aggs = compute(&dtree, &strands, &kernels);
        let result = self.tree.merge(&dtree, &aggs, &strands);
        self.trav.update(&self.tree, &result);
    }
}

#[derive(Clone, Debug)]
enum Step {
    Insert(i32, usize, usize, i64),
    Update(i32, i64),
    Move(i32, usize),
    Delete(i32),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0i32..10, 0usize..3, 0usize..2, -50i64..50)
            .prop_map(|(k, c, s, v)| Step::Insert(k, c, s, v)),
        (0i32..10, -50i64..50).prop_map(|(k, v)| Step::Update(k, v)),
        (0i32..10, 0usize..3).prop_map(|(k, c)| Step::Move(k, c)),
        (0i32..10).prop_map(Step::Delete),
    ]
}

fn to_op(step: &Step) -> Operation {
    match step {
        Step::Insert(k, c, s, v) => Operation::insert(*k)
            .set("city", CITIES[*c])
            .set("sub", SUBS[*s])
            .set("sales", *v),
        Step::Update(k, v) => Operation::insert(*k).set("sales", *v),
        Step::Move(k, c) => Operation::insert(*k).set("city", CITIES[*c]),
        Step::Delete(k) => Operation::delete(*k),
    }
}

type Row = (Scalar, Scalar, Option<i64>);

fn apply_model(model: &mut BTreeMap<i32, Row>, step: &Step) {
    match step {
        Step::Insert(k, c, s, v) => {
            model.insert(*k, (Scalar::from(CITIES[*c]), Scalar::from(SUBS[*s]), Some(*v)));
        }
        Step::Update(k, v) => {
            model.entry(*k).or_insert((Scalar::None, Scalar::None, None)).2 = Some(*v);
        }
        Step::Move(k, c) => {
            model.entry(*k).or_insert((Scalar::None, Scalar::None, None)).0 = Scalar::from(CITIES[*c]);
        }
        Step::Delete(k) => {
            model.remove(k);
        }
    }
}

/// Expected (rows, sum, max) for every path prefix, root included.
fn expected(model: &BTreeMap<i32, Row>) -> BTreeMap<Vec<Scalar>, (i64, i64, Option<i64>)> {
    let mut groups: BTreeMap<Vec<Scalar>, (i64, i64, Option<i64>)> = BTreeMap::new();
    groups.insert(Vec::new(), (0, 0, None));
    for (city, sub, sales) in model.values() {
        for path in [Vec::new(), vec![city.clone()], vec![city.clone(), sub.clone()]] {
            let entry = groups.entry(path).or_insert((0, 0, None));
            entry.0 += 1;
            if let Some(v) = sales {
                entry.1 += v;
                entry.2 = Some(entry.2.map_or(*v, |m| m.max(*v)));
            }
        }
    }
    groups
}

fn check_tree(pipeline: &Pipeline, model: &BTreeMap<i32, Row>) -> Result<(), TestCaseError> {
    let tree = &pipeline.tree;
    let groups = expected(model);
    prop_assert_eq!(tree.len(), groups.len());
    for (path, (rows, sum, max)) in &groups {
        let id = tree.find_path(path);
        prop_assert!(id.is_some(), "missing node {:?}", path);
        let id = id.unwrap();
        prop_assert_eq!(tree.count(id), *rows);
        prop_assert_eq!(tree.get_aggregate(id, 0), Scalar::Int64(*sum));
        // count is the live row count, null inputs included
        prop_assert_eq!(tree.get_aggregate(id, 1), Scalar::Int64(*rows));
        prop_assert_eq!(tree.get_aggregate(id, 2), Scalar::Int64(max.unwrap_or(0)));
    }
    Ok(())
}

fn check_traversal(pipeline: &Pipeline) -> Result<(), TestCaseError> {
    let trav = &pipeline.trav;
    for (i, node) in trav.nodes().iter().enumerate() {
        let next = i + 1 + node.ndesc;
        prop_assert!(next <= trav.len());
        if let Some(sibling) = trav.get(next) {
            prop_assert!(sibling.depth <= node.depth);
        }
        if let Some(p) = trav.parent_index(i) {
            prop_assert_eq!(trav.get(p).unwrap().depth + 1, node.depth);
        }
    }
    let fresh = Traversal::new(&pipeline.tree, 2, sorts());
    prop_assert_eq!(trav.nodes(), fresh.nodes());
    Ok(())
}

proptest! {
    /// Aggregates and row counts match a recomputation after every batch,
    /// and nodes with no live rows are gone.
    #[test]
    fn tree_matches_model(batches in prop::collection::vec(prop::collection::vec(step(), 1..6), 1..12)) {
        let mut pipeline = Pipeline::new();
        let mut model = BTreeMap::new();
        for batch in &batches {
            let ops: Vec<Operation> = batch.iter().map(to_op).collect();
            pipeline.apply(&ops);
            for step in batch {
                apply_model(&mut model, step);
            }
            check_tree(&pipeline, &model)?;
        }
    }

    /// Incremental traversal maintenance agrees with a fresh layout.
    #[test]
    fn traversal_consistent(batches in prop::collection::vec(prop::collection::vec(step(), 1..6), 1..12)) {
        let mut pipeline = Pipeline::new();
        for batch in &batches {
            let ops: Vec<Operation> = batch.iter().map(to_op).collect();
            pipeline.apply(&ops);
            check_traversal(&pipeline)?;
        }
    }

    /// Splitting a step sequence into batches does not change the result.
    #[test]
    fn batching_is_associative(steps in prop::collection::vec(step(), 1..40), split in 1usize..8) {
        let ops: Vec<Operation> = steps.iter().map(to_op).collect();
        let mut whole = Pipeline::new();
        whole.apply(&ops);
        let mut chunked = Pipeline::new();
        for chunk in ops.chunks(split) {
            chunked.apply(chunk);
        }

        let paths: BTreeSet<Vec<Scalar>> = (0..whole.trav.len())
            .map(|i| whole.tree.get_path(whole.trav.tree_node(i).unwrap()))
            .collect();
        prop_assert_eq!(whole.tree.len(), chunked.tree.len());
        for path in paths {
            let a = whole.tree.find_path(&path).unwrap();
            let b = chunked.tree.find_path(&path);
            prop_assert!(b.is_some());
            let b = b.unwrap();
            for agg in 0..3 {
                prop_assert_eq!(whole.tree.get_aggregate(a, agg), chunked.tree.get_aggregate(b, agg));
            }
        }
    }

    /// Re-sending an applied batch of full inserts changes nothing.
    #[test]
    fn reapply_is_idempotent(rows in prop::collection::vec((0i32..10, 0usize..3, 0usize..2, -50i64..50), 1..20)) {
        let ops: Vec<Operation> = rows
            .iter()
            .map(|(k, c, s, v)| to_op(&Step::Insert(*k, *c, *s, *v)))
            .collect();
        let mut pipeline = Pipeline::new();
        pipeline.apply(&ops);
        let before: Vec<Scalar> = (0..pipeline.trav.len())
            .map(|i| pipeline.tree.get_aggregate(pipeline.trav.tree_node(i).unwrap(), 0))
            .collect();
        let layout = pipeline.trav.nodes().to_vec();

        pipeline.apply(&ops);
        let after: Vec<Scalar> = (0..pipeline.trav.len())
            .map(|i| pipeline.tree.get_aggregate(pipeline.trav.tree_node(i).unwrap(), 0))
            .collect();
        prop_assert_eq!(before, after);
        prop_assert_eq!(layout, pipeline.trav.nodes().to_vec());
    }

    /// Rolling up partial reductions equals reducing the union.
    #[test]
    fn roll_up_is_associative(values in prop::collection::vec(-1000i64..1000, 0..50), split in 0usize..50) {
        let split = split.min(values.len());
        let kernels = [
            Kernel::Sum(DataType::Int64),
            Kernel::Count,
            Kernel::Mean,
            Kernel::HighWaterMark(DataType::Int64),
            Kernel::LowWaterMark(DataType::Int64),
        ];
        for kernel in kernels {
            let inputs: Vec<Scalar> = values
                .iter()
                .map(|v| kernel.prepare(&Scalar::Int64(*v), &Scalar::None))
                .collect();
            let (a, b) = inputs.split_at(split);
            // An empty water mark reduces to the canonical value, not an identity.
            if !kernel.is_rolling() && (a.is_empty() || b.is_empty()) {
                continue;
            }
            let whole = kernel.reduce(inputs.iter());
            let parts = kernel.roll_up(&kernel.reduce(a.iter()), &kernel.reduce(b.iter()));
            prop_assert_eq!(parts, whole, "{:?}", kernel);
        }
    }
}
