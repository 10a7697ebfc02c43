//! Tessera Pivot - Grouping trees, aggregates and traversal.
//!
//! This crate turns flattened batches into incrementally maintained pivot
//! trees and the ordered row sequences shown to callers.
//!
//! # Core Concepts
//!
//! - `Config`: Pivots, aggregates, filters and sorts of one view
//! - `Strand`: One row's contribution to one grouping path in a batch
//! - `DenseTree`: The per-batch grouping tree over the strands
//! - `Kernel`: An aggregate implementation resolved once per spec
//! - `STree`: The persistent tree, merged from one batch tree per step
//! - `Traversal`: Visible tree rows in display order, with expand/collapse
//! - `FlatIndex`: Sorted primary keys for views without pivots
//!
//! # Example
//!
//! ```rust
//! use tessera_core::schema::SchemaBuilder;
//! use tessera_core::{DataType, Scalar};
//! use tessera_incremental::{flatten, Operation};
//! use tessera_pivot::{
//!     build_strands, compute, AggKind, AggSpec, Config, DenseTree, STree, StrandSpec, Traversal,
//! };
//! use tessera_storage::MasterState;
//!
//! let schema = SchemaBuilder::new("sales")
//!     .unwrap()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .add_column("city", DataType::Str)
//!     .unwrap()
//!     .add_column("sales", DataType::Int64)
//!     .unwrap()
//!     .primary_key("id")
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! let config = Config::builder()
//!     .row_pivot("city")
//!     .aggregate(AggSpec::new("total", AggKind::Sum, "sales"))
//!     .build()
//!     .unwrap();
//! let resolved = config.resolve(&schema).unwrap();
//!
//! let mut state = MasterState::new(schema);
//! let ops = vec![
//!     Operation::insert(1i64).set("city", "NY").set("sales", 10i64),
//!     Operation::insert(2i64).set("city", "NY").set("sales", 20i64),
//! ];
//! let resolved_ops: Vec<_> = ops.iter().map(|op| op.resolve(state.schema()).unwrap()).collect();
//! let batch = flatten(&resolved_ops, &state).unwrap();
//! state.update_master_table(&batch.current, &batch.exists).unwrap();
//!
//! let spec = StrandSpec {
//!     pivots: &resolved.row_pivots,
//!     aggregates: &resolved.aggregates,
//!     filter: &resolved.filter,
//! };
//! let strands = build_strands(&batch, &spec);
//! let dtree = DenseTree::build(&strands, 1);
//! let kernels: Vec<_> = resolved.aggregates.iter().map(|a| a.kernel).collect();
//! let aggs = compute(&dtree, &strands, &kernels);
//!
//! let mut tree = STree::new(1, &resolved.aggregates);
//! tree.merge(&dtree, &aggs, &strands);
//! let trav = Traversal::new(&tree, 1, Vec::new());
//!
//! assert_eq!(trav.len(), 2);
//! assert_eq!(tree.get_aggregate(tree.root(), 0), Scalar::Int64(30));
//! ```

pub mod aggregate;
pub mod config;
pub mod dtree;
pub mod filter;
pub mod flat;
pub mod strand;
pub mod stree;
pub mod traversal;

pub use aggregate::{compute, compute_dense, AggCell, BatchAggregates, Kernel, Slot};
pub use config::{
    AggKind, AggSpec, Config, ConfigBuilder, InvalidMode, Pivot, Resolved, ResolvedAgg,
    ResolvedPivot, SortOrder, SortSpec, Totals,
};
pub use dtree::{DenseNode, DenseTree};
pub use filter::{EvalType, FilterOp, FilterSet, FilterTerm};
pub use flat::FlatIndex;
pub use strand::{build_strands, project, Strand, StrandSpec};
pub use stree::{MergeResult, NodeId, STree, ROOT};
pub use traversal::{TravNode, Traversal};
