//! Tessera View - The contexts callers read from.
//!
//! This crate registers on a graph node and presents one configuration of
//! the table: flat, pivoted by rows, or pivoted on both axes.
//!
//! # Core Concepts
//!
//! - `Context0`: Filtered, sorted table rows
//! - `Context1`: One row per visible node of the row pivot tree
//! - `Context2`: Row and column pivot trees with a cell per pair
//! - `View`: One of the three, picked from the configuration
//! - `Presentation`: Counts, cell data, paths, expand/collapse and deltas
//! - `RowDelta`: Primary keys changed since the last drain
//!
//! # Example
//!
//! ```rust
//! use tessera_core::schema::SchemaBuilder;
//! use tessera_core::{DataType, Scalar};
//! use tessera_incremental::{GraphNode, Operation};
//! use tessera_pivot::{AggKind, AggSpec, Config};
//! use tessera_view::{Presentation, View};
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
//!
//! let mut node = GraphNode::new(0, schema.clone(), 1).unwrap();
//! node.register_context("by_city", View::new(&schema, config).unwrap())
//!     .unwrap();
//! node.send(0, &[
//!     Operation::insert(1i64).set("city", "NY").set("sales", 10i64),
//!     Operation::insert(2i64).set("city", "NY").set("sales", 20i64),
//! ])
//! .unwrap();
//! node.process().unwrap();
//!
//! let view = node.context("by_city").unwrap();
//! assert_eq!(view.num_rows(), 2);
//! assert_eq!(view.get_data(0..2, 0..1)[1], vec![Scalar::Int64(30)]);
//! ```

mod axis;
pub mod delta;
pub mod flat;
pub mod grid;
pub mod rows;
pub mod view;

pub use delta::{RowDelta, StepTracker};
pub use flat::Context0;
pub use grid::Context2;
pub use rows::Context1;
pub use view::{Presentation, View};
