//! Tessera Incremental - Batch flattening and graph nodes.
//!
//! This crate turns streamed row operations into flattened batches and
//! drives them through the contexts registered on a table.
//!
//! # Core Concepts
//!
//! - `Operation`: A keyed Insert, Delete or Clear sent to a graph node
//! - `FlattenedBatch`: One net operation per key with prior/post images,
//!   deltas and per-cell `Transition`s
//! - `GraphNode`: Owns a `MasterState` and the `Context`s fed from it
//! - `Pool`: The graph node registry, guarded by a shared/exclusive lock
//!
//! # Example
//!
//! ```rust
//! use tessera_core::schema::SchemaBuilder;
//! use tessera_core::{DataType, Scalar};
//! use tessera_incremental::{flatten, Operation};
//! use tessera_storage::MasterState;
//!
//! let schema = SchemaBuilder::new("sales")
//!     .unwrap()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .add_column("sales", DataType::Int64)
//!     .unwrap()
//!     .primary_key("id")
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! let state = MasterState::new(schema);
//!
//! let ops = vec![
//!     Operation::insert(1i64).set("sales", 10i64),
//!     Operation::insert(1i64).set("sales", 15i64),
//! ];
//! let resolved: Vec<_> = ops.iter().map(|op| op.resolve(state.schema()).unwrap()).collect();
//! let batch = flatten(&resolved, &state).unwrap();
//!
//! assert_eq!(batch.len(), 1);
//! assert_eq!(batch.current.get("sales", 0), Scalar::Int64(15));
//! ```

pub mod dataflow;
pub mod flatten;
pub mod op;
pub mod transition;

pub use dataflow::{Context, GnodeId, GraphNode, Pool};
pub use flatten::{flatten, snapshot, FlattenedBatch};
pub use op::{OpKind, Operation, ResolvedOp};
pub use transition::{classify, CellState, Transition, TransitionTable};
