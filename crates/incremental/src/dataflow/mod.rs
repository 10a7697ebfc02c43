//! Graph nodes and the pool that schedules them.
//!
//! A graph node owns one master table and the contexts registered on it; the
//! pool owns every graph node behind a shared/exclusive lock.

mod graph;
pub mod node;

pub use graph::Pool;
pub use node::{Context, GnodeId, GraphNode};
