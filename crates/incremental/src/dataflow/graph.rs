//! The graph node pool.

use crate::dataflow::node::{Context, GnodeId, GraphNode};
use crate::op::Operation;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tessera_core::schema::Schema;
use tessera_core::{Error, Result};
use tracing::debug;

struct Registry<C> {
    next_id: GnodeId,
    gnodes: BTreeMap<GnodeId, GraphNode<C>>,
}

/// Registry of graph nodes, keyed by id.
///
/// A shared/exclusive lock guards the registry: `read` takes it shared,
/// everything that mutates a node takes it exclusive. Work is synchronous.
pub struct Pool<C> {
    registry: RwLock<Registry<C>>,
}

impl<C: Context> Default for Pool<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Context> Pool<C> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry {
                next_id: 0,
                gnodes: BTreeMap::new(),
            }),
        }
    }

    /// Creates a graph node for `schema` and returns its id.
    pub fn register_gnode(&self, schema: Schema, num_ports: usize) -> Result<GnodeId> {
        let mut reg = self.registry.write();
        let id = reg.next_id;
        let gnode = GraphNode::new(id, schema, num_ports)?;
        reg.next_id += 1;
        reg.gnodes.insert(id, gnode);
        debug!(gnode = id, num_ports, "registered graph node");
        Ok(id)
    }

    /// Removes a graph node and its contexts.
    pub fn unregister_gnode(&self, id: GnodeId) -> Result<()> {
        match self.registry.write().gnodes.remove(&id) {
            Some(_) => {
                debug!(gnode = id, "unregistered graph node");
                Ok(())
            }
            None => Err(Error::GraphNodeNotFound(id)),
        }
    }

    /// Queues a batch on a graph node's port.
    pub fn send(&self, id: GnodeId, port: usize, batch: &[Operation]) -> Result<()> {
        self.write(id, |gnode| gnode.send(port, batch))?
    }

    /// Processes every graph node with pending batches, in id order.
    ///
    /// Returns the ids of the nodes that processed something.
    pub fn process(&self) -> Result<Vec<GnodeId>> {
        let mut reg = self.registry.write();
        let mut processed = Vec::new();
        for (id, gnode) in reg.gnodes.iter_mut() {
            if gnode.process()? {
                processed.push(*id);
            }
        }
        Ok(processed)
    }

    /// Registers a context on a graph node.
    pub fn register_context(&self, id: GnodeId, name: &str, ctx: C) -> Result<()> {
        self.write(id, |gnode| gnode.register_context(name, ctx))?
    }

    /// Rebuilds a context from its graph node's master state.
    pub fn resync_context(&self, id: GnodeId, name: &str) -> Result<()> {
        self.write(id, |gnode| gnode.resync_context(name))?
    }

    /// Unregisters a context from a graph node and returns it.
    pub fn unregister_context(&self, id: GnodeId, name: &str) -> Result<C> {
        self.write(id, |gnode| gnode.unregister_context(name))?
    }

    /// Returns the (gnode, context) pairs changed by each node's last step.
    pub fn get_contexts_last_updated(&self) -> Vec<(GnodeId, String)> {
        let reg = self.registry.read();
        reg.gnodes
            .iter()
            .flat_map(|(id, gnode)| {
                gnode
                    .get_contexts_last_updated()
                    .iter()
                    .map(move |name| (*id, name.clone()))
            })
            .collect()
    }

    /// Returns the ids of nodes updated since the last call, clearing the flags.
    pub fn get_gnodes_last_updated(&self) -> Vec<GnodeId> {
        let mut reg = self.registry.write();
        reg.gnodes
            .iter_mut()
            .filter_map(|(id, gnode)| gnode.take_updated().then_some(*id))
            .collect()
    }

    /// Runs `f` with shared access to a graph node.
    pub fn read<R>(&self, id: GnodeId, f: impl FnOnce(&GraphNode<C>) -> R) -> Result<R> {
        let reg = self.registry.read();
        reg.gnodes
            .get(&id)
            .map(f)
            .ok_or(Error::GraphNodeNotFound(id))
    }

    /// Runs `f` with exclusive access to a graph node.
    pub fn write<R>(&self, id: GnodeId, f: impl FnOnce(&mut GraphNode<C>) -> R) -> Result<R> {
        let mut reg = self.registry.write();
        reg.gnodes
            .get_mut(&id)
            .map(f)
            .ok_or(Error::GraphNodeNotFound(id))
    }

    /// Returns the number of graph nodes.
    pub fn len(&self) -> usize {
        self.registry.read().gnodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.read().gnodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::FlattenedBatch;
    use tessera_core::schema::SchemaBuilder;
    use tessera_core::{DataType, Scalar};
    use tessera_storage::MasterState;

    #[derive(Default)]
    struct Counter {
        rows: usize,
        dirty: bool,
    }

    impl Context for Counter {
        fn step_begin(&mut self) {
            self.dirty = false;
        }
        fn notify(&mut self, batch: &FlattenedBatch, _state: &MasterState) -> Result<()> {
            self.rows += batch.len();
            self.dirty = !batch.is_empty();
            Ok(())
        }
        fn step_end(&mut self) {}
        fn has_deltas(&self) -> bool {
            self.dirty
        }
        fn reset(&mut self) {
            self.rows = 0;
        }
    }

    fn schema() -> Schema {
        SchemaBuilder::new("t")
            .unwrap()
            .add_column("id", DataType::Int32)
            .unwrap()
            .primary_key("id")
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_register_and_unregister() {
        let pool: Pool<Counter> = Pool::new();
        let a = pool.register_gnode(schema(), 1).unwrap();
        let b = pool.register_gnode(schema(), 1).unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(pool.len(), 2);
        pool.unregister_gnode(a).unwrap();
        assert!(matches!(pool.unregister_gnode(a), Err(Error::GraphNodeNotFound(0))));
        assert!(matches!(
            pool.send(a, 0, &[Operation::insert(1i32)]),
            Err(Error::GraphNodeNotFound(0))
        ));
        assert!(pool.register_gnode(schema(), 0).is_err());
        assert_eq!(pool.register_gnode(schema(), 1).unwrap(), 2);
    }

    #[test]
    fn test_process_reports_updates() {
        let pool: Pool<Counter> = Pool::new();
        let a = pool.register_gnode(schema(), 1).unwrap();
        let b = pool.register_gnode(schema(), 1).unwrap();
        pool.register_context(b, "ctx", Counter::default()).unwrap();
        pool.send(b, 0, &[Operation::insert(1i32), Operation::insert(2i32)])
            .unwrap();

        assert_eq!(pool.process().unwrap(), vec![b]);
        assert_eq!(pool.get_contexts_last_updated(), vec![(b, "ctx".to_string())]);
        assert_eq!(pool.get_gnodes_last_updated(), vec![b]);
        assert!(pool.get_gnodes_last_updated().is_empty());
        assert_eq!(pool.read(b, |g| g.context("ctx").map(|c| c.rows)).unwrap(), Some(2));
        assert_eq!(
            pool.read(b, |g| g.master().contains(&Scalar::Int32(2))).unwrap(),
            true
        );
        assert_eq!(pool.read(a, |g| g.master().len()).unwrap(), 0);

        // a resync replays the table instead of adding to it
        pool.resync_context(b, "ctx").unwrap();
        assert_eq!(pool.read(b, |g| g.context("ctx").map(|c| c.rows)).unwrap(), Some(2));
        assert!(pool.unregister_context(b, "ctx").is_ok());
        assert!(pool.resync_context(b, "ctx").is_err());
    }
}
