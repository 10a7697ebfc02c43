//! Graph nodes.
//!
//! A `GraphNode` owns one master table and the contexts registered on it.
//! Batches are queued per input port by `send` and applied by `process`.

use crate::flatten::{flatten, snapshot, FlattenedBatch};
use crate::op::{Operation, ResolvedOp};
use parking_lot::RwLockReadGuard;
use std::collections::{BTreeMap, VecDeque};
use tessera_core::schema::Schema;
use tessera_core::{Error, Result};
use tessera_storage::{MasterHandle, MasterState};
use tracing::{debug, warn};

/// Unique identifier for a graph node.
pub type GnodeId = u32;

/// A consumer of flattened batches.
///
/// Every processing step calls `step_begin`, then `notify` with the batch and
/// the master state after the batch was applied, then `step_end`.
pub trait Context {
    /// Resets per-step bookkeeping.
    fn step_begin(&mut self);

    /// Applies one flattened batch.
    fn notify(&mut self, batch: &FlattenedBatch, state: &MasterState) -> Result<()>;

    /// Finishes the step.
    fn step_end(&mut self);

    /// Returns true if the last step produced visible changes.
    fn has_deltas(&self) -> bool;

    /// Drops all derived state.
    fn reset(&mut self);

    /// Receives a handle to the node's master state at registration, before
    /// the table is replayed. Contexts that read rows between steps keep it.
    fn attach(&mut self, _master: &MasterHandle) {}
}

/// A node in the processing graph: one table and its contexts.
pub struct GraphNode<C> {
    id: GnodeId,
    num_ports: usize,
    pending: VecDeque<(usize, Vec<ResolvedOp>)>,
    schema: Schema,
    state: MasterHandle,
    contexts: BTreeMap<String, C>,
    updated: bool,
    last_updated: Vec<String>,
    generation: u64,
}

impl<C: Context> GraphNode<C> {
    /// Creates a graph node with `num_ports` input ports.
    pub fn new(id: GnodeId, schema: Schema, num_ports: usize) -> Result<Self> {
        if num_ports == 0 {
            return Err(Error::invalid_operation("a graph node needs at least one port"));
        }
        Ok(Self {
            id,
            num_ports,
            pending: VecDeque::new(),
            state: MasterHandle::new(MasterState::new(schema.clone())),
            schema,
            contexts: BTreeMap::new(),
            updated: false,
            last_updated: Vec::new(),
            generation: 0,
        })
    }

    #[inline]
    pub fn id(&self) -> GnodeId {
        self.id
    }

    #[inline]
    pub fn num_ports(&self) -> usize {
        self.num_ports
    }

    /// Returns the table schema.
    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Locks the master state for reading.
    #[inline]
    pub fn master(&self) -> RwLockReadGuard<'_, MasterState> {
        self.state.read()
    }

    /// Returns the number of completed processing steps.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true if batches are waiting to be processed.
    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Queues a batch on an input port.
    ///
    /// The whole batch is validated against the schema first; a batch with
    /// any invalid operation is rejected without queuing anything.
    pub fn send(&mut self, port: usize, batch: &[Operation]) -> Result<()> {
        if port >= self.num_ports {
            return Err(Error::PortNotFound {
                gnode: self.id,
                port,
            });
        }
        let resolved = batch
            .iter()
            .map(|op| op.resolve(&self.schema))
            .collect::<Result<Vec<_>>>()?;
        self.pending.push_back((port, resolved));
        Ok(())
    }

    /// Applies every queued batch as one step.
    ///
    /// Batches are concatenated in send order, flattened against the master
    /// state, written to it, and then passed to every context in name order.
    /// Returns whether anything was processed.
    ///
    /// The master state is committed before any context is notified. If a
    /// context fails, processing stops at that context and the error is
    /// returned: it and the contexts after it have not seen the batch, and
    /// the step does not count as completed. `resync_context` rebuilds a
    /// context from the committed master state.
    pub fn process(&mut self) -> Result<bool> {
        if self.pending.is_empty() {
            return Ok(false);
        }
        let ops: Vec<ResolvedOp> = self.pending.drain(..).flat_map(|(_, ops)| ops).collect();
        let batch = flatten(&ops, &self.state.read())?;
        self.state
            .write()
            .update_master_table(&batch.current, &batch.exists)?;

        let state = self.state.read();
        self.last_updated.clear();
        for (name, ctx) in self.contexts.iter_mut() {
            ctx.step_begin();
            if let Err(err) = ctx.notify(&batch, &state) {
                warn!(gnode = self.id, context = %name, error = %err, "context failed to apply batch");
                return Err(err);
            }
            ctx.step_end();
            if ctx.has_deltas() {
                self.last_updated.push(name.clone());
            }
        }
        let live = state.len();
        drop(state);

        self.generation += 1;
        self.updated = true;
        debug!(
            gnode = self.id,
            ops = ops.len(),
            rows = batch.len(),
            live,
            contexts_updated = self.last_updated.len(),
            "processed batch"
        );
        Ok(true)
    }

    /// Replays the live table into a context as one all-insert step.
    fn replay(state: &MasterState, ctx: &mut C) -> Result<()> {
        if state.is_empty() {
            return Ok(());
        }
        let batch = snapshot(state)?;
        ctx.step_begin();
        ctx.notify(&batch, state)?;
        ctx.step_end();
        Ok(())
    }

    /// Registers a context, replaying the current table into it.
    pub fn register_context(&mut self, name: &str, mut ctx: C) -> Result<()> {
        if self.contexts.contains_key(name) {
            return Err(Error::DuplicateContext(name.to_string()));
        }
        ctx.attach(&self.state);
        let state = self.state.read();
        Self::replay(&state, &mut ctx)?;
        debug!(gnode = self.id, context = name, rows = state.len(), "registered context");
        drop(state);
        self.contexts.insert(name.to_string(), ctx);
        Ok(())
    }

    /// Drops a context's derived state and replays the current table into
    /// it, bringing it back in line with the master state.
    pub fn resync_context(&mut self, name: &str) -> Result<()> {
        let ctx = self
            .contexts
            .get_mut(name)
            .ok_or_else(|| Error::ContextNotFound(name.to_string()))?;
        ctx.reset();
        let state = self.state.read();
        Self::replay(&state, ctx)?;
        debug!(gnode = self.id, context = name, rows = state.len(), "resynced context");
        Ok(())
    }

    /// Removes a context and returns it.
    pub fn unregister_context(&mut self, name: &str) -> Result<C> {
        self.last_updated.retain(|n| n != name);
        self.contexts
            .remove(name)
            .ok_or_else(|| Error::ContextNotFound(name.to_string()))
    }

    pub fn context(&self, name: &str) -> Option<&C> {
        self.contexts.get(name)
    }

    pub fn context_mut(&mut self, name: &str) -> Option<&mut C> {
        self.contexts.get_mut(name)
    }

    /// Returns the registered context names in order.
    pub fn context_names(&self) -> Vec<&str> {
        self.contexts.keys().map(|k| k.as_str()).collect()
    }

    /// Returns the contexts that reported changes in the last step.
    pub fn get_contexts_last_updated(&self) -> &[String] {
        &self.last_updated
    }

    /// Returns true if the node processed a batch since the flag was taken.
    #[inline]
    pub fn was_updated(&self) -> bool {
        self.updated
    }

    /// Returns and clears the updated flag.
    pub fn take_updated(&mut self) -> bool {
        std::mem::take(&mut self.updated)
    }
}
