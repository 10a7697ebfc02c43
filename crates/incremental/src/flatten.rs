//! Batch flattening.
//!
//! A batch may touch the same key several times. Flattening reduces it to one
//! net operation per key, looks up the prior row in the master state, and
//! materializes the prior image, post image, delta and per-cell transitions,
//! all aligned row for row and ordered by primary key.

use crate::op::{OpKind, ResolvedOp};
use crate::transition::{classify, CellState, Transition, TransitionTable};
use std::collections::BTreeMap;
use tessera_core::schema::Schema;
use tessera_core::{DataTable, DataType, Result, Scalar};
use tessera_storage::MasterState;

/// The net effect of a batch on one key.
#[derive(Clone, Debug)]
struct NetOp {
    kind: OpKind,
    /// Unprovided cells become invalid instead of keeping their prior value
    reset: bool,
    cells: Vec<Option<Scalar>>,
}

impl NetOp {
    fn empty(kind: OpKind, reset: bool, width: usize) -> Self {
        Self {
            kind,
            reset,
            cells: vec![None; width],
        }
    }

    fn write(&mut self, values: &[(usize, Scalar)]) {
        for (col, value) in values {
            if let Some(cell) = self.cells.get_mut(*col) {
                *cell = Some(value.clone());
            }
        }
    }
}

/// Folds one operation into the net operation for its key.
///
/// `live` is whether the key exists in the master state before the batch.
fn fold(net: Option<NetOp>, op: &ResolvedOp, live: bool, width: usize) -> Option<NetOp> {
    match (op.kind, net) {
        (OpKind::Insert, None) => {
            let mut n = NetOp::empty(OpKind::Insert, false, width);
            n.write(&op.values);
            Some(n)
        }
        (OpKind::Insert, Some(prior)) => {
            let mut n = match prior.kind {
                OpKind::Delete => NetOp::empty(OpKind::Insert, true, width),
                _ => NetOp {
                    kind: OpKind::Insert,
                    ..prior
                },
            };
            n.write(&op.values);
            Some(n)
        }
        (OpKind::Delete, _) => Some(NetOp::empty(OpKind::Delete, false, width)),
        (OpKind::Clear, None) if !live => None,
        (OpKind::Clear, Some(prior)) if prior.kind == OpKind::Delete => Some(prior),
        (OpKind::Clear, _) => Some(NetOp::empty(OpKind::Clear, true, width)),
    }
}

/// The materialized result of flattening one batch.
///
/// Every table has one row per distinct key, in key order. `flattened` holds
/// the provided payload cells, `prev` and `current` the row images before and
/// after the batch, and `delta` the per-cell change. Numeric delta columns
/// use the widened accumulator type; other columns carry the current value.
#[derive(Clone, Debug)]
pub struct FlattenedBatch {
    pub flattened: DataTable,
    pub delta: DataTable,
    pub prev: DataTable,
    pub current: DataTable,
    pub transitions: TransitionTable,
    /// Row was live before the batch
    pub existed: Vec<bool>,
    /// Row is live after the batch
    pub exists: Vec<bool>,
    /// Net operation per row
    pub ops: Vec<OpKind>,
    pkey_col: usize,
}

impl FlattenedBatch {
    fn with_schema(schema: &Schema) -> Self {
        let mut delta = DataTable::new();
        for col in schema.columns() {
            let dtype = col.data_type().widened().unwrap_or(col.data_type());
            delta.add_column(col.name(), dtype);
        }
        Self {
            flattened: DataTable::from_schema(schema),
            delta,
            prev: DataTable::from_schema(schema),
            current: DataTable::from_schema(schema),
            transitions: TransitionTable::new(schema.len()),
            existed: Vec::new(),
            exists: Vec::new(),
            ops: Vec::new(),
            pkey_col: schema.pkey_index(),
        }
    }

    /// Returns the number of flattened rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the position of the primary-key column.
    #[inline]
    pub fn pkey_column(&self) -> usize {
        self.pkey_col
    }

    /// Returns the primary key of row `row`.
    pub fn pkey(&self, row: usize) -> Scalar {
        self.current
            .column_at(self.pkey_col)
            .map(|c| c.get_scalar(row))
            .unwrap_or_default()
    }

    /// Returns every primary key, in row order.
    pub fn pkeys(&self) -> Vec<Scalar> {
        (0..self.len()).map(|row| self.pkey(row)).collect()
    }

    /// Returns the transition of one cell.
    #[inline]
    pub fn transition(&self, row: usize, col: usize) -> Transition {
        self.transitions.get(row, col)
    }

    /// Returns true if the batch changed anything about row `row`.
    pub fn row_changed(&self, row: usize) -> bool {
        self.existed.get(row) != self.exists.get(row) || self.transitions.row_changed(row)
    }

    fn push_row(
        &mut self,
        schema: &Schema,
        pkey: Scalar,
        net: &NetOp,
        prior: Option<Vec<Scalar>>,
    ) -> Result<()> {
        let row = self.len();
        for table in [
            &mut self.flattened,
            &mut self.delta,
            &mut self.prev,
            &mut self.current,
        ] {
            table.set_size(row + 1);
        }

        let existed = prior.is_some();
        let exists = net.kind != OpKind::Delete;
        let prior = prior.unwrap_or_else(|| vec![Scalar::None; schema.len()]);

        for (col, column) in schema.columns().iter().enumerate() {
            let provided = net.cells.get(col).cloned().flatten();
            let prev = if col == self.pkey_col {
                pkey.clone()
            } else {
                prior.get(col).cloned().unwrap_or_default()
            };
            let cur = if col == self.pkey_col {
                pkey.clone()
            } else if !exists {
                Scalar::None
            } else {
                match &provided {
                    Some(v) => v.clone(),
                    None if net.reset => Scalar::None,
                    None => prev.clone(),
                }
            };

            let prev_valid = existed && prev.is_valid();
            let cur_valid = exists && cur.is_valid();
            let transition = classify(CellState {
                row_pre_existed: existed,
                exists,
                prev_valid,
                cur_valid,
                prev_eq_cur: prev == cur,
            });
            self.transitions.push(col, transition);

            let before = if existed { &prev } else { &Scalar::None };
            let after = if exists { &cur } else { &Scalar::None };
            let delta = cell_delta(column.data_type(), before, after);

            if col == self.pkey_col {
                self.flattened.set(col, row, pkey.clone())?;
            } else if let Some(v) = provided {
                self.flattened.set(col, row, v)?;
            }
            self.delta.set(col, row, delta)?;
            self.prev.set(col, row, prev)?;
            self.current.set(col, row, cur)?;
        }

        self.existed.push(existed);
        self.exists.push(exists);
        self.ops.push(net.kind);
        Ok(())
    }
}

/// Computes the delta of one cell.
///
/// Invalid cells count as zero. Integer arithmetic wraps, so removing an
/// unsigned value yields its wrapping negation.
fn cell_delta(dtype: DataType, prev: &Scalar, cur: &Scalar) -> Scalar {
    match dtype.widened() {
        Some(DataType::Int64) => Scalar::Int64(
            cur.as_i64()
                .unwrap_or(0)
                .wrapping_sub(prev.as_i64().unwrap_or(0)),
        ),
        Some(DataType::UInt64) => Scalar::UInt64(
            cur.as_u64()
                .unwrap_or(0)
                .wrapping_sub(prev.as_u64().unwrap_or(0)),
        ),
        Some(DataType::Float64) => {
            Scalar::Float64(cur.as_f64().unwrap_or(0.0) - prev.as_f64().unwrap_or(0.0))
        }
        _ => cur.clone(),
    }
}

/// Flattens a batch against the master state as it stands before the batch.
pub fn flatten(ops: &[ResolvedOp], state: &MasterState) -> Result<FlattenedBatch> {
    let schema = state.schema();
    let width = schema.len();
    let mut net: BTreeMap<Scalar, NetOp> = BTreeMap::new();
    for op in ops {
        let live = state.contains(&op.pkey);
        if let Some(n) = fold(net.remove(&op.pkey), op, live, width) {
            net.insert(op.pkey.clone(), n);
        }
    }

    let mut batch = FlattenedBatch::with_schema(schema);
    for (pkey, n) in &net {
        // An absent key that nets to a delete still yields an `EqFF` row.
        batch.push_row(schema, pkey.clone(), n, state.get_row(pkey))?;
    }
    Ok(batch)
}

/// Replays the whole master state as a batch of inserts into an empty table.
///
/// Used to bring a newly registered consumer up to date.
pub fn snapshot(state: &MasterState) -> Result<FlattenedBatch> {
    let schema = state.schema();
    let mut pkeys = state.pkeys();
    pkeys.sort();

    let mut batch = FlattenedBatch::with_schema(schema);
    for pkey in pkeys {
        let row = match state.get_row(&pkey) {
            Some(row) => row,
            None => continue,
        };
        let net = NetOp {
            kind: OpKind::Insert,
            reset: false,
            cells: row.into_iter().map(Some).collect(),
        };
        batch.push_row(schema, pkey, &net, None)?;
    }
    Ok(batch)
}
