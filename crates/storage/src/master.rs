//! Master state for Tessera.
//!
//! `MasterState` is the canonical table: the latest value of every live row,
//! addressed by primary key. Rows live in slots of a columnar `DataTable`;
//! a hash map resolves keys to slots and freed slots are recycled.
//!
//! A `MasterHandle` shares one master state between the graph node that
//! writes it and the views that read row images from it.

use core::fmt;
use hashbrown::HashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;
use tessera_core::schema::Schema;
use tessera_core::{DataTable, Error, Result, Scalar, StringPool};
use tracing::trace;

/// The canonical, primary-key indexed table.
pub struct MasterState {
    schema: Schema,
    table: DataTable,
    mapping: HashMap<Scalar, usize>,
    free_slots: Vec<usize>,
    strings: StringPool,
}

impl MasterState {
    /// Creates an empty master state for the given schema.
    pub fn new(schema: Schema) -> Self {
        let table = DataTable::from_schema(&schema);
        Self {
            schema,
            table,
            mapping: HashMap::new(),
            free_slots: Vec::new(),
            strings: StringPool::new(),
        }
    }

    /// Returns the table schema.
    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the underlying slot table, including freed slots.
    #[inline]
    pub fn table(&self) -> &DataTable {
        &self.table
    }

    /// Returns the number of live rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    /// Returns true if there are no live rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Resolves a primary key to its slot, or `None` if the key is not live.
    #[inline]
    pub fn lookup(&self, pkey: &Scalar) -> Option<usize> {
        self.mapping.get(pkey).copied()
    }

    /// Returns true if the key is live.
    #[inline]
    pub fn contains(&self, pkey: &Scalar) -> bool {
        self.mapping.contains_key(pkey)
    }

    /// Returns the value of column `name` for `pkey`.
    ///
    /// Unknown columns and absent keys both read as `Scalar::None`.
    pub fn get(&self, name: &str, pkey: &Scalar) -> Scalar {
        match self.lookup(pkey) {
            Some(slot) => self.table.get(name, slot),
            None => Scalar::None,
        }
    }

    /// Returns the value at column position `col` for `pkey`.
    pub fn get_at(&self, col: usize, pkey: &Scalar) -> Scalar {
        match (self.lookup(pkey), self.table.column_at(col)) {
            (Some(slot), Some(column)) => column.get_scalar(slot),
            _ => Scalar::None,
        }
    }

    /// Reads column `name` for a list of keys.
    pub fn read_column(&self, name: &str, pkeys: &[Scalar]) -> Vec<Scalar> {
        let column = match self.table.get_column(name) {
            Some(c) => c,
            None => return vec![Scalar::None; pkeys.len()],
        };
        pkeys
            .iter()
            .map(|pk| match self.lookup(pk) {
                Some(slot) => column.get_scalar(slot),
                None => Scalar::None,
            })
            .collect()
    }

    /// Returns the full row image for `pkey` in schema column order.
    pub fn get_row(&self, pkey: &Scalar) -> Option<Vec<Scalar>> {
        self.lookup(pkey).map(|slot| self.table.row(slot))
    }

    /// Returns the live primary keys in slot order.
    pub fn pkeys(&self) -> Vec<Scalar> {
        let mut slots: Vec<(usize, &Scalar)> =
            self.mapping.iter().map(|(pk, slot)| (*slot, pk)).collect();
        slots.sort_unstable_by_key(|(slot, _)| *slot);
        slots.into_iter().map(|(_, pk)| pk.clone()).collect()
    }

    /// Writes a full row image, allocating a slot if the key is new.
    ///
    /// `values` is in schema column order; its primary-key cell must equal
    /// `pkey`. Returns the slot written.
    pub fn upsert(&mut self, pkey: &Scalar, values: &[Scalar]) -> Result<usize> {
        if values.len() != self.schema.len() {
            return Err(Error::invalid_operation(format!(
                "row has {} values, schema {} has {} columns",
                values.len(),
                self.schema.name(),
                self.schema.len()
            )));
        }
        if pkey.is_none() {
            return Err(Error::invalid_operation("primary key cannot be none"));
        }
        for (column, value) in self.schema.columns().iter().zip(values) {
            if let Some(got) = value.dtype() {
                if got != column.data_type() {
                    return Err(Error::type_mismatch(column.name(), column.data_type(), got));
                }
            }
        }
        let slot = match self.lookup(pkey) {
            Some(slot) => slot,
            None => {
                let slot = match self.free_slots.pop() {
                    Some(slot) => slot,
                    None => self.table.extend_one(),
                };
                self.mapping.insert(self.strings.intern_scalar(pkey.clone()), slot);
                slot
            }
        };
        for (col, value) in values.iter().enumerate() {
            let value = self.strings.intern_scalar(value.clone());
            self.table.set(col, slot, value)?;
        }
        Ok(slot)
    }

    /// Removes a key, invalidating and recycling its slot.
    ///
    /// Returns the freed slot, or `None` if the key was not live.
    pub fn erase(&mut self, pkey: &Scalar) -> Option<usize> {
        let slot = self.mapping.remove(pkey)?;
        for col in 0..self.table.num_columns() {
            if let Some(column) = self.table.column_at_mut(col) {
                // Writing `None` cannot mismatch the column type.
                let _ = column.set_nth(slot, Scalar::None);
            }
        }
        self.free_slots.push(slot);
        Some(slot)
    }

    /// Applies the post-image of a flattened batch.
    ///
    /// `current` holds one row per key in schema column order; `live[i]`
    /// tells whether row `i` exists after the batch.
    pub fn update_master_table(&mut self, current: &DataTable, live: &[bool]) -> Result<()> {
        let pkey_col = self.schema.pkey_index();
        let mut written = 0usize;
        let mut erased = 0usize;
        for (row, is_live) in live.iter().enumerate().take(current.size()) {
            let image = current.row(row);
            let pkey = image.get(pkey_col).cloned().unwrap_or_default();
            if *is_live {
                self.upsert(&pkey, &image)?;
                written += 1;
            } else if self.erase(&pkey).is_some() {
                erased += 1;
            }
        }
        trace!(
            table = self.schema.name(),
            written,
            erased,
            live = self.len(),
            "master table updated"
        );
        Ok(())
    }

    /// Removes every row.
    pub fn clear(&mut self) {
        self.mapping.clear();
        self.free_slots.clear();
        self.table.set_size(0);
    }

    /// Interns a string scalar in this table's pool.
    pub fn intern_scalar(&mut self, value: Scalar) -> Scalar {
        self.strings.intern_scalar(value)
    }

    /// Returns the string pool.
    #[inline]
    pub fn strings(&self) -> &StringPool {
        &self.strings
    }
}

/// A shared handle to a master state.
#[derive(Clone)]
pub struct MasterHandle(Arc<RwLock<MasterState>>);

impl MasterHandle {
    pub fn new(state: MasterState) -> Self {
        Self(Arc::new(RwLock::new(state)))
    }

    /// Locks the state for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, MasterState> {
        self.0.read()
    }

    /// Locks the state for writing; only the owning graph node writes.
    pub fn write(&self) -> RwLockWriteGuard<'_, MasterState> {
        self.0.write()
    }
}

impl fmt::Debug for MasterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterHandle").finish_non_exhaustive()
    }
}
