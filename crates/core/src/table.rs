//! Typed column buffers.
//!
//! `DataColumn` is the narrow column contract the engine is written against:
//! typed at creation, resizable, with per-cell validity. A cell holding
//! `Scalar::None` is invalid. `DataTable` groups named columns of equal
//! length.

use crate::error::{Error, Result};
use crate::scalar::Scalar;
use crate::schema::Schema;
use crate::types::DataType;
use hashbrown::HashMap;

/// A typed, resizable column with validity tracking.
#[derive(Clone, Debug)]
pub struct DataColumn {
    name: String,
    dtype: DataType,
    values: Vec<Scalar>,
}

impl DataColumn {
    /// Creates an empty column.
    pub fn new(name: impl Into<String>, dtype: DataType) -> Self {
        Self {
            name: name.into(),
            dtype,
            values: Vec::new(),
        }
    }

    /// Creates a column of `len` invalid cells.
    pub fn with_len(name: impl Into<String>, dtype: DataType, len: usize) -> Self {
        Self {
            name: name.into(),
            dtype,
            values: vec![Scalar::None; len],
        }
    }

    /// Returns the column name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared data type.
    #[inline]
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Returns the number of cells.
    #[inline]
    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the column has no cells.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the value at `row`, or `Scalar::None` when out of range.
    pub fn get_scalar(&self, row: usize) -> Scalar {
        self.values.get(row).cloned().unwrap_or_default()
    }

    /// Borrows the value at `row`.
    #[inline]
    pub fn get(&self, row: usize) -> Option<&Scalar> {
        self.values.get(row)
    }

    /// Returns whether the cell at `row` holds a valid value.
    pub fn is_valid(&self, row: usize) -> bool {
        self.values.get(row).map(|v| v.is_valid()).unwrap_or(false)
    }

    /// Writes a value, growing the column if needed.
    ///
    /// `Scalar::None` marks the cell invalid. Any other variant must match the
    /// column's declared type.
    pub fn set_nth(&mut self, row: usize, value: Scalar) -> Result<()> {
        if let Some(got) = value.dtype() {
            if got != self.dtype {
                return Err(Error::type_mismatch(&self.name, self.dtype, got));
            }
        }
        if row >= self.values.len() {
            self.values.resize(row + 1, Scalar::None);
        }
        self.values[row] = value;
        Ok(())
    }

    /// Writes a value with an explicit validity status.
    pub fn set_nth_status(&mut self, row: usize, value: Scalar, valid: bool) -> Result<()> {
        if valid {
            self.set_nth(row, value)
        } else {
            self.set_nth(row, Scalar::None)
        }
    }

    /// Appends a value.
    pub fn push(&mut self, value: Scalar) -> Result<()> {
        let row = self.values.len();
        self.set_nth(row, value)
    }

    /// Resizes the column, filling new cells as invalid.
    pub fn resize(&mut self, len: usize) {
        self.values.resize(len, Scalar::None);
    }

    /// Iterates over all cells.
    pub fn iter(&self) -> impl Iterator<Item = &Scalar> + '_ {
        self.values.iter()
    }
}

/// A set of equally-sized named columns.
#[derive(Clone, Debug, Default)]
pub struct DataTable {
    columns: Vec<DataColumn>,
    names: HashMap<String, usize>,
    size: usize,
}

impl DataTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table with one column per schema column.
    pub fn from_schema(schema: &Schema) -> Self {
        let mut table = Self::new();
        for col in schema.columns() {
            table.add_column(col.name(), col.data_type());
        }
        table
    }

    /// Adds a column sized to the current row count.
    ///
    /// Adding an existing name returns the existing column's position.
    pub fn add_column(&mut self, name: &str, dtype: DataType) -> usize {
        if let Some(idx) = self.names.get(name) {
            return *idx;
        }
        let idx = self.columns.len();
        self.columns.push(DataColumn::with_len(name, dtype, self.size));
        self.names.insert(name.to_string(), idx);
        idx
    }

    /// Gets a column by name.
    pub fn get_column(&self, name: &str) -> Option<&DataColumn> {
        self.names.get(name).map(|idx| &self.columns[*idx])
    }

    /// Gets a mutable column by name.
    pub fn get_column_mut(&mut self, name: &str) -> Option<&mut DataColumn> {
        match self.names.get(name) {
            Some(idx) => self.columns.get_mut(*idx),
            None => None,
        }
    }

    /// Gets a column by position.
    #[inline]
    pub fn column_at(&self, idx: usize) -> Option<&DataColumn> {
        self.columns.get(idx)
    }

    /// Gets a mutable column by position.
    #[inline]
    pub fn column_at_mut(&mut self, idx: usize) -> Option<&mut DataColumn> {
        self.columns.get_mut(idx)
    }

    /// Returns the position of a named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    /// Returns all columns.
    #[inline]
    pub fn columns(&self) -> &[DataColumn] {
        &self.columns
    }

    /// Returns the number of columns.
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Returns the number of rows.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns true if the table has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Resizes every column to `size` rows.
    pub fn set_size(&mut self, size: usize) {
        for col in &mut self.columns {
            col.resize(size);
        }
        self.size = size;
    }

    /// Appends one invalid row and returns its index.
    pub fn extend_one(&mut self) -> usize {
        let row = self.size;
        self.set_size(row + 1);
        row
    }

    /// Returns the value at (`row`, column `name`).
    pub fn get(&self, name: &str, row: usize) -> Scalar {
        self.get_column(name)
            .map(|c| c.get_scalar(row))
            .unwrap_or_default()
    }

    /// Writes the value at (`row`, column position `col`).
    pub fn set(&mut self, col: usize, row: usize, value: Scalar) -> Result<()> {
        match self.columns.get_mut(col) {
            Some(c) => c.set_nth(row, value),
            None => Err(Error::invalid_operation(format!(
                "column position {} out of range",
                col
            ))),
        }
    }

    /// Returns all values of one row in column order.
    pub fn row(&self, row: usize) -> Vec<Scalar> {
        self.columns.iter().map(|c| c.get_scalar(row)).collect()
    }
}
