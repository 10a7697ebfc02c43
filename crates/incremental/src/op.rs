//! Row operations for a graph node.
//!
//! An `Operation` is one keyed change sent to a graph node. Operations name
//! their columns; `resolve` binds those names to schema positions and checks
//! types once, at send time.

use tessera_core::schema::Schema;
use tessera_core::{Error, Result, Scalar};

/// The kind of a row operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Insert or update: writes the payload cells, other cells keep their value
    Insert,
    /// Remove the row
    Delete,
    /// Keep the row but invalidate every non-key cell
    Clear,
}

/// A keyed change to one row.
#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    /// The kind of change
    pub kind: OpKind,
    /// The primary key of the row
    pub pkey: Scalar,
    /// The payload, as (column name, value) pairs
    pub values: Vec<(String, Scalar)>,
}

impl Operation {
    /// Creates an insert with an empty payload.
    #[inline]
    pub fn insert(pkey: impl Into<Scalar>) -> Self {
        Self {
            kind: OpKind::Insert,
            pkey: pkey.into(),
            values: Vec::new(),
        }
    }

    /// Creates a delete.
    #[inline]
    pub fn delete(pkey: impl Into<Scalar>) -> Self {
        Self {
            kind: OpKind::Delete,
            pkey: pkey.into(),
            values: Vec::new(),
        }
    }

    /// Creates a clear.
    #[inline]
    pub fn clear(pkey: impl Into<Scalar>) -> Self {
        Self {
            kind: OpKind::Clear,
            pkey: pkey.into(),
            values: Vec::new(),
        }
    }

    /// Adds a payload cell. `Scalar::None` writes an invalid cell.
    pub fn set(mut self, column: &str, value: impl Into<Scalar>) -> Self {
        self.values.push((column.to_string(), value.into()));
        self
    }

    /// Returns true if this is an insert.
    #[inline]
    pub fn is_insert(&self) -> bool {
        self.kind == OpKind::Insert
    }

    /// Returns true if this is a delete.
    #[inline]
    pub fn is_delete(&self) -> bool {
        self.kind == OpKind::Delete
    }

    /// Binds payload names to schema positions and checks types.
    pub fn resolve(&self, schema: &Schema) -> Result<ResolvedOp> {
        let pkey_col = schema.pkey_column();
        match self.pkey.dtype() {
            None => return Err(Error::invalid_operation("primary key cannot be none")),
            Some(dt) if dt != pkey_col.data_type() => {
                return Err(Error::type_mismatch(pkey_col.name(), pkey_col.data_type(), dt))
            }
            _ => {}
        }
        let mut values = Vec::with_capacity(self.values.len());
        for (name, value) in &self.values {
            let idx = schema.require_column(name)?;
            let column = &schema.columns()[idx];
            if let Some(dt) = value.dtype() {
                if dt != column.data_type() {
                    return Err(Error::type_mismatch(name, column.data_type(), dt));
                }
            }
            if idx == schema.pkey_index() {
                if *value != self.pkey {
                    return Err(Error::invalid_operation(format!(
                        "payload key {} disagrees with operation key {}",
                        value, self.pkey
                    )));
                }
                continue;
            }
            values.push((idx, value.clone()));
        }
        Ok(ResolvedOp {
            kind: self.kind,
            pkey: self.pkey.clone(),
            values,
        })
    }
}

/// An operation whose payload is bound to schema positions.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedOp {
    pub kind: OpKind,
    pub pkey: Scalar,
    pub values: Vec<(usize, Scalar)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::schema::SchemaBuilder;
    use tessera_core::DataType;

    fn schema() -> Schema {
        SchemaBuilder::new("sales")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_column("city", DataType::Str)
            .unwrap()
            .add_column("sales", DataType::Int64)
            .unwrap()
            .primary_key("id")
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_operation_builders() {
        let op = Operation::insert(1i64).set("city", "NY").set("sales", 10i64);
        assert!(op.is_insert());
        assert_eq!(op.values.len(), 2);
        assert!(Operation::delete(1i64).is_delete());
        assert_eq!(Operation::clear(1i64).kind, OpKind::Clear);
    }

    #[test]
    fn test_resolve_positions() {
        let op = Operation::insert(1i64)
            .set("sales", 10i64)
            .set("id", 1i64)
            .set("city", "NY");
        let resolved = op.resolve(&schema()).unwrap();
        assert_eq!(
            resolved.values,
            vec![(2, Scalar::Int64(10)), (1, Scalar::from("NY"))]
        );
    }

    #[test]
    fn test_resolve_errors() {
        let s = schema();
        assert!(matches!(
            Operation::insert(1i64).set("nope", 1i64).resolve(&s),
            Err(Error::ColumnNotFound { .. })
        ));
        assert!(matches!(
            Operation::insert(1i64).set("sales", "ten").resolve(&s),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            Operation::insert(1i32).resolve(&s),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(Operation::insert(1i64).set("id", 2i64).resolve(&s).is_err());
        assert!(Operation::insert(Scalar::None).resolve(&s).is_err());
        assert!(Operation::insert(1i64).set("sales", Scalar::None).resolve(&s).is_ok());
    }
}
