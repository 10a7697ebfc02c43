//! Table schema definition.

use super::column::Column;
use crate::error::{Error, Result};
use crate::types::DataType;

/// The schema of a canonical table: ordered columns plus a primary key.
#[derive(Clone, Debug)]
pub struct Schema {
    /// Table name.
    name: String,
    /// Column definitions.
    columns: Vec<Column>,
    /// Position of the primary-key column.
    pkey: usize,
}

impl Schema {
    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the columns.
    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the number of columns.
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the schema has no columns.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Gets a column by name.
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Gets a column position by name.
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Gets a column position by name, or a `ColumnNotFound` error.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.get_column_index(name)
            .ok_or_else(|| Error::column_not_found(&self.name, name))
    }

    /// Returns the data type of a named column.
    pub fn dtype(&self, name: &str) -> Option<DataType> {
        self.get_column(name).map(|c| c.data_type())
    }

    /// Returns the primary-key column.
    #[inline]
    pub fn pkey_column(&self) -> &Column {
        &self.columns[self.pkey]
    }

    /// Returns the position of the primary-key column.
    #[inline]
    pub fn pkey_index(&self) -> usize {
        self.pkey
    }

    /// Returns the column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name()).collect()
    }
}

/// Builder for creating schemas.
pub struct SchemaBuilder {
    name: String,
    columns: Vec<Column>,
    pkey: Option<String>,
}

impl SchemaBuilder {
    /// Creates a new schema builder.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        Ok(Self {
            name,
            columns: Vec::new(),
            pkey: None,
        })
    }

    /// Validates a name follows naming rules.
    fn check_naming_rules(name: &str) -> Result<()> {
        let mut chars = name.chars();
        let first = match chars.next() {
            Some(c) => c,
            None => return Err(Error::invalid_schema("Name cannot be empty")),
        };
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(Error::invalid_schema(format!(
                "Name must start with letter or underscore: {}",
                name
            )));
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::invalid_schema(format!(
                "Name contains invalid characters: {}",
                name
            )));
        }
        Ok(())
    }

    /// Adds a column to the schema.
    pub fn add_column(mut self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        if self.columns.iter().any(|c| c.name() == name) {
            return Err(Error::invalid_schema(format!(
                "Column already exists: {}",
                name
            )));
        }
        self.columns.push(Column::new(name, data_type));
        Ok(self)
    }

    /// Sets the primary-key column.
    pub fn primary_key(mut self, column: &str) -> Result<Self> {
        match self.columns.iter().find(|c| c.name() == column) {
            None => {
                return Err(Error::invalid_schema(format!(
                    "Column not found: {}",
                    column
                )))
            }
            Some(c) if !c.is_key_type() => {
                return Err(Error::invalid_schema(format!(
                    "Column cannot be a primary key: {}",
                    column
                )))
            }
            _ => {}
        }
        self.pkey = Some(column.to_string());
        Ok(self)
    }

    /// Builds the schema.
    pub fn build(self) -> Result<Schema> {
        let pkey_name = self
            .pkey
            .ok_or_else(|| Error::invalid_schema("Primary key is required"))?;
        let columns: Vec<Column> = self
            .columns
            .into_iter()
            .enumerate()
            .map(|(i, c)| c.with_index(i))
            .collect();
        let pkey = columns
            .iter()
            .position(|c| c.name() == pkey_name)
            .ok_or_else(|| Error::invalid_schema(format!("Column not found: {}", pkey_name)))?;

        Ok(Schema {
            name: self.name,
            columns,
            pkey,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales_schema() -> Schema {
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
    fn test_schema_builder() {
        let schema = sales_schema();
        assert_eq!(schema.name(), "sales");
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.pkey_column().name(), "id");
        assert_eq!(schema.pkey_index(), 0);
        assert_eq!(schema.column_names(), vec!["id", "city", "sales"]);
    }

    #[test]
    fn test_schema_get_column() {
        let schema = sales_schema();
        assert_eq!(schema.get_column_index("city"), Some(1));
        assert_eq!(schema.dtype("sales"), Some(DataType::Int64));
        assert!(schema.get_column("unknown").is_none());
        assert!(matches!(
            schema.require_column("unknown"),
            Err(Error::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_column_name() {
        let result = SchemaBuilder::new("test")
            .unwrap()
            .add_column("123invalid", DataType::Int32);
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_column() {
        let result = SchemaBuilder::new("test")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_column("id", DataType::Int64);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_primary_key() {
        let result = SchemaBuilder::new("test")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .build();
        assert!(result.is_err());

        let result = SchemaBuilder::new("test")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .primary_key("nope");
        assert!(result.is_err());
    }
}
