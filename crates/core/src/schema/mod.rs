//! Schema module for Tessera.
//!
//! A schema names the columns of a canonical table, their declared types, and
//! the primary-key column.

mod column;
mod table;

pub use column::Column;
pub use table::{Schema, SchemaBuilder};
