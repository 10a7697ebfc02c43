//! Tessera Core - Scalar types, schemas and column buffers.
//!
//! This crate provides the foundational types shared by every Tessera crate:
//!
//! - `DataType`: Declared column types (integers, floats, bool, string, date, time, pair)
//! - `Scalar`: The tagged value every cell, key and aggregate is expressed in
//! - `StringPool`: String interning
//! - `schema`: Schema definitions (`Column`, `Schema`, `SchemaBuilder`)
//! - `DataColumn` / `DataTable`: Typed column buffers with validity
//! - `Error`: Error types for caller-input failures, plus the `fatal!` macro
//!
//! # Example
//!
//! ```rust
//! use tessera_core::{DataTable, DataType, Scalar};
//! use tessera_core::schema::SchemaBuilder;
//!
//! let schema = SchemaBuilder::new("sales")
//!     .unwrap()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .add_column("city", DataType::Str)
//!     .unwrap()
//!     .primary_key("id")
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let mut table = DataTable::from_schema(&schema);
//! let row = table.extend_one();
//! table.set(1, row, Scalar::from("NY")).unwrap();
//! assert_eq!(table.get("city", row), Scalar::from("NY"));
//! assert!(table.get("id", row).is_none());
//! ```

mod error;
mod intern;
mod scalar;
pub mod schema;
mod table;
mod types;

pub use error::{Error, Result};
pub use intern::{StrId, StringPool};
pub use scalar::Scalar;
pub use table::{DataColumn, DataTable};
pub use types::DataType;
