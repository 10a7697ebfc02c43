//! Tessera Storage - The canonical master table.
//!
//! This crate provides `MasterState`, the primary-key indexed table holding
//! the latest value of every live row:
//!
//! - `lookup`: resolve a primary key to its slot (absent keys are `None`)
//! - `upsert` / `erase`: write or free a row slot, recycling freed slots
//! - `update_master_table`: apply the post-image of a flattened batch
//! - `get` / `get_at` / `read_column`: read values by key
//! - `MasterHandle`: a shared, lock-guarded master state
//!
//! # Example
//!
//! ```rust
//! use tessera_core::schema::SchemaBuilder;
//! use tessera_core::{DataType, Scalar};
//! use tessera_storage::MasterState;
//!
//! let schema = SchemaBuilder::new("sales")
//!     .unwrap()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .add_column("sales", DataType::Int64)
//!     .unwrap()
//!     .primary_key("id")
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let mut state = MasterState::new(schema);
//! state.upsert(&Scalar::Int64(1), &[Scalar::Int64(1), Scalar::Int64(10)]).unwrap();
//! assert_eq!(state.get("sales", &Scalar::Int64(1)), Scalar::Int64(10));
//! assert_eq!(state.lookup(&Scalar::Int64(2)), None);
//! ```

pub mod master;

pub use master::{MasterHandle, MasterState};
