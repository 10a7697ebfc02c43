//! Error types for Tessera.
//!
//! Only caller-input errors are represented here. Violated internal
//! invariants go through [`fatal!`](crate::fatal) instead.

use crate::types::DataType;
use thiserror::Error;

/// Result type alias for Tessera operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for Tessera operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// A value's type does not match its column's declared type.
    #[error("type mismatch on column {column}: expected {expected}, got {got}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        got: DataType,
    },
    /// Column not found.
    #[error("column {column} not found in {scope}")]
    ColumnNotFound { scope: String, column: String },
    /// Invalid schema definition.
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },
    /// Invalid view configuration.
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    /// An aggregate kind cannot be applied to a column type.
    #[error("aggregate {aggregate} cannot be computed over {dtype} column")]
    UnexpectedDtype { aggregate: String, dtype: DataType },
    /// Input port not registered on a graph node.
    #[error("port {port} not found on graph node {gnode}")]
    PortNotFound { gnode: u32, port: usize },
    /// Graph node id not registered in the pool.
    #[error("graph node {0} not found")]
    GraphNodeNotFound(u32),
    /// Context name not registered on a graph node.
    #[error("context {0} not found")]
    ContextNotFound(String),
    /// Context name already registered on a graph node.
    #[error("context {0} already registered")]
    DuplicateContext(String),
    /// Invalid operation.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
}

impl Error {
    /// Creates a type mismatch error.
    pub fn type_mismatch(column: impl Into<String>, expected: DataType, got: DataType) -> Self {
        Error::TypeMismatch {
            column: column.into(),
            expected,
            got,
        }
    }

    /// Creates a column not found error.
    pub fn column_not_found(scope: impl Into<String>, column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            scope: scope.into(),
            column: column.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates an invalid config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an unexpected dtype error.
    pub fn unexpected_dtype(aggregate: impl Into<String>, dtype: DataType) -> Self {
        Error::UnexpectedDtype {
            aggregate: aggregate.into(),
            dtype,
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }
}

/// Logs an invariant violation and aborts the current thread.
///
/// Aggregates computed past a broken invariant would be silently wrong, so
/// there is no recovery path.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)+) => {{
        ::tracing::error!($($arg)+);
        panic!($($arg)+)
    }};
}
