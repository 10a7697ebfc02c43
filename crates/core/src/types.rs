//! Data type definitions for Tessera.
//!
//! Every column is declared with one `DataType` at creation and never changes
//! it afterwards. The aggregate engine dispatches on these variants once per
//! aggregate spec.

use core::fmt;

/// Supported column data types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    /// Boolean type (true/false)
    Bool,
    /// 8-bit signed integer
    Int8,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 8-bit unsigned integer
    UInt8,
    /// 16-bit unsigned integer
    UInt16,
    /// 32-bit unsigned integer
    UInt32,
    /// 64-bit unsigned integer
    UInt64,
    /// 32-bit floating point number
    Float32,
    /// 64-bit floating point number
    Float64,
    /// Interned UTF-8 string
    Str,
    /// Calendar date stored as days since the Unix epoch
    Date,
    /// Timestamp stored as milliseconds since the Unix epoch
    Time,
    /// Pair of floats, the rolling representation of a mean
    Float64Pair,
}

impl DataType {
    /// Returns true for signed integers and booleans.
    ///
    /// These widen to a 64-bit signed accumulator.
    #[inline]
    pub fn is_signed_integer(&self) -> bool {
        matches!(
            self,
            DataType::Bool | DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }

    /// Returns true for unsigned integers.
    #[inline]
    pub fn is_unsigned_integer(&self) -> bool {
        matches!(
            self,
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64
        )
    }

    /// Returns true for floating point types.
    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Returns true if values of this type can be summed.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer() || self.is_float()
    }

    /// Returns the accumulator type numeric values widen to, or `None` for
    /// non-numeric types.
    pub fn widened(&self) -> Option<DataType> {
        if self.is_signed_integer() {
            Some(DataType::Int64)
        } else if self.is_unsigned_integer() {
            Some(DataType::UInt64)
        } else if self.is_float() {
            Some(DataType::Float64)
        } else {
            None
        }
    }

    /// Returns true if values of this type have a total order usable by
    /// water-mark aggregates.
    #[inline]
    pub fn is_orderable(&self) -> bool {
        !matches!(self, DataType::Float64Pair)
    }

    /// Short lowercase name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::UInt32 => "uint32",
            DataType::UInt64 => "uint64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::Str => "str",
            DataType::Date => "date",
            DataType::Time => "time",
            DataType::Float64Pair => "f64pair",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widening_table() {
        for dt in [
            DataType::Bool,
            DataType::Int8,
            DataType::Int16,
            DataType::Int32,
            DataType::Int64,
        ] {
            assert_eq!(dt.widened(), Some(DataType::Int64));
        }
        for dt in [
            DataType::UInt8,
            DataType::UInt16,
            DataType::UInt32,
            DataType::UInt64,
        ] {
            assert_eq!(dt.widened(), Some(DataType::UInt64));
        }
        assert_eq!(DataType::Float32.widened(), Some(DataType::Float64));
        assert_eq!(DataType::Float64.widened(), Some(DataType::Float64));
        assert_eq!(DataType::Str.widened(), None);
        assert_eq!(DataType::Date.widened(), None);
    }

    #[test]
    fn test_numeric() {
        assert!(DataType::UInt16.is_numeric());
        assert!(DataType::Bool.is_numeric());
        assert!(!DataType::Str.is_numeric());
        assert!(!DataType::Time.is_numeric());
    }

    #[test]
    fn test_orderable() {
        assert!(DataType::Str.is_orderable());
        assert!(!DataType::Float64Pair.is_orderable());
    }
}
