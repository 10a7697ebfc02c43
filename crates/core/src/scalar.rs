//! Scalar value definitions for Tessera.
//!
//! `Scalar` is the tagged union every cell, primary key, pivot value and
//! aggregate result is expressed in. `Scalar::None` is the distinguished
//! invalid value: it compares equal only to itself and sorts before every
//! other variant.

use crate::types::DataType;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use std::sync::Arc;

/// A value that can be stored in a cell.
#[derive(Clone, Debug, Default)]
pub enum Scalar {
    /// Missing or invalid value
    #[default]
    None,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    /// Interned string; equal strings from one pool share an allocation
    Str(Arc<str>),
    /// Days since the Unix epoch
    Date(i32),
    /// Milliseconds since the Unix epoch
    Time(i64),
    /// Running (numerator, denominator) pair
    Float64Pair(f64, f64),
}

impl Scalar {
    /// Returns the data type of this value, or `None` for `Scalar::None`.
    pub fn dtype(&self) -> Option<DataType> {
        match self {
            Scalar::None => None,
            Scalar::Bool(_) => Some(DataType::Bool),
            Scalar::Int8(_) => Some(DataType::Int8),
            Scalar::Int16(_) => Some(DataType::Int16),
            Scalar::Int32(_) => Some(DataType::Int32),
            Scalar::Int64(_) => Some(DataType::Int64),
            Scalar::UInt8(_) => Some(DataType::UInt8),
            Scalar::UInt16(_) => Some(DataType::UInt16),
            Scalar::UInt32(_) => Some(DataType::UInt32),
            Scalar::UInt64(_) => Some(DataType::UInt64),
            Scalar::Float32(_) => Some(DataType::Float32),
            Scalar::Float64(_) => Some(DataType::Float64),
            Scalar::Str(_) => Some(DataType::Str),
            Scalar::Date(_) => Some(DataType::Date),
            Scalar::Time(_) => Some(DataType::Time),
            Scalar::Float64Pair(..) => Some(DataType::Float64Pair),
        }
    }

    /// Returns true if this is `Scalar::None`.
    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, Scalar::None)
    }

    /// Returns true for every variant except `Scalar::None`.
    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.is_none()
    }

    /// Signed integer view of booleans and signed integers.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Bool(v) => Some(*v as i64),
            Scalar::Int8(v) => Some(*v as i64),
            Scalar::Int16(v) => Some(*v as i64),
            Scalar::Int32(v) => Some(*v as i64),
            Scalar::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Unsigned integer view of unsigned integers.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Scalar::UInt8(v) => Some(*v as u64),
            Scalar::UInt16(v) => Some(*v as u64),
            Scalar::UInt32(v) => Some(*v as u64),
            Scalar::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    /// Floating point view of any numeric variant.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Float32(v) => Some(*v as f64),
            Scalar::Float64(v) => Some(*v),
            Scalar::UInt8(_) | Scalar::UInt16(_) | Scalar::UInt32(_) | Scalar::UInt64(_) => {
                self.as_u64().map(|v| v as f64)
            }
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    /// Returns the string if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the pair if this is a `Float64Pair`.
    pub fn as_pair(&self) -> Option<(f64, f64)> {
        match self {
            Scalar::Float64Pair(a, b) => Some((*a, *b)),
            _ => None,
        }
    }

    /// Converts a numeric value to its widened accumulator representation.
    ///
    /// Non-numeric values are returned unchanged.
    pub fn widen(&self) -> Scalar {
        match self.dtype().and_then(|dt| dt.widened()) {
            Some(DataType::Int64) => Scalar::Int64(self.as_i64().unwrap_or_default()),
            Some(DataType::UInt64) => Scalar::UInt64(self.as_u64().unwrap_or_default()),
            Some(DataType::Float64) => Scalar::Float64(self.as_f64().unwrap_or_default()),
            _ => self.clone(),
        }
    }

    /// The canonical empty value of a data type.
    ///
    /// Used when an invalid input is substituted rather than excluded.
    pub fn canonical(dt: DataType) -> Scalar {
        match dt {
            DataType::Bool => Scalar::Bool(false),
            DataType::Int8 => Scalar::Int8(0),
            DataType::Int16 => Scalar::Int16(0),
            DataType::Int32 => Scalar::Int32(0),
            DataType::Int64 => Scalar::Int64(0),
            DataType::UInt8 => Scalar::UInt8(0),
            DataType::UInt16 => Scalar::UInt16(0),
            DataType::UInt32 => Scalar::UInt32(0),
            DataType::UInt64 => Scalar::UInt64(0),
            DataType::Float32 => Scalar::Float32(0.0),
            DataType::Float64 => Scalar::Float64(0.0),
            DataType::Str => Scalar::Str(Arc::from("")),
            DataType::Date => Scalar::Date(0),
            DataType::Time => Scalar::Time(0),
            DataType::Float64Pair => Scalar::Float64Pair(0.0, 0.0),
        }
    }

    /// Returns a type ordering value for comparing different variants.
    fn type_order(&self) -> u8 {
        match self {
            Scalar::None => 0,
            Scalar::Bool(_) => 1,
            Scalar::Int8(_) => 2,
            Scalar::Int16(_) => 3,
            Scalar::Int32(_) => 4,
            Scalar::Int64(_) => 5,
            Scalar::UInt8(_) => 6,
            Scalar::UInt16(_) => 7,
            Scalar::UInt32(_) => 8,
            Scalar::UInt64(_) => 9,
            Scalar::Float32(_) => 10,
            Scalar::Float64(_) => 11,
            Scalar::Str(_) => 12,
            Scalar::Date(_) => 13,
            Scalar::Time(_) => 14,
            Scalar::Float64Pair(..) => 15,
        }
    }
}

/// NaN sorts after every number; zero and negative zero are equal.
fn cmp_f64(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

fn hash_f64<H: Hasher>(v: f64, state: &mut H) {
    let bits = if v == 0.0 {
        0u64
    } else if v.is_nan() {
        f64::NAN.to_bits()
    } else {
        v.to_bits()
    };
    bits.hash(state);
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scalar {}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Scalar::None, Scalar::None) => Ordering::Equal,
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Int8(a), Scalar::Int8(b)) => a.cmp(b),
            (Scalar::Int16(a), Scalar::Int16(b)) => a.cmp(b),
            (Scalar::Int32(a), Scalar::Int32(b)) => a.cmp(b),
            (Scalar::Int64(a), Scalar::Int64(b)) => a.cmp(b),
            (Scalar::UInt8(a), Scalar::UInt8(b)) => a.cmp(b),
            (Scalar::UInt16(a), Scalar::UInt16(b)) => a.cmp(b),
            (Scalar::UInt32(a), Scalar::UInt32(b)) => a.cmp(b),
            (Scalar::UInt64(a), Scalar::UInt64(b)) => a.cmp(b),
            (Scalar::Float32(a), Scalar::Float32(b)) => cmp_f64(*a as f64, *b as f64),
            (Scalar::Float64(a), Scalar::Float64(b)) => cmp_f64(*a, *b),
            (Scalar::Str(a), Scalar::Str(b)) => {
                if Arc::ptr_eq(a, b) {
                    Ordering::Equal
                } else {
                    a.cmp(b)
                }
            }
            (Scalar::Date(a), Scalar::Date(b)) => a.cmp(b),
            (Scalar::Time(a), Scalar::Time(b)) => a.cmp(b),
            (Scalar::Float64Pair(a0, a1), Scalar::Float64Pair(b0, b1)) => {
                cmp_f64(*a0, *b0).then_with(|| cmp_f64(*a1, *b1))
            }
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_order().hash(state);
        match self {
            Scalar::None => {}
            Scalar::Bool(v) => v.hash(state),
            Scalar::Int8(v) => v.hash(state),
            Scalar::Int16(v) => v.hash(state),
            Scalar::Int32(v) => v.hash(state),
            Scalar::Int64(v) => v.hash(state),
            Scalar::UInt8(v) => v.hash(state),
            Scalar::UInt16(v) => v.hash(state),
            Scalar::UInt32(v) => v.hash(state),
            Scalar::UInt64(v) => v.hash(state),
            Scalar::Float32(v) => hash_f64(*v as f64, state),
            Scalar::Float64(v) => hash_f64(*v, state),
            Scalar::Str(s) => s.hash(state),
            Scalar::Date(v) => v.hash(state),
            Scalar::Time(v) => v.hash(state),
            Scalar::Float64Pair(a, b) => {
                hash_f64(*a, state);
                hash_f64(*b, state);
            }
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::None => f.write_str("-"),
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Int8(v) => write!(f, "{}", v),
            Scalar::Int16(v) => write!(f, "{}", v),
            Scalar::Int32(v) => write!(f, "{}", v),
            Scalar::Int64(v) => write!(f, "{}", v),
            Scalar::UInt8(v) => write!(f, "{}", v),
            Scalar::UInt16(v) => write!(f, "{}", v),
            Scalar::UInt32(v) => write!(f, "{}", v),
            Scalar::UInt64(v) => write!(f, "{}", v),
            Scalar::Float32(v) => write!(f, "{}", v),
            Scalar::Float64(v) => write!(f, "{}", v),
            Scalar::Str(v) => f.write_str(v),
            Scalar::Date(v) => write!(f, "date({})", v),
            Scalar::Time(v) => write!(f, "time({})", v),
            Scalar::Float64Pair(a, b) => write!(f, "({}, {})", a, b),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i8> for Scalar {
    fn from(v: i8) -> Self {
        Scalar::Int8(v)
    }
}

impl From<i16> for Scalar {
    fn from(v: i16) -> Self {
        Scalar::Int16(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int32(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int64(v)
    }
}

impl From<u8> for Scalar {
    fn from(v: u8) -> Self {
        Scalar::UInt8(v)
    }
}

impl From<u16> for Scalar {
    fn from(v: u16) -> Self {
        Scalar::UInt16(v)
    }
}

impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Scalar::UInt32(v)
    }
}

impl From<u64> for Scalar {
    fn from(v: u64) -> Self {
        Scalar::UInt64(v)
    }
}

impl From<f32> for Scalar {
    fn from(v: f32) -> Self {
        Scalar::Float32(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float64(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(Arc::from(v))
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Str(Arc::from(v))
    }
}

impl From<Arc<str>> for Scalar {
    fn from(v: Arc<str>) -> Self {
        Scalar::Str(v)
    }
}

impl<T> From<Option<T>> for Scalar
where
    T: Into<Scalar>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Scalar::None,
        }
    }
}
