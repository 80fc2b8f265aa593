//! Core scalar and time types shared by the runtime
//!
//! This module contains the element type table used for series storage and
//! sandbox packing, the nanosecond timestamp type, and the provenance tags
//! (alignment, time range) carried by every series.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::time::SystemTime;

use crate::telem::Series;

/// Element type of a series or a function parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    TimeStamp,
}

impl DataType {
    /// Every numeric type a host binding is generated for.
    pub const NUMERIC: [DataType; 10] = [
        DataType::U8,
        DataType::U16,
        DataType::U32,
        DataType::U64,
        DataType::I8,
        DataType::I16,
        DataType::I32,
        DataType::I64,
        DataType::F32,
        DataType::F64,
    ];

    /// Size in bytes of one element
    pub fn density(&self) -> usize {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 => 4,
            DataType::U64 | DataType::I64 | DataType::F64 | DataType::TimeStamp => 8,
        }
    }

    /// Signed integer types (timestamps included)
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            DataType::I8 | DataType::I16 | DataType::I32 | DataType::I64 | DataType::TimeStamp
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }

    /// Short lowercase name, also used as the suffix of host binding names
    pub fn name(&self) -> &'static str {
        match self {
            DataType::U8 => "u8",
            DataType::U16 => "u16",
            DataType::U32 => "u32",
            DataType::U64 => "u64",
            DataType::I8 => "i8",
            DataType::I16 => "i16",
            DataType::I32 => "i32",
            DataType::I64 => "i64",
            DataType::F32 => "f32",
            DataType::F64 => "f64",
            DataType::TimeStamp => "timestamp",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Nanoseconds since the Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TimeStamp(pub i64);

impl TimeStamp {
    pub const ZERO: TimeStamp = TimeStamp(0);
    pub const MIN: TimeStamp = TimeStamp(i64::MIN);
    pub const MAX: TimeStamp = TimeStamp(i64::MAX);

    pub const NANOSECOND: i64 = 1;
    pub const MILLISECOND: i64 = 1_000_000;
    pub const SECOND: i64 = 1_000_000_000;

    pub const fn from_seconds(seconds: i64) -> Self {
        TimeStamp(seconds * Self::SECOND)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        TimeStamp(nanos)
    }

    #[inline]
    pub fn nanos(self) -> i64 {
        self.0
    }
}

impl fmt::Debug for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimeStamp({}ns)", self.0)
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Half-open span of time covered by a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: TimeStamp,
    pub end: TimeStamp,
}

impl TimeRange {
    pub const fn new(start: TimeStamp, end: TimeStamp) -> Self {
        Self { start, end }
    }

    /// Smallest range covering both (min start, max end)
    pub fn union(self, other: TimeRange) -> TimeRange {
        TimeRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Provenance tag identifying where in an upstream sequence a series sits.
/// Alignments of combined inputs are summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Alignment(pub u64);

impl Add for Alignment {
    type Output = Alignment;

    fn add(self, rhs: Alignment) -> Alignment {
        Alignment(self.0.wrapping_add(rhs.0))
    }
}

impl Sum for Alignment {
    fn sum<I: Iterator<Item = Alignment>>(iter: I) -> Alignment {
        iter.fold(Alignment::default(), Add::add)
    }
}

/// A single typed scalar, used for parameter defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::U8(_) => DataType::U8,
            Value::U16(_) => DataType::U16,
            Value::U32(_) => DataType::U32,
            Value::U64(_) => DataType::U64,
            Value::I8(_) => DataType::I8,
            Value::I16(_) => DataType::I16,
            Value::I32(_) => DataType::I32,
            Value::I64(_) => DataType::I64,
            Value::F32(_) => DataType::F32,
            Value::F64(_) => DataType::F64,
        }
    }

    /// One-sample series holding this value
    pub fn to_series(&self) -> Series {
        match *self {
            Value::U8(v) => Series::from_values(&[v]),
            Value::U16(v) => Series::from_values(&[v]),
            Value::U32(v) => Series::from_values(&[v]),
            Value::U64(v) => Series::from_values(&[v]),
            Value::I8(v) => Series::from_values(&[v]),
            Value::I16(v) => Series::from_values(&[v]),
            Value::I32(v) => Series::from_values(&[v]),
            Value::I64(v) => Series::from_values(&[v]),
            Value::F32(v) => Series::from_values(&[v]),
            Value::F64(v) => Series::from_values(&[v]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_density_table() {
        assert_eq!(DataType::U8.density(), 1);
        assert_eq!(DataType::I16.density(), 2);
        assert_eq!(DataType::F32.density(), 4);
        assert_eq!(DataType::U64.density(), 8);
        assert_eq!(DataType::TimeStamp.density(), 8);
    }

    #[test]
    fn test_signedness() {
        assert!(DataType::I8.is_signed());
        assert!(DataType::TimeStamp.is_signed());
        assert!(!DataType::U32.is_signed());
        assert!(!DataType::F64.is_signed());
        assert!(DataType::F32.is_float());
    }

    #[test]
    fn test_data_type_serde_names() {
        let json = serde_json::to_string(&DataType::TimeStamp).unwrap();
        assert_eq!(json, "\"timestamp\"");
        let parsed: DataType = serde_json::from_str("\"f32\"").unwrap();
        assert_eq!(parsed, DataType::F32);
    }

    #[test]
    fn test_time_range_union() {
        let a = TimeRange::new(TimeStamp::from_seconds(10), TimeStamp::from_seconds(30));
        let b = TimeRange::new(TimeStamp::from_seconds(5), TimeStamp::from_seconds(25));
        let u = a.union(b);
        assert_eq!(u.start, TimeStamp::from_seconds(5));
        assert_eq!(u.end, TimeStamp::from_seconds(30));
    }

    #[test]
    fn test_alignment_sum() {
        let total: Alignment = [Alignment(100), Alignment(50)].into_iter().sum();
        assert_eq!(total, Alignment(150));
    }

    #[test]
    fn test_value_to_series() {
        let series = Value::F64(2.5).to_series();
        assert_eq!(series.data_type(), DataType::F64);
        assert_eq!(series.values::<f64>(), vec![2.5]);
    }

    #[test]
    fn test_value_serde() {
        let value: Value = serde_json::from_str(r#"{"i32": -4}"#).unwrap();
        assert_eq!(value, Value::I32(-4));
        assert_eq!(value.data_type(), DataType::I32);
    }
}
