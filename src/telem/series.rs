//! Typed columnar sample buffers.
//!
//! A [`Series`] stores little-endian element bytes for one [`DataType`]
//! together with its alignment tag and time range. Timestamp series are
//! plain series of [`DataType::TimeStamp`].

use crate::types::{Alignment, DataType, TimeRange, TimeStamp};

/// Native element types that can be stored in a [`Series`].
pub trait Element: Copy + Send + 'static {
    const DATA_TYPE: DataType;

    fn write_le(self, out: &mut Vec<u8>);

    /// `bytes` is exactly `DATA_TYPE.density()` long.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($($t:ty => $dt:expr),* $(,)?) => {
        $(
            impl Element for $t {
                const DATA_TYPE: DataType = $dt;

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(bytes);
                    <$t>::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_element! {
    u8 => DataType::U8,
    u16 => DataType::U16,
    u32 => DataType::U32,
    u64 => DataType::U64,
    i8 => DataType::I8,
    i16 => DataType::I16,
    i32 => DataType::I32,
    i64 => DataType::I64,
    f32 => DataType::F32,
    f64 => DataType::F64,
}

impl Element for TimeStamp {
    const DATA_TYPE: DataType = DataType::TimeStamp;

    fn write_le(self, out: &mut Vec<u8>) {
        self.0.write_le(out);
    }

    fn read_le(bytes: &[u8]) -> Self {
        TimeStamp(i64::read_le(bytes))
    }
}

/// One typed batch of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    data_type: DataType,
    data: Vec<u8>,
    pub alignment: Alignment,
    pub time_range: TimeRange,
}

impl Series {
    /// Create an empty series of the given type
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            data: Vec::new(),
            alignment: Alignment::default(),
            time_range: TimeRange::default(),
        }
    }

    /// Create a zero-filled series of `len` samples
    pub fn zeroed(data_type: DataType, len: usize) -> Self {
        Self {
            data: vec![0; len * data_type.density()],
            ..Self::new(data_type)
        }
    }

    pub fn from_values<T: Element>(values: &[T]) -> Self {
        let mut data = Vec::with_capacity(values.len() * T::DATA_TYPE.density());
        for v in values {
            v.write_le(&mut data);
        }
        Self {
            data,
            ..Self::new(T::DATA_TYPE)
        }
    }

    pub fn from_timestamps(stamps: &[TimeStamp]) -> Self {
        Self::from_values(stamps)
    }

    /// Timestamp series from whole seconds since the epoch.
    pub fn from_seconds(seconds: &[i64]) -> Self {
        let stamps: Vec<TimeStamp> = seconds.iter().map(|s| TimeStamp::from_seconds(*s)).collect();
        Self::from_values(&stamps)
    }

    /// Build a series from raw little-endian element bytes. Trailing bytes
    /// that do not form a whole element are dropped.
    pub fn from_bytes(data_type: DataType, bytes: &[u8]) -> Self {
        let whole = bytes.len() - bytes.len() % data_type.density();
        Self {
            data: bytes[..whole].to_vec(),
            ..Self::new(data_type)
        }
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.data_type.density()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Raw bytes of element `index`
    pub fn element(&self, index: usize) -> Option<&[u8]> {
        let d = self.data_type.density();
        self.data.get(index * d..(index + 1) * d)
    }

    /// Overwrite element `index` with the first `density` bytes of `bytes`.
    /// Returns false when the index is out of range.
    pub fn set_element(&mut self, index: usize, bytes: &[u8]) -> bool {
        let d = self.data_type.density();
        match (self.data.get_mut(index * d..(index + 1) * d), bytes.get(..d)) {
            (Some(slot), Some(src)) => {
                slot.copy_from_slice(src);
                true
            }
            _ => false,
        }
    }

    /// Typed read of element `index`. `None` when out of range or when `T`
    /// does not match the series type.
    pub fn at<T: Element>(&self, index: usize) -> Option<T> {
        if T::DATA_TYPE != self.data_type {
            return None;
        }
        self.element(index).map(T::read_le)
    }

    /// All elements as `T`; empty when `T` does not match the series type.
    pub fn values<T: Element>(&self) -> Vec<T> {
        if T::DATA_TYPE != self.data_type {
            return Vec::new();
        }
        self.data
            .chunks_exact(self.data_type.density())
            .map(T::read_le)
            .collect()
    }

    /// Resize to `len` samples, zero-filling new ones
    pub fn resize(&mut self, len: usize) {
        self.data.resize(len * self.data_type.density(), 0);
    }

    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len * self.data_type.density());
    }

    /// Last sample of a timestamp series
    pub fn last_timestamp(&self) -> Option<TimeStamp> {
        self.at::<TimeStamp>(self.len().checked_sub(1)?)
    }

    /// Whether the last sample is non-zero. Empty series are never truthy.
    pub fn is_last_truthy(&self) -> bool {
        let Some(last) = self.len().checked_sub(1) else {
            return false;
        };
        match self.data_type {
            DataType::F32 => self.at::<f32>(last).is_some_and(|v| v != 0.0),
            DataType::F64 => self.at::<f64>(last).is_some_and(|v| v != 0.0),
            _ => self
                .element(last)
                .is_some_and(|bytes| bytes.iter().any(|b| *b != 0)),
        }
    }
}
