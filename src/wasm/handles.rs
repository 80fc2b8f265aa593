//! Series values the guest refers to by `i32` handle.
//!
//! Handles live for one invocation: the table is cleared before every call
//! into the sandbox. Series that must outlive the call are copied into
//! stateful variables by `state_store_series_<t>`.

use crate::telem::Series;

/// Most element bytes all live handles may hold together
pub const MAX_SERIES_BYTES: usize = 64 << 20;

#[derive(Debug, Default)]
pub struct SeriesHandles {
    series: Vec<Series>,
    bytes: usize,
}

impl SeriesHandles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `bytes` more element bytes fit under [`MAX_SERIES_BYTES`]
    pub fn has_room(&self, bytes: usize) -> bool {
        self.bytes
            .checked_add(bytes)
            .is_some_and(|total| total <= MAX_SERIES_BYTES)
    }

    /// Store `series` and return its handle, or `None` when the byte budget
    /// is spent. Handles start at 1; 0 never names a series.
    pub fn insert(&mut self, series: Series) -> Option<u32> {
        let size = series.bytes().len();
        if !self.has_room(size) {
            return None;
        }
        let handle = u32::try_from(self.series.len() + 1).ok()?;
        self.bytes += size;
        self.series.push(series);
        Some(handle)
    }

    pub fn get(&self, handle: u32) -> Option<&Series> {
        let index = (handle as usize).checked_sub(1)?;
        self.series.get(index)
    }

    pub fn get_mut(&mut self, handle: u32) -> Option<&mut Series> {
        let index = (handle as usize).checked_sub(1)?;
        self.series.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn clear(&mut self) {
        self.series.clear();
        self.bytes = 0;
    }
}
