//! Edge value store.
//!
//! A flat arena with one `(data, time)` cell per node output. The producing
//! node is the only writer of its cells; consumers hold [`OutputId`]s and
//! clone the series out at synchronization time.

use super::id::OutputId;
use crate::telem::Series;
use crate::types::DataType;

/// Current value of one node output
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub data: Series,
    pub time: Series,
}

impl Output {
    pub fn new(data: Series, time: Series) -> Self {
        Self { data, time }
    }

    /// No samples yet
    pub fn empty(data_type: DataType) -> Self {
        Self {
            data: Series::new(data_type),
            time: Series::new(DataType::TimeStamp),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ValueStore {
    cells: Vec<Output>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an empty cell of the given type
    pub fn alloc(&mut self, data_type: DataType) -> OutputId {
        let id = OutputId(self.cells.len() as u32);
        self.cells.push(Output::empty(data_type));
        id
    }

    /// Panics if `id` was not allocated by this store.
    #[inline]
    pub fn get(&self, id: OutputId) -> &Output {
        &self.cells[id.index()]
    }

    /// Replace a cell wholesale
    #[inline]
    pub fn set(&mut self, id: OutputId, output: Output) {
        self.cells[id.index()] = output;
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
