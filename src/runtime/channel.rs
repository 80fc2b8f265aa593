//! Channel reads and buffered channel writes.
//!
//! Ingested frames replace the readable value of every channel they carry.
//! Writes made by nodes (directly or through host bindings) are buffered
//! until [`ChannelStore::flush`] drains them into an outgoing frame.

use crate::telem::{ChannelKey, Frame, MultiSeries, Series};
use crate::types::DataType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Static description of a channel the graph may touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDigest {
    pub key: ChannelKey,
    /// Channel holding this channel's timestamps; 0 when it has none
    #[serde(default)]
    pub index: ChannelKey,
    /// Element type the channel carries; host bindings of any other type
    /// are refused. Unchecked when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
}

impl ChannelDigest {
    pub fn new(key: ChannelKey, index: ChannelKey) -> Self {
        Self {
            key,
            index,
            data_type: None,
        }
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }
}

/// Channel store shared between the state and the sandbox host bindings
pub type SharedChannels = Arc<RwLock<ChannelStore>>;

#[derive(Debug, Default)]
pub struct ChannelStore {
    digests: HashMap<ChannelKey, ChannelDigest>,
    reads: HashMap<ChannelKey, MultiSeries>,
    writes: Vec<(ChannelKey, Series, Series)>,
}

impl ChannelStore {
    pub fn new(digests: &[ChannelDigest]) -> Self {
        Self {
            digests: digests.iter().map(|d| (d.key, *d)).collect(),
            ..Default::default()
        }
    }

    pub fn digest(&self, key: ChannelKey) -> Option<&ChannelDigest> {
        self.digests.get(&key)
    }

    /// Declared element type of `key`, if its digest names one
    pub fn declared_type(&self, key: ChannelKey) -> Option<DataType> {
        self.digests.get(&key).and_then(|d| d.data_type)
    }

    fn index_of(&self, key: ChannelKey) -> ChannelKey {
        self.digests.get(&key).map(|d| d.index).unwrap_or(0)
    }

    /// Replace the readable value of every channel present in `frame`.
    pub fn ingest(&mut self, frame: &Frame) {
        let mut fresh: HashMap<ChannelKey, MultiSeries> = HashMap::new();
        for (key, series) in frame.iter() {
            fresh.entry(key).or_default().push(series.clone());
        }
        self.reads.extend(fresh);
    }

    /// Latest ingested data for `key` and the matching index-channel
    /// timestamps (empty when the channel has no index).
    pub fn read(&self, key: ChannelKey) -> Option<(MultiSeries, MultiSeries)> {
        let data = self.reads.get(&key)?.clone();
        let index = self.index_of(key);
        let time = if index == 0 {
            MultiSeries::default()
        } else {
            self.reads.get(&index).cloned().unwrap_or_default()
        };
        Some((data, time))
    }

    /// Most recent data series for `key` without cloning
    pub fn latest(&self, key: ChannelKey) -> Option<&MultiSeries> {
        self.reads.get(&key)
    }

    /// Buffer a write until the next flush
    pub fn write(&mut self, key: ChannelKey, data: Series, time: Series) {
        self.writes.push((key, data, time));
    }

    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Append all buffered writes to `frame` and clear the buffer.
    /// Time series go under the channel's index key when it has one.
    pub fn flush(&mut self, mut frame: Frame) -> (Frame, bool) {
        if self.writes.is_empty() {
            return (frame, false);
        }
        for (key, data, time) in std::mem::take(&mut self.writes) {
            let index = self.index_of(key);
            frame.push(key, data);
            if index != 0 {
                frame.push(index, time);
            }
        }
        (frame, true)
    }
}
