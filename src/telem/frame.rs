//! Keyed collections of series exchanged with the channel layer.

use super::series::{Element, Series};

/// Channel identifier
pub type ChannelKey = u32;

/// Several series belonging to one channel, in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiSeries {
    pub series: Vec<Series>,
}

impl MultiSeries {
    pub fn new(series: Vec<Series>) -> Self {
        Self { series }
    }

    pub fn push(&mut self, series: Series) {
        self.series.push(series);
    }

    /// Total number of samples across all series
    pub fn len(&self) -> usize {
        self.series.iter().map(Series::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.iter().all(Series::is_empty)
    }

    /// Most recent sample across all series
    pub fn last_element(&self) -> Option<(&Series, &[u8])> {
        let series = self.series.iter().rev().find(|s| !s.is_empty())?;
        let bytes = series.element(series.len() - 1)?;
        Some((series, bytes))
    }

    pub fn last<T: Element>(&self) -> Option<T> {
        let (series, _) = self.last_element()?;
        series.at::<T>(series.len() - 1)
    }
}

/// An ordered list of (channel, series) pairs. A channel may appear more
/// than once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    keys: Vec<ChannelKey>,
    series: Vec<Series>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame holding a single series
    pub fn unary(key: ChannelKey, series: Series) -> Self {
        let mut frame = Self::new();
        frame.push(key, series);
        frame
    }

    pub fn push(&mut self, key: ChannelKey, series: Series) {
        self.keys.push(key);
        self.series.push(series);
    }

    /// Builder-style [`Frame::push`]
    pub fn with(mut self, key: ChannelKey, series: Series) -> Self {
        self.push(key, series);
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[ChannelKey] {
        &self.keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelKey, &Series)> {
        self.keys.iter().copied().zip(self.series.iter())
    }

    /// All series stored under `key`
    pub fn get(&self, key: ChannelKey) -> MultiSeries {
        MultiSeries::new(
            self.iter()
                .filter(|(k, _)| *k == key)
                .map(|(_, s)| s.clone())
                .collect(),
        )
    }
}
