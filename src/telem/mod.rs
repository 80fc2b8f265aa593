//! Telemetry containers: typed series and channel frames.

pub mod frame;
pub mod series;

pub use frame::{ChannelKey, Frame, MultiSeries};
pub use series::{Element, Series};
