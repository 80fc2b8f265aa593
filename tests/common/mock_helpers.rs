//! Clock and error sink helpers

use crossbeam_channel::Receiver;
use nodegraph_rs::runtime::{ErrorSink, ManualClock, NodeFault, SharedClock};
use nodegraph_rs::types::TimeStamp;
use std::sync::Arc;

/// Manual clock starting at `seconds`, plus the same clock as a trait object
pub fn manual_clock(seconds: i64) -> (Arc<ManualClock>, SharedClock) {
    let clock = Arc::new(ManualClock::new(TimeStamp::from_seconds(seconds)));
    let shared: SharedClock = clock.clone();
    (clock, shared)
}

/// Error sink that forwards every fault to the returned receiver
pub fn collecting_sink() -> (ErrorSink, Receiver<NodeFault>) {
    ErrorSink::bounded(64)
}

/// Faults reported so far
pub fn drain(rx: &Receiver<NodeFault>) -> Vec<NodeFault> {
    rx.try_iter().collect()
}
