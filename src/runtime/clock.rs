//! Time sources for nodes without inputs and for host bindings.

use crate::types::TimeStamp;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> TimeStamp;
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeStamp {
        TimeStamp::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicI64,
}

impl ManualClock {
    pub fn new(start: TimeStamp) -> Self {
        Self {
            nanos: AtomicI64::new(start.0),
        }
    }

    pub fn set(&self, t: TimeStamp) {
        self.nanos.store(t.0, Ordering::SeqCst);
    }

    pub fn advance(&self, nanos: i64) {
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TimeStamp {
        TimeStamp(self.nanos.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(TimeStamp::from_seconds(1));
        assert_eq!(clock.now(), TimeStamp::from_seconds(1));
        clock.advance(TimeStamp::SECOND);
        assert_eq!(clock.now(), TimeStamp::from_seconds(2));
        clock.set(TimeStamp::ZERO);
        assert_eq!(clock.now(), TimeStamp::ZERO);
    }

    #[test]
    fn test_system_clock_is_after_epoch() {
        assert!(SystemClock.now() > TimeStamp::ZERO);
    }
}
