//! Identity types for the runtime.
//!
//! IDs are newtypes over `u32` that serve as direct indices into the
//! [`ValueStore`](super::ValueStore) arena.

use std::fmt;

/// Index of one output cell in the value store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OutputId(pub u32);

impl OutputId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputId({})", self.0)
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_id_index() {
        assert_eq!(OutputId(7).index(), 7);
        assert_eq!(OutputId::default().index(), 0);
    }

    #[test]
    fn test_output_id_debug() {
        assert_eq!(format!("{:?}", OutputId(3)), "OutputId(3)");
        assert_eq!(format!("{}", OutputId(12)), "OutputId(12)");
    }
}
