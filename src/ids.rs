#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

/// Attempt-local identifier of a node in a physical plan.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct PlanNodeId(pub u32);
/// Identifier of a fragment inside a [`crate::fragment::FragmentGraph`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct FragmentId(pub u32);
/// Index of a data partition.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct PartitionId(pub u32);

impl fmt::Display for PlanNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PartitionId {
    fn from(value: u32) -> Self {
        PartitionId(value)
    }
}

/// Hands out plan node ids for a single compile attempt.
///
/// Every attempt owns its own allocator, so concurrent planners never share
/// numbering state.
#[derive(Debug)]
pub struct PlanNodeIdAllocator {
    next: u32,
}

impl PlanNodeIdAllocator {
    /// First id handed out after construction or [`reset`](Self::reset).
    pub const FIRST: u32 = 1;

    /// Creates an allocator starting at [`Self::FIRST`].
    pub fn new() -> Self {
        Self { next: Self::FIRST }
    }

    /// Returns the next id.
    pub fn next_id(&mut self) -> PlanNodeId {
        let id = PlanNodeId(self.next);
        self.next += 1;
        id
    }

    /// Restarts numbering from [`Self::FIRST`].
    pub fn reset(&mut self) {
        self.next = Self::FIRST;
    }

    /// Number of ids handed out since the last reset.
    pub fn issued(&self) -> u32 {
        self.next - Self::FIRST
    }
}

impl Default for PlanNodeIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_restarts_after_reset() {
        let mut ids = PlanNodeIdAllocator::new();
        assert_eq!(ids.next_id(), PlanNodeId(1));
        assert_eq!(ids.next_id(), PlanNodeId(2));
        assert_eq!(ids.issued(), 2);
        ids.reset();
        assert_eq!(ids.next_id(), PlanNodeId(1));
    }
}
