use crate::PhysicalAddress;
use core::fmt;

/// A half-open physical range `[start, start + size)`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct MemoryRange {
    pub start: PhysicalAddress,
    pub size: u64,
}

impl MemoryRange {
    #[inline]
    #[must_use]
    pub const fn new(start: PhysicalAddress, size: u64) -> Self {
        Self { start, size }
    }

    /// Build a range from an inclusive `[first, last]` pair, as printed by
    /// `/proc/iomem`. Returns `None` if `last < first` or the range spans the
    /// whole address space.
    #[must_use]
    pub const fn from_inclusive(first: u64, last: u64) -> Option<Self> {
        if last < first {
            return None;
        }
        match (last - first).checked_add(1) {
            Some(size) => Some(Self::new(PhysicalAddress::new(first), size)),
            None => None,
        }
    }

    /// Exclusive end address, saturating at `u64::MAX`.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.start.as_u64().saturating_add(self.size)
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Whether the two ranges share at least one byte. Empty ranges overlap nothing.
    #[inline]
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.start.as_u64() < other.end()
            && other.start.as_u64() < self.end()
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, other: &Self) -> bool {
        other.start.as_u64() >= self.start.as_u64() && other.end() <= self.end()
    }
}

impl fmt::Display for MemoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-0x{:08X}", self.start, self.end())
    }
}
