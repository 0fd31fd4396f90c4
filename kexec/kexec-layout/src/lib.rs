//! # Memory Layout Planning
//!
//! Decides where the kernel, ramdisk and boot metadata of the next kernel
//! live in physical memory and talks to the segment table that records them.
//!
//! ```text
//!  load_base
//!  |  +0x1000: ATAG list         kernel_base = load_base + 0x8000
//!  v  v                          v
//!  +--+---------+----------------+------------------------------+---------+-----+
//!  |  | tags    |                | kernel (len + 4)   ...       | ramdisk | DTB |
//!  +--+---------+----------------+------------------------------+---------+-----+
//!                                                               ^
//!                                  kernel_base + page_align(image_size or 5 * len)
//! ```
//!
//! The segment table itself is a collaborator: [`SegmentTable`] finds holes
//! and records segments, [`CrashRegions`] reports the memory reserved for a
//! crash kernel. [`MemoryMap`] implements both on top of `/proc/iomem`.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod memory_map;
mod planner;

pub use memory_map::MemoryMap;
pub use planner::{BasePolicy, PlacementPlan, crash_base};

use alloc::vec::Vec;
use kexec_addresses::{MemoryRange, PhysicalAddress};

/// Offset of the ATAG list from the load base.
pub const ATAG_OFFSET: u64 = 0x1000;

/// Room left below the kernel (`TEXT_OFFSET`).
pub const EXTRA_SIZE: u64 = 0x8000;

/// Bytes appended to the kernel footprint so that a DTB placed right after
/// `_edata` always sees an initialised word.
pub const KERNEL_PAD: u64 = 4;

/// Compression ratio assumed when no image size is given, plus the
/// compressed image itself.
pub const DECOMPRESSION_FACTOR: u64 = 5;

/// A chunk of memory the next kernel boots with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub bytes: Vec<u8>,
    pub base: PhysicalAddress,
    /// Footprint in memory, at least `bytes.len()`.
    pub memsz: u64,
}

impl Segment {
    #[must_use]
    pub const fn range(&self) -> MemoryRange {
        MemoryRange::new(self.base, self.memsz)
    }
}

/// The physical memory allocator and segment table.
pub trait SegmentTable {
    /// Lowest address in `[min, max]` where `size` bytes aligned to `align`
    /// fit without touching a registered segment.
    fn locate_hole(&self, size: u64, align: u64, min: u64, max: u64) -> Option<PhysicalAddress>;

    /// Register a segment.
    ///
    /// # Errors
    /// The segment is misaligned, overlaps another one or lies outside RAM.
    fn add_segment(&mut self, segment: Segment) -> Result<(), LayoutError>;
}

/// Memory reserved for a crash kernel.
pub trait CrashRegions {
    /// The `Crash kernel (boot)` region, preferred when present.
    fn crash_kernel_boot(&self) -> Option<MemoryRange>;

    /// The `Crash kernel` region.
    fn crash_kernel(&self) -> Option<MemoryRange>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("No free memory hole of {size:#x} bytes at or above {min}")]
    NoHole { size: u64, min: PhysicalAddress },
    #[error("No crash kernel memory is reserved")]
    NoCrashKernel,
    #[error("Address computation for the {what} overflowed")]
    Overflow { what: &'static str },
    #[error("The {first} region {first_range} overlaps the {second} region {second_range}")]
    Overlap {
        first: &'static str,
        first_range: MemoryRange,
        second: &'static str,
        second_range: MemoryRange,
    },
    #[error("Segment {range} is not page aligned")]
    SegmentMisaligned { range: MemoryRange },
    #[error("Segment {range} overlaps an existing segment")]
    SegmentOverlap { range: MemoryRange },
    #[error("Segment {range} is not inside system RAM")]
    SegmentOutsideRam { range: MemoryRange },
    #[error("Segment holds {len:#x} bytes but only has a footprint of {memsz:#x}")]
    SegmentBuffer { len: usize, memsz: u64 },
    #[error("Malformed iomem line {line}")]
    MalformedIomem { line: usize },
}
