//! A segment table backed by the system RAM ranges from `/proc/iomem`.

use crate::{CrashRegions, LayoutError, Segment, SegmentTable};
use alloc::vec::Vec;
use kexec_addresses::{MemoryRange, PageSize, PhysicalAddress, Size4K, checked_align_up};
use log::{debug, trace};

const SYSTEM_RAM: &str = "System RAM";
const CRASH_KERNEL: &str = "Crash kernel";
const CRASH_KERNEL_BOOT: &str = "Crash kernel (boot)";

/// Usable RAM, the crash kernel reservations and the segments registered so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryMap {
    ram: Vec<MemoryRange>,
    crash_kernel: Option<MemoryRange>,
    crash_kernel_boot: Option<MemoryRange>,
    segments: Vec<Segment>,
}

impl MemoryMap {
    #[must_use]
    pub fn new(mut ram: Vec<MemoryRange>) -> Self {
        ram.sort_unstable();
        Self {
            ram,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_crash_kernel(mut self, range: MemoryRange) -> Self {
        self.crash_kernel = Some(range);
        self
    }

    #[must_use]
    pub const fn with_crash_kernel_boot(mut self, range: MemoryRange) -> Self {
        self.crash_kernel_boot = Some(range);
        self
    }

    /// Parse the text of `/proc/iomem`.
    ///
    /// Top-level `System RAM` entries become usable memory; `Crash kernel`
    /// and `Crash kernel (boot)` entries are picked up at any depth.
    ///
    /// # Errors
    /// [`LayoutError::MalformedIomem`] for a line that is not `first-last : name`.
    pub fn from_iomem(text: &str) -> Result<Self, LayoutError> {
        let mut map = Self::default();

        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let malformed = LayoutError::MalformedIomem { line: index + 1 };
            let nested = line.starts_with(char::is_whitespace);
            let (span, name) = line.trim().split_once(" : ").ok_or_else(|| malformed.clone())?;
            let (first, last) = span.split_once('-').ok_or_else(|| malformed.clone())?;
            let first = u64::from_str_radix(first, 16).map_err(|_| malformed.clone())?;
            let last = u64::from_str_radix(last, 16).map_err(|_| malformed.clone())?;
            let range = MemoryRange::from_inclusive(first, last).ok_or(malformed)?;

            match name.trim() {
                SYSTEM_RAM if !nested => map.ram.push(range),
                CRASH_KERNEL => map.crash_kernel = Some(range),
                CRASH_KERNEL_BOOT => map.crash_kernel_boot = Some(range),
                other => trace!("iomem: skipping {range} {other}"),
            }
        }

        map.ram.sort_unstable();
        debug!("iomem: {} RAM ranges", map.ram.len());
        Ok(map)
    }

    #[must_use]
    pub fn ram(&self) -> &[MemoryRange] {
        &self.ram
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }

    /// Registered footprint of a segment, rounded up to whole pages.
    fn footprint(segment: &Segment) -> MemoryRange {
        let size = checked_align_up(segment.memsz, Size4K::SIZE).unwrap_or(u64::MAX);
        MemoryRange::new(segment.base, size)
    }

    fn first_conflict(&self, range: &MemoryRange) -> Option<MemoryRange> {
        self.segments
            .iter()
            .map(Self::footprint)
            .filter(|used| used.overlaps(range))
            .max_by_key(MemoryRange::end)
    }
}

impl SegmentTable for MemoryMap {
    fn locate_hole(&self, size: u64, align: u64, min: u64, max: u64) -> Option<PhysicalAddress> {
        for ram in &self.ram {
            let mut start = checked_align_up(ram.start.as_u64().max(min), align)?;
            loop {
                let end = start.checked_add(size)?;
                if end > ram.end() || (size > 0 && end - 1 > max) || start > max {
                    break;
                }
                let candidate = MemoryRange::new(PhysicalAddress::new(start), size.max(1));
                match self.first_conflict(&candidate) {
                    Some(used) => start = checked_align_up(used.end(), align)?,
                    None => return Some(PhysicalAddress::new(start)),
                }
            }
        }
        None
    }

    fn add_segment(&mut self, segment: Segment) -> Result<(), LayoutError> {
        let range = segment.range();
        if segment.bytes.len() as u64 > segment.memsz {
            return Err(LayoutError::SegmentBuffer {
                len: segment.bytes.len(),
                memsz: segment.memsz,
            });
        }
        if !segment.base.is_aligned::<Size4K>() {
            return Err(LayoutError::SegmentMisaligned { range });
        }
        if !self.ram.iter().any(|ram| ram.contains(&range)) {
            return Err(LayoutError::SegmentOutsideRam { range });
        }
        if self.first_conflict(&Self::footprint(&segment)).is_some() {
            return Err(LayoutError::SegmentOverlap { range });
        }

        debug!("segment {range}, {:#x} bytes of data", segment.bytes.len());
        self.segments.push(segment);
        Ok(())
    }
}

impl CrashRegions for MemoryMap {
    fn crash_kernel_boot(&self) -> Option<MemoryRange> {
        self.crash_kernel_boot
    }

    fn crash_kernel(&self) -> Option<MemoryRange> {
        self.crash_kernel
    }
}
