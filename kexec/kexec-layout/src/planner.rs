use crate::{
    ATAG_OFFSET, CrashRegions, DECOMPRESSION_FACTOR, EXTRA_SIZE, KERNEL_PAD, LayoutError,
    SegmentTable,
};
use kexec_addresses::{MemoryRange, PageSize, PhysicalAddress, Size4K, align_down, checked_align_up};
use log::{debug, info};

const PAGE: u64 = Size4K::SIZE;

/// How the load base is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasePolicy {
    /// Search the lowest free hole.
    Search,
    /// Load at a fixed address, e.g. the start of the crash kernel region.
    Fixed(PhysicalAddress),
}

/// Base of the crash kernel region, preferring the boot capture region.
///
/// # Errors
/// [`LayoutError::NoCrashKernel`] if neither region is reserved.
pub fn crash_base<C: CrashRegions + ?Sized>(regions: &C) -> Result<PhysicalAddress, LayoutError> {
    let region = regions
        .crash_kernel_boot()
        .or_else(|| regions.crash_kernel())
        .ok_or(LayoutError::NoCrashKernel)?;
    info!("crash kernel region at {region}");
    Ok(region.start)
}

/// The computed physical layout of one load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementPlan {
    /// Base of the hole the kernel was placed in.
    pub load_base: PhysicalAddress,
    pub kernel_base: PhysicalAddress,
    /// Kernel footprint, the image length plus [`KERNEL_PAD`].
    pub kernel_size: u64,
    pub initrd_base: PhysicalAddress,
    pub initrd_size: u64,
    /// The ATAG list or DTB, once placed.
    pub metadata: Option<MemoryRange>,
}

impl PlacementPlan {
    /// Place a kernel of `kernel_len` bytes and derive the ramdisk base.
    ///
    /// With an `image_size` the ramdisk follows the page-aligned image size,
    /// otherwise five times the compressed length.
    ///
    /// # Errors
    /// No hole is found or an address overflows.
    pub fn new<T: SegmentTable + ?Sized>(
        table: &T,
        policy: BasePolicy,
        kernel_len: u64,
        image_size: Option<u64>,
    ) -> Result<Self, LayoutError> {
        let overflow = |what| LayoutError::Overflow { what };

        let load_base = match policy {
            BasePolicy::Fixed(base) => base,
            BasePolicy::Search => {
                let size = kernel_len
                    .checked_add(EXTRA_SIZE)
                    .ok_or_else(|| overflow("kernel hole"))?;
                table
                    .locate_hole(size, PAGE, 0, u64::MAX)
                    .ok_or(LayoutError::NoHole {
                        size,
                        min: PhysicalAddress::new(0),
                    })?
            }
        };

        let kernel_base = load_base
            .checked_add(EXTRA_SIZE)
            .ok_or_else(|| overflow("kernel base"))?;

        let reserved = match image_size {
            Some(size) => size,
            None => kernel_len
                .checked_mul(DECOMPRESSION_FACTOR)
                .ok_or_else(|| overflow("decompressed kernel size"))?,
        };
        let initrd_base = checked_align_up(reserved, PAGE)
            .and_then(|r| kernel_base.checked_add(r))
            .ok_or_else(|| overflow("ramdisk base"))?;

        let kernel_size = kernel_len
            .checked_add(KERNEL_PAD)
            .ok_or_else(|| overflow("kernel footprint"))?;

        debug!("kernel at {kernel_base} ({kernel_size:#x} bytes), ramdisk from {initrd_base}");
        Ok(Self {
            load_base,
            kernel_base,
            kernel_size,
            initrd_base,
            initrd_size: 0,
            metadata: None,
        })
    }

    /// Where the ATAG list goes.
    ///
    /// # Errors
    /// The address overflows.
    pub fn atag_base(&self) -> Result<PhysicalAddress, LayoutError> {
        self.load_base
            .checked_add(ATAG_OFFSET)
            .ok_or(LayoutError::Overflow { what: "ATAG base" })
    }

    /// Find a page-aligned hole for a ramdisk at or after the current base.
    ///
    /// # Errors
    /// No hole is found.
    pub fn place_initrd<T: SegmentTable + ?Sized>(
        &mut self,
        table: &T,
        size: u64,
    ) -> Result<PhysicalAddress, LayoutError> {
        let base = table
            .locate_hole(size, PAGE, self.initrd_base.as_u64(), u64::MAX)
            .ok_or(LayoutError::NoHole {
                size,
                min: self.initrd_base,
            })?;
        self.initrd_base = base;
        self.initrd_size = size;
        Ok(base)
    }

    /// Make sure the ramdisk and a DTB of `dtb_len` bytes fit behind each
    /// other, sliding the ramdisk base forward to the first hole that holds
    /// both. Room for one extra page is kept for the DTB to grow into.
    ///
    /// # Errors
    /// No hole is found or the size overflows.
    pub fn reserve_dtb_window<T: SegmentTable + ?Sized>(
        &mut self,
        table: &T,
        dtb_len: u64,
    ) -> Result<(), LayoutError> {
        let overflow = LayoutError::Overflow { what: "DTB window" };
        let initrd = checked_align_up(self.initrd_size, PAGE).ok_or(overflow.clone())?;
        let dtb = dtb_len
            .checked_add(PAGE)
            .and_then(|len| checked_align_up(len, PAGE))
            .ok_or(overflow.clone())?;
        let size = initrd.checked_add(dtb).ok_or(overflow)?;

        let base = table
            .locate_hole(size, PAGE, self.initrd_base.as_u64(), u64::MAX)
            .ok_or(LayoutError::NoHole {
                size,
                min: self.initrd_base,
            })?;
        debug!("ramdisk and DTB window of {size:#x} bytes at {base}");
        self.initrd_base = base;
        Ok(())
    }

    /// The DTB follows the ramdisk on the next page boundary.
    ///
    /// # Errors
    /// The address overflows.
    pub fn dtb_base(&self) -> Result<PhysicalAddress, LayoutError> {
        self.initrd_base
            .checked_add(self.initrd_size)
            .and_then(|end| end.checked_add(PAGE))
            .map(|end| PhysicalAddress::new(align_down(end.as_u64(), PAGE)))
            .ok_or(LayoutError::Overflow { what: "DTB base" })
    }

    #[must_use]
    pub const fn kernel_range(&self) -> MemoryRange {
        MemoryRange::new(self.kernel_base, self.kernel_size)
    }

    #[must_use]
    pub const fn initrd_range(&self) -> MemoryRange {
        MemoryRange::new(self.initrd_base, self.initrd_size)
    }

    /// Check that kernel, ramdisk and metadata footprints are pairwise disjoint.
    ///
    /// # Errors
    /// [`LayoutError::Overlap`] naming the first pair that intersects.
    pub fn check_disjoint(&self) -> Result<(), LayoutError> {
        let regions = [
            Some(("kernel", self.kernel_range())),
            Some(("ramdisk", self.initrd_range())),
            self.metadata.map(|range| ("metadata", range)),
        ];

        for (i, a) in regions.iter().enumerate() {
            for b in &regions[i + 1..] {
                if let (Some((first, first_range)), Some((second, second_range))) = (a, b)
                    && first_range.overlaps(second_range)
                {
                    return Err(LayoutError::Overlap {
                        first: *first,
                        first_range: *first_range,
                        second: *second,
                        second_range: *second_range,
                    });
                }
            }
        }
        Ok(())
    }
}
