//! # Physical Address Types for Boot Image Placement
//!
//! Strongly typed wrappers for the physical addresses and address ranges a
//! kexec loader hands to the segment table.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PhysicalAddress`] | A raw 64-bit physical address. |
//! | [`MemoryRange`] | A half-open `[start, start + size)` physical range. |
//! | [`PageSize`] / [`Size4K`] | Page granularity used for alignment. |
//!
//! ```rust
//! # use kexec_addresses::*;
//! let base = PhysicalAddress::new(0x8000_1234);
//! assert_eq!(base.align_down::<Size4K>().as_u64(), 0x8000_1000);
//! assert_eq!(base.checked_align_up::<Size4K>().map(PhysicalAddress::as_u64), Some(0x8000_2000));
//!
//! let kernel = MemoryRange::new(PhysicalAddress::new(0x8000_8000), 0x20_0004);
//! let initrd = MemoryRange::new(PhysicalAddress::new(0x80A0_8000), 0x1000);
//! assert!(!kernel.overlaps(&initrd));
//! ```
//!
//! All helpers are `const fn` where possible and never wrap silently;
//! overflowing computations return `None`.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod align;
mod memory_range;
mod page_size;
mod physical_address;

pub use align::{align_down, checked_align_up, tag_align};
pub use memory_range::MemoryRange;
pub use page_size::{PageSize, Size4K};
pub use physical_address::PhysicalAddress;
