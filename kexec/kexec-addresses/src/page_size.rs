use core::fmt;

/// Sealed trait pattern to restrict `PageSize` impls to our markers.
mod sealed {
    pub trait Sealed {}
}

/// Marker trait for supported page sizes.
pub trait PageSize: sealed::Sealed + Clone + Copy + Eq + fmt::Debug {
    /// Page size in bytes (power of two).
    const SIZE: u64;
}

/// 4 KiB page (4096 bytes), the host page size the loader plans with.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Size4K;
impl sealed::Sealed for Size4K {}
impl PageSize for Size4K {
    const SIZE: u64 = 4096;
}

const _: () = assert!(Size4K::SIZE.is_power_of_two());
