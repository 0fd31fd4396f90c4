/// Round `value` up to a multiple of `align`.
///
/// An `align` of zero or one leaves the value untouched. Returns `None` on
/// overflow. `align` must be a power of two.
#[inline]
#[must_use]
pub const fn checked_align_up(value: u64, align: u64) -> Option<u64> {
    if align <= 1 {
        return Some(value);
    }
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Round `value` down to a multiple of `align` (a power of two).
#[inline]
#[must_use]
pub const fn align_down(value: u64, align: u64) -> u64 {
    if align <= 1 {
        return value;
    }
    value & !(align - 1)
}

/// Round a length up to the 4-byte tag alignment used by ATAG and FDT blobs.
#[inline]
#[must_use]
pub const fn tag_align(len: usize) -> usize {
    (len + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_next_boundary() {
        assert_eq!(checked_align_up(0, 4096), Some(0));
        assert_eq!(checked_align_up(1, 4096), Some(4096));
        assert_eq!(checked_align_up(4096, 4096), Some(4096));
        assert_eq!(checked_align_up(0xA0_0000, 4096), Some(0xA0_0000));
    }

    #[test]
    fn align_up_without_alignment_is_identity() {
        assert_eq!(checked_align_up(0x1234, 0), Some(0x1234));
        assert_eq!(checked_align_up(0x1234, 1), Some(0x1234));
    }

    #[test]
    fn align_up_reports_overflow() {
        assert_eq!(checked_align_up(u64::MAX, 4096), None);
        assert_eq!(checked_align_up(u64::MAX - 4094, 4096), None);
    }

    #[test]
    fn align_down_clears_low_bits() {
        assert_eq!(align_down(0x8000_1fff, 4096), 0x8000_1000);
        assert_eq!(align_down(0x8000_1000, 4096), 0x8000_1000);
        assert_eq!(align_down(17, 0), 17);
    }

    #[test]
    fn tag_alignment() {
        assert_eq!(tag_align(0), 0);
        assert_eq!(tag_align(1), 4);
        assert_eq!(tag_align(4), 4);
        assert_eq!(tag_align(13), 16);
    }
}
