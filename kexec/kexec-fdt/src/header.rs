use crate::{FDT_HEADER_SIZE, FDT_MAGIC, FdtError};

/// Header size of version 16 blobs, which lack `size_dt_struct`.
const FDT_V16_HEADER_SIZE: usize = 36;

/// The FDT header. All fields are stored big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdtHeader {
    pub magic: u32,
    pub total_size: u32,
    pub off_dt_struct: u32,
    pub off_dt_strings: u32,
    pub off_mem_rsvmap: u32,
    pub version: u32,
    pub last_comp_version: u32,
    pub boot_cpuid_phys: u32,
    pub size_dt_strings: u32,
    /// Only present from version 17 on; zero when absent.
    pub size_dt_struct: u32,
}

impl FdtHeader {
    /// Decode the header fields and check the magic.
    ///
    /// # Errors
    /// The blob is shorter than a header or carries the wrong magic.
    pub fn read(blob: &[u8]) -> Result<Self, FdtError> {
        let cell = |index: usize| be_u32(blob, index * 4);
        let truncated = FdtError::Truncated {
            declared: FDT_V16_HEADER_SIZE,
            available: blob.len(),
        };

        let magic = cell(0).ok_or_else(|| truncated.clone())?;
        if magic != FDT_MAGIC {
            return Err(FdtError::BadMagic { found: magic });
        }
        let Some(size_dt_strings) = cell(8) else {
            return Err(truncated);
        };
        let version = cell(5).unwrap_or_default();

        Ok(Self {
            magic,
            total_size: cell(1).unwrap_or_default(),
            off_dt_struct: cell(2).unwrap_or_default(),
            off_dt_strings: cell(3).unwrap_or_default(),
            off_mem_rsvmap: cell(4).unwrap_or_default(),
            version,
            last_comp_version: cell(6).unwrap_or_default(),
            boot_cpuid_phys: cell(7).unwrap_or_default(),
            size_dt_strings,
            size_dt_struct: if version >= 17 {
                cell(9).unwrap_or_default()
            } else {
                0
            },
        })
    }

    /// Decode the header and check that every block lies inside the blob.
    ///
    /// # Errors
    /// Any [`FdtError`] format variant naming the offending field.
    pub fn validate(blob: &[u8]) -> Result<Self, FdtError> {
        let header = Self::read(blob)?;
        if header.version < 16 || header.last_comp_version > 17 {
            return Err(FdtError::BadVersion {
                version: header.version,
                last_compatible: header.last_comp_version,
            });
        }

        let total = header.total_size as usize;
        if total > blob.len() {
            return Err(FdtError::Truncated {
                declared: total,
                available: blob.len(),
            });
        }
        if total < header.header_len() {
            return Err(FdtError::BadLayout { block: "header" });
        }

        let within = |offset: u32, size: u32| {
            (offset as usize)
                .checked_add(size as usize)
                .is_some_and(|end| end <= total && offset as usize >= header.header_len())
        };
        if !within(header.off_mem_rsvmap, 16) {
            return Err(FdtError::BadLayout {
                block: "memory reservation map",
            });
        }
        if !within(header.off_dt_struct, header.size_dt_struct) {
            return Err(FdtError::BadLayout {
                block: "structure block",
            });
        }
        if !within(header.off_dt_strings, header.size_dt_strings) {
            return Err(FdtError::BadLayout {
                block: "strings block",
            });
        }

        Ok(header)
    }

    /// Length of the header as encoded for this version.
    #[must_use]
    pub const fn header_len(&self) -> usize {
        if self.version >= 17 {
            FDT_HEADER_SIZE
        } else {
            FDT_V16_HEADER_SIZE
        }
    }

    /// Write a version 17 header into the first 40 bytes of `out`.
    pub(crate) fn write(&self, out: &mut [u8]) {
        let cells = [
            self.magic,
            self.total_size,
            self.off_dt_struct,
            self.off_dt_strings,
            self.off_mem_rsvmap,
            self.version,
            self.last_comp_version,
            self.boot_cpuid_phys,
            self.size_dt_strings,
            self.size_dt_struct,
        ];
        for (chunk, value) in out[..FDT_HEADER_SIZE].chunks_exact_mut(4).zip(cells) {
            chunk.copy_from_slice(&value.to_be_bytes());
        }
    }
}

pub(crate) fn be_u32(buf: &[u8], off: usize) -> Option<u32> {
    let bytes = buf.get(off..off.checked_add(4)?)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(total: u32) -> [u8; 64] {
        let mut blob = [0u8; 64];
        FdtHeader {
            magic: FDT_MAGIC,
            total_size: total,
            off_dt_struct: 56,
            off_dt_strings: 64,
            off_mem_rsvmap: 40,
            version: 17,
            last_comp_version: 16,
            boot_cpuid_phys: 0,
            size_dt_strings: 0,
            size_dt_struct: 8,
        }
        .write(&mut blob);
        blob
    }

    #[test]
    fn validate_accepts_consistent_header() {
        let blob = header(64);
        let h = FdtHeader::validate(&blob).unwrap();
        assert_eq!(h.total_size, 64);
        assert_eq!(h.off_dt_struct, 56);
    }

    #[test]
    fn wrong_magic_is_reported() {
        let mut blob = header(64);
        blob[0] = 0xed;
        assert!(matches!(
            FdtHeader::validate(&blob),
            Err(FdtError::BadMagic { .. })
        ));
    }

    #[test]
    fn declared_size_beyond_blob_is_truncated() {
        let blob = header(128);
        assert_eq!(
            FdtHeader::validate(&blob),
            Err(FdtError::Truncated {
                declared: 128,
                available: 64
            })
        );
    }

    #[test]
    fn short_blob_is_truncated() {
        assert!(matches!(
            FdtHeader::read(&FDT_MAGIC.to_be_bytes()),
            Err(FdtError::Truncated { .. })
        ));
    }

    #[test]
    fn old_versions_are_rejected() {
        let mut blob = header(64);
        blob[20..24].copy_from_slice(&3u32.to_be_bytes());
        assert!(matches!(
            FdtHeader::validate(&blob),
            Err(FdtError::BadVersion { version: 3, .. })
        ));
    }

    #[test]
    fn struct_block_outside_blob_is_rejected() {
        let mut blob = header(64);
        blob[36..40].copy_from_slice(&64u32.to_be_bytes());
        assert_eq!(
            FdtHeader::validate(&blob),
            Err(FdtError::BadLayout {
                block: "structure block"
            })
        );
    }
}
