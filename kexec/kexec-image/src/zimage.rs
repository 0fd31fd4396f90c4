use crate::{ImageError, read_u32_le};
use log::debug;

/// `zImage` magic at offset 0x24.
pub const ZIMAGE_MAGIC: u32 = 0x016f_2818;

/// Big-endian FDT magic as it reads in little-endian byte order.
pub const APPENDED_DTB_MAGIC: u32 = 0xedfe_0dd0;

const MAGIC_OFFSET: usize = 0x24;
const START_OFFSET: usize = 0x28;
const END_OFFSET: usize = 0x2C;

/// The header is only trusted in files longer than this.
const MIN_IMAGE_LEN: usize = 0x34;

/// The `zImage` header fields at 0x24..0x30.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZImageHeader {
    pub magic: u32,
    pub start: u32,
    pub end: u32,
}

impl ZImageHeader {
    /// Read the header if the buffer is long enough and carries the magic.
    #[must_use]
    pub fn read(buf: &[u8]) -> Option<Self> {
        if buf.len() <= MIN_IMAGE_LEN {
            return None;
        }
        let header = Self {
            magic: read_u32_le(buf, MAGIC_OFFSET)?,
            start: read_u32_le(buf, START_OFFSET)?,
            end: read_u32_le(buf, END_OFFSET)?,
        };
        debug!(
            "zImage header: {:#010x} {:#010x} {:#010x}",
            header.magic, header.start, header.end
        );
        (header.magic == ZIMAGE_MAGIC).then_some(header)
    }

    /// Declared image size, `end - start` in 32-bit arithmetic.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.end.wrapping_sub(self.start)
    }

    /// Length the file is to be truncated to.
    ///
    /// # Errors
    /// [`ImageError::Truncated`] if the header declares more bytes than the file has.
    pub fn effective_len(&self, file_len: usize) -> Result<usize, ImageError> {
        let declared = self.size();
        debug!("zImage size {declared:#x}, file size {file_len:#x}");
        match usize::try_from(declared) {
            Ok(size) if size <= file_len => Ok(size),
            _ => Err(ImageError::Truncated { file_len, declared }),
        }
    }
}

/// Locate a device tree appended to a kernel payload.
///
/// The word at 0x2C holds the offset of the blob. It must lie inside the
/// payload and point at the FDT magic.
pub(crate) fn appended_dtb(payload: &[u8]) -> Result<&[u8], ImageError> {
    let offset = read_u32_le(payload, END_OFFSET).ok_or(ImageError::KernelTooShort {
        len: payload.len(),
    })?;
    let dtb = usize::try_from(offset)
        .ok()
        .and_then(|at| payload.get(at..))
        .filter(|dtb| !dtb.is_empty())
        .ok_or(ImageError::AppendedDtbOffset {
            offset,
            kernel_len: payload.len(),
        })?;

    match read_u32_le(dtb, 0) {
        Some(APPENDED_DTB_MAGIC) => Ok(dtb),
        found => Err(ImageError::AppendedDtbMagic {
            offset,
            found: found.unwrap_or_default(),
        }),
    }
}
