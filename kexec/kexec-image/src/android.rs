use crate::{ImageError, read_u32_le};
use log::debug;

/// Leading bytes of an Android boot image.
pub const ANDROID_MAGIC: &[u8; 8] = b"ANDROID!";

/// Smallest supported page size; shorter files are never boot images.
pub(crate) const MIN_PAGE_SIZE: usize = 2048;

const NAME_OFFSET: usize = 48;
const NAME_SIZE: usize = 16;
const COMMAND_LINE_OFFSET: usize = NAME_OFFSET + NAME_SIZE;
const COMMAND_LINE_SIZE: usize = 512;
const ID_OFFSET: usize = COMMAND_LINE_OFFSET + COMMAND_LINE_SIZE;

/// The fixed Android boot image header (version 0).
///
/// ```text
/// 0x000 magic "ANDROID!"      0x024 page_size
/// 0x008 kernel_size           0x028 reserved (2 words)
/// 0x00C kernel_addr           0x030 name[16]
/// 0x010 ramdisk_size          0x040 command_line[512]
/// 0x014 ramdisk_addr          0x240 id[8 words]
/// 0x018 second_size
/// 0x01C second_addr
/// 0x020 tags_addr
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AndroidHeader<'a> {
    pub kernel_size: u32,
    pub kernel_addr: u32,
    pub ramdisk_size: u32,
    pub ramdisk_addr: u32,
    pub second_size: u32,
    pub second_addr: u32,
    pub tags_addr: u32,
    pub page_size: u32,
    pub name: &'a [u8],
    pub command_line: &'a [u8; COMMAND_LINE_SIZE],
    pub id: &'a [u8],
}

impl<'a> AndroidHeader<'a> {
    /// Read the header of a buffer that starts with [`ANDROID_MAGIC`].
    #[must_use]
    pub fn read(buf: &'a [u8]) -> Option<Self> {
        if !buf.starts_with(ANDROID_MAGIC) {
            return None;
        }
        let word = |index: usize| read_u32_le(buf, 8 + index * 4);
        Some(Self {
            kernel_size: word(0)?,
            kernel_addr: word(1)?,
            ramdisk_size: word(2)?,
            ramdisk_addr: word(3)?,
            second_size: word(4)?,
            second_addr: word(5)?,
            tags_addr: word(6)?,
            page_size: word(7)?,
            name: buf.get(NAME_OFFSET..COMMAND_LINE_OFFSET)?,
            command_line: buf.get(COMMAND_LINE_OFFSET..ID_OFFSET)?.try_into().ok()?,
            id: buf.get(ID_OFFSET..ID_OFFSET + 32)?,
        })
    }

    /// `kernel_size` rounded up to a whole page.
    ///
    /// # Errors
    /// The page size is zero or the computation overflows.
    pub fn kernel_pages_size(&self) -> Result<u64, ImageError> {
        self.page_align(self.kernel_size, "kernel_size")
    }

    /// Total size the image must have: header page, kernel and ramdisk
    /// pages, and the second stage.
    ///
    /// # Errors
    /// The page size is zero or the computation overflows.
    pub fn expected_size(&self) -> Result<u64, ImageError> {
        let page = u64::from(self.page_size);
        let kernel = self.kernel_pages_size()?;
        let ramdisk = self.page_align(self.ramdisk_size, "ramdisk_size")?;
        let total = page + kernel + ramdisk + u64::from(self.second_size);
        debug!(
            "Android image: page {:#x}, kernel {:#x}, ramdisk {:#x}, second {:#x}, total {total:#x}",
            self.page_size, self.kernel_size, self.ramdisk_size, self.second_size
        );
        Ok(total)
    }

    /// The embedded command line, if it is not empty.
    ///
    /// A field without a terminator is taken whole; otherwise the string
    /// is returned with its NUL.
    #[must_use]
    pub fn embedded_command_line(&self) -> Option<&'a [u8]> {
        let field: &'a [u8; COMMAND_LINE_SIZE] = self.command_line;
        if field[0] == 0 {
            return None;
        }
        if field[COMMAND_LINE_SIZE - 1] != 0 {
            return Some(&field[..]);
        }
        let len = field.iter().position(|&b| b == 0).unwrap_or(COMMAND_LINE_SIZE - 1);
        Some(&field[..=len])
    }

    fn page_align(&self, value: u32, field: &'static str) -> Result<u64, ImageError> {
        if self.page_size == 0 {
            return Err(ImageError::AndroidField { field: "page_size" });
        }
        let page = u64::from(self.page_size);
        u64::from(value)
            .div_ceil(page)
            .checked_mul(page)
            .ok_or(ImageError::AndroidField { field })
    }
}
