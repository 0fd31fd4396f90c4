//! # Kernel Container Parser
//!
//! Detects how an ARM kernel is framed and extracts the pieces the loader
//! needs:
//!
//! - a raw `zImage`, optionally followed by an appended device tree,
//! - an Android boot image (`ANDROID!`) bundling kernel, ramdisk and a
//!   command line,
//! - standalone device tree images (`QCDT` tables or plain FDT blobs).
//!
//! All parsing borrows from the loaded file; nothing is copied.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod android;
mod dtb_image;
mod kernel;
mod zimage;

pub use android::{ANDROID_MAGIC, AndroidHeader};
pub use dtb_image::{DtbImage, DtbImageKind, QCDT_HEADER_SIZE, QCDT_MAGIC};
pub use kernel::{Format, KernelImage, ParseOptions};
pub use zimage::{APPENDED_DTB_MAGIC, ZIMAGE_MAGIC, ZImageHeader};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("zImage is truncated: file {file_len:#x} bytes vs header {declared:#x}")]
    Truncated { file_len: usize, declared: u32 },
    #[error("Android image field `{field}` is invalid")]
    AndroidField { field: &'static str },
    #[error("Android image size is incorrect: header declares {declared:#x} bytes, file has {file_len:#x}")]
    AndroidSize { declared: u64, file_len: usize },
    #[error("Kernel of {len:#x} bytes is too short to carry an appended DTB")]
    KernelTooShort { len: usize },
    #[error("Invalid appended DTB offset {offset:#x}, the kernel ends at {kernel_len:#x}")]
    AppendedDtbOffset { offset: u32, kernel_len: usize },
    #[error("No DTB appended to the kernel: found {found:#010x} at offset {offset:#x}")]
    AppendedDtbMagic { offset: u32, found: u32 },
    #[error("Invalid DTB image header (expected QCDT or a flattened device tree)")]
    DtbImageHeader,
    #[error("DTB image is too small ({len} bytes)")]
    DtbImageTooSmall { len: usize },
}

pub(crate) fn read_u32_le(buf: &[u8], off: usize) -> Option<u32> {
    let bytes = buf.get(off..off.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
