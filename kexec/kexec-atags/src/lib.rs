//! # ARM Boot Tag Lists
//!
//! Codec for the legacy ARM machine description ("ATAG list") that a kernel
//! finds at `base + 0x1000` when it is booted without a device tree.
//!
//! A tag list is a sequence of `{size_in_words, tag}` headers each followed by
//! a payload, terminated by an `ATAG_NONE` record of size zero:
//!
//! ```text
//! +------+-----------+---------+------+-----------+---------+-----+---+---+
//! | size | ATAG_CORE | payload | size | ATAG_MEM  | payload | ... | 0 | 0 |
//! +------+-----------+---------+------+-----------+---------+-----+---+---+
//! ```
//!
//! [`TagList::parse`] reads a firmware snapshot (such as `/proc/atags`),
//! [`TagList::build`] produces the list for the next kernel and
//! [`TagList::to_bytes`] serializes it into at most one page.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod list;
mod tag;

pub use list::{MemoryReg, TagList};
pub use tag::{CoreFlags, Tag, TagCore};

pub const ATAG_NONE: u32 = 0x0000_0000;
pub const ATAG_CORE: u32 = 0x5441_0001;
pub const ATAG_MEM: u32 = 0x5441_0002;
pub const ATAG_INITRD: u32 = 0x5441_0005;
pub const ATAG_INITRD2: u32 = 0x5442_0005;
pub const ATAG_CMDLINE: u32 = 0x5441_0009;

/// Size of a tag header (`size` and `tag` words) in bytes.
pub const TAG_HEADER_SIZE: usize = 8;

/// Number of 32-bit words read from a firmware tag snapshot.
pub const BOOT_PARAMS_WORDS: usize = 1536;

/// Upper bound for a firmware tag snapshot in bytes.
pub const BOOT_PARAMS_SIZE: usize = BOOT_PARAMS_WORDS * 4;

/// Maximum serialized size of a generated tag list (one host page).
pub const TAG_LIST_CAPACITY: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    #[error("Tag record at offset {offset:#x} declares {size} words, shorter than its own header")]
    RecordTooShort { offset: usize, size: u32 },
    #[error("Tag record at offset {offset:#x} declares {size} words and runs past the end of the snapshot")]
    RecordOverrun { offset: usize, size: u32 },
    #[error("The tag list needs {needed} bytes but only {capacity} bytes are available")]
    Overflow { needed: usize, capacity: usize },
}
