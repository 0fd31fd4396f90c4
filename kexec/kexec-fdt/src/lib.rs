//! # Flattened Device Tree Buffers
//!
//! An owned, growable Flattened Device Tree (FDT) that can be patched in
//! place before it is handed to the next kernel.
//!
//! ## Layout
//!
//! Every [`DeviceTree`] is kept in read-write layout: all blocks are packed
//! back to back and free space only exists at the very end.
//!
//! ```text
//! +--------+----------------+-----------------+---------------+------------+
//! | header | memory rsvmap  | structure block | strings block | free space |
//! +--------+----------------+-----------------+---------------+------------+
//! 0        40                                                    total_size
//! ```
//!
//! The declared `totalsize` always equals the length of the backing storage.
//!
//! ## Growth
//!
//! [`DeviceTree`] mutations fail with [`FdtError::NoSpace`] when the free
//! tail is too short. [`DeviceTreeBuffer`] wraps a tree and grows it by the
//! worst-case encoded size of a node or property before each mutation, then
//! retries once with the exact shortfall. It never shrinks.
//!
//! ```rust
//! # use kexec_fdt::*;
//! let mut dtb = DeviceTreeBuffer::from_tree(DeviceTree::new_empty(0x100).unwrap());
//! let root = dtb.root().unwrap();
//! dtb.setup_property(root, "chosen", "bootargs", b"console=ttyS0\0").unwrap();
//!
//! let chosen = dtb.tree().path_offset("/chosen").unwrap().unwrap();
//! assert_eq!(dtb.tree().property(chosen, "bootargs").unwrap(), Some(&b"console=ttyS0\0"[..]));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod buffer;
mod header;
mod split;
mod token;
mod tree;

pub use buffer::{DeviceTreeBuffer, node_len, prop_len};
pub use header::FdtHeader;
pub use split::{Blobs, blobs};
pub use tree::{DeviceTree, NodeOffset};

/// Big-endian magic at offset 0 of every FDT.
pub const FDT_MAGIC: u32 = 0xd00d_feed;

pub const FDT_BEGIN_NODE: u32 = 0x1;
pub const FDT_END_NODE: u32 = 0x2;
pub const FDT_PROP: u32 = 0x3;
pub const FDT_NOP: u32 = 0x4;
pub const FDT_END: u32 = 0x9;

/// Size of a version 17 header.
pub const FDT_HEADER_SIZE: usize = 40;

/// Version written by [`DeviceTree::open_into`].
pub const FDT_VERSION: u32 = 17;
pub const FDT_LAST_COMP_VERSION: u32 = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FdtError {
    #[error("Device tree blob is truncated: {declared} bytes declared, {available} available")]
    Truncated { declared: usize, available: usize },
    #[error("Bad device tree magic {found:#010x}")]
    BadMagic { found: u32 },
    #[error("Unsupported device tree version {version} (last compatible {last_compatible})")]
    BadVersion { version: u32, last_compatible: u32 },
    #[error("The device tree {block} lies outside the blob")]
    BadLayout { block: &'static str },
    #[error("Malformed device tree structure at offset {offset:#x}")]
    BadStructure { offset: usize },
    #[error("Offset {offset:#x} does not point at a device tree node")]
    BadOffset { offset: usize },
    #[error("Invalid device tree node or property name")]
    BadName,
    #[error("The device tree node already exists")]
    Exists,
    #[error("The device tree needs {needed} more bytes of free space")]
    NoSpace { needed: usize },
    #[error("Failed to allocate {requested} bytes of device tree storage")]
    OutOfMemory { requested: usize },
}
