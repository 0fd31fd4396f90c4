//! # ARM zImage Loader
//!
//! Prepares the segments a `kexec` style reboot needs to start an ARM Linux
//! kernel: the kernel itself, an optional ramdisk and the boot metadata,
//! either an ATAG list or a flattened device tree.
//!
//! ```text
//!  kernel file ──► KernelImage ──► PlacementPlan ──┬─► TagList ─────────┐
//!                                                  │                   ├─► SegmentTable
//!                                                  └─► DeviceTreeBuffer┘
//! ```
//!
//! [`load`] runs the whole pipeline against a [`SegmentTable`] and a
//! [`Firmware`] view of the running system and returns the entry point.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod command_line;
mod config;
mod error;
mod firmware;
mod loader;

pub use command_line::{COMMAND_LINE_SIZE, CommandLine};
pub use config::{BootConfig, BootMode, ConfigError, DtbSelection};
pub use error::{ErrorKind, LoadError};
pub use firmware::{CrashDumpHook, Firmware};
pub use loader::{DTB_PAD_SIZE, LoadOutcome, load};

pub use kexec_layout::SegmentTable;
