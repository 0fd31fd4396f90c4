//! # Board Capabilities
//!
//! Device tree images often carry one blob per hardware revision. A
//! [`Board`] knows how to pick the right blob for the running machine and
//! which machine-specific properties to carry over into it.
//!
//! Boards are looked up by exact name:
//!
//! ```rust
//! let board = kexec_boards::find_board("hammerhead").unwrap();
//! assert!(board.names().contains(&"hammerhead"));
//! assert!(kexec_boards::find_board("pixel").is_err());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod generic;
mod msm;
mod registry;

pub use generic::Generic;
pub use msm::Msm;
pub use registry::{board_names, find_board};

use alloc::string::String;
use alloc::vec::Vec;
use kexec_fdt::{DeviceTreeBuffer, FdtError};

/// Read access to the device tree of the running system.
pub trait LiveDeviceTree {
    /// Raw value of property `name` of the node at `path`, e.g. `("/memory", "reg")`.
    fn property(&self, path: &str, name: &str) -> Option<Vec<u8>>;
}

/// Board-specific device tree handling.
pub trait Board: Sync {
    /// Names this board is selected by.
    fn names(&self) -> &'static [&'static str];

    /// Pick the device tree for the running machine from a DTB image payload.
    ///
    /// # Errors
    /// No blob matches or the running system lacks the identifying properties.
    fn choose_dtb(&self, image: &[u8], live: &dyn LiveDeviceTree) -> Result<Vec<u8>, BoardError>;

    /// Copy machine-specific properties, such as the memory layout, into the
    /// tree handed to the next kernel.
    ///
    /// # Errors
    /// The tree cannot be patched.
    fn add_extra_regs(
        &self,
        dtb: &mut DeviceTreeBuffer,
        live: &dyn LiveDeviceTree,
    ) -> Result<(), BoardError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("Unknown boardname '{0}'")]
    Unknown(String),
    #[error("The running system does not provide {path} {name}")]
    MissingLiveProperty {
        path: &'static str,
        name: &'static str,
    },
    #[error("No device tree in the image matches this board")]
    NoMatchingDtb,
    #[error("Failed to patch the device tree")]
    Fdt(#[from] FdtError),
}
